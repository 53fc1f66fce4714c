//! Per-request turn context and conversation phase.

use crate::message::ConversationId;
use crate::tool::ToolName;

/// Which stage of exploration a conversation is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No region bound yet: the user is still choosing an area.
    Discovery,
    /// A region is bound: the user is exploring it in detail.
    Region,
}

impl Phase {
    pub fn for_region(region_id: Option<i64>) -> Self {
        match region_id {
            Some(_) => Self::Region,
            None => Self::Discovery,
        }
    }

    /// Tools the model may call in this phase, in the order they are offered.
    pub fn tools(&self) -> &'static [ToolName] {
        match self {
            Self::Discovery => &[ToolName::ResolveArea, ToolName::DiscoverInterests],
            Self::Region => &[ToolName::DiscoverInterests, ToolName::FilterListings],
        }
    }
}

/// Everything one inbound turn needs. Built once by the boundary layer and
/// only read after that.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnContext {
    conversation_id: ConversationId,
    region_id: Option<i64>,
    user_text: String,
}

impl TurnContext {
    pub fn new(conversation_id: ConversationId, user_text: impl Into<String>) -> Self {
        Self {
            conversation_id,
            region_id: None,
            user_text: user_text.into(),
        }
    }

    pub fn with_region(mut self, region_id: Option<i64>) -> Self {
        self.region_id = region_id;
        self
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn region_id(&self) -> Option<i64> {
        self.region_id
    }

    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    pub fn phase(&self) -> Phase {
        Phase::for_region(self.region_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_region_means_discovery() {
        let ctx = TurnContext::new(ConversationId::from("c1"), "Tell me about Shoreditch");
        assert_eq!(ctx.phase(), Phase::Discovery);
        assert!(ctx.phase().tools().contains(&ToolName::ResolveArea));
        assert!(!ctx.phase().tools().contains(&ToolName::FilterListings));
    }

    #[test]
    fn bound_region_means_region_phase() {
        let ctx = TurnContext::new(ConversationId::from("c1"), "Any gyms?").with_region(Some(42));
        assert_eq!(ctx.phase(), Phase::Region);
        assert_eq!(ctx.region_id(), Some(42));
        assert!(!ctx.phase().tools().contains(&ToolName::ResolveArea));
        assert!(ctx.phase().tools().contains(&ToolName::DiscoverInterests));
        assert!(ctx.phase().tools().contains(&ToolName::FilterListings));
    }
}
