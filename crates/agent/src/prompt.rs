//! System prompt loading and per-turn rendering.

use settlr_core::tool::ToolName;
use settlr_core::turn::{Phase, TurnContext};
use std::path::Path;

const BUILTIN_PROMPT: &str = "You are Settlr, a friendly guide to London's neighborhoods for people \
deciding where to live.

Help the user understand what an area is like day to day: its character, transport, food and \
nightlife, green space, and who tends to live there. Ground what you say in the places you find \
with your tools and keep answers conversational and concise.

When the user names an area, call resolve_area so it appears on their map, then call \
discover_interests with the interests they have mentioned. Pass interests as a bracketed, \
comma-separated list such as \"[karaoke bars, boxing clubs]\". When they are looking at a \
region and care about renting, call filter_listings, respecting any budget they give.

Never invent region ids; use the ones your tools return or the current region below. If a tool \
reports an error, explain briefly and carry on with what you have.";

/// The base instructions for every turn.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    base: String,
}

impl SystemPrompt {
    pub fn builtin() -> Self {
        Self {
            base: BUILTIN_PROMPT.to_string(),
        }
    }

    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Read the prompt from `path`, or use the built-in one when unset.
    pub fn load(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(path) => Ok(Self::new(std::fs::read_to_string(path)?.trim())),
            None => Ok(Self::builtin()),
        }
    }

    /// Instructions for one turn: the base prompt plus the conversation and
    /// region ids, and in the region phase the calls the model must make.
    pub fn render(&self, ctx: &TurnContext) -> String {
        let conversation_id = ctx.conversation_id();
        let mut prompt = format!("{}\n\nCURRENT_CONVERSATION_ID: {conversation_id}", self.base);

        if let (Phase::Region, Some(region_id)) = (ctx.phase(), ctx.region_id()) {
            let discover = ToolName::DiscoverInterests;
            let filter = ToolName::FilterListings;
            prompt.push_str(&format!(
                "\nCURRENT_REGION_ID: {region_id}\n\n\
                 MANDATORY TASKS: You MUST perform the following actions:\n\
                 1. Call {discover} with conversation_id='{conversation_id}', region_id={region_id}, \
                 and user_interests extracted from the conversation.\n\
                 2. Call {filter} with region_id={region_id} and conversation_id='{conversation_id}' \
                 to show rental properties in the area.\n\n\
                 EXCEPTION: If the user is ONLY asking about specific interests or venues and is \
                 explicitly NOT interested in housing (e.g. 'just show me coffee shops, I don't care \
                 about rentals'), skip calling {filter}.\n\n\
                 DO NOT call {resolve}: the user is already looking at this region.",
                resolve = ToolName::ResolveArea,
            ));
        }
        prompt
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::builtin()
    }
}
