//! Tool implementations for Settlr.
//!
//! Tools let the agent put things on the user's map:
//! resolve an area name to a polygon, discover points of interest inside it,
//! and filter rental listings to it.
//!
//! Every tool shares one [`ToolDeps`] bundle built at process start. Tools
//! scope all reads and writes to the conversation in the [`TurnContext`], not
//! to whatever id the model passes in its arguments.

pub mod boundary_match;
pub mod discover_interests;
pub mod filter_listings;
pub mod lenient;
pub mod resolve_area;

#[cfg(test)]
mod test_support;

use settlr_config::AppConfig;
use settlr_core::error::ToolError;
use settlr_core::geo::GeoEnvelope;
use settlr_core::message::ConversationId;
use settlr_core::notify::MapNotifier;
use settlr_core::provider::Provider;
use settlr_core::region::Region;
use settlr_core::store::GeoStore;
use settlr_core::tool::ToolSet;
use settlr_core::turn::TurnContext;
use std::sync::Arc;
use tracing::warn;

pub use discover_interests::DiscoverInterestsTool;
pub use filter_listings::FilterListingsTool;
pub use resolve_area::ResolveAreaTool;

/// Knobs for the secondary model calls and result shaping.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Model used for polygon generation and POI discovery
    pub tool_model: String,
    pub tool_max_tokens: u32,
    pub max_pois_per_interest: usize,
    /// Generated polygons must fall inside this box
    pub envelope: GeoEnvelope,
}

impl ToolSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tool_model: config.tool_model.clone(),
            tool_max_tokens: config.discovery.tool_max_tokens,
            max_pois_per_interest: config.discovery.max_pois_per_interest,
            envelope: config.discovery.envelope,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Shared handles every tool needs.
#[derive(Clone)]
pub struct ToolDeps {
    pub provider: Arc<dyn Provider>,
    pub store: Arc<dyn GeoStore>,
    pub notifier: Arc<dyn MapNotifier>,
    pub settings: ToolSettings,
}

/// Build the full tool set. Each turn narrows it to its phase.
pub fn default_toolset(deps: ToolDeps) -> ToolSet {
    ToolSet::new()
        .with(Arc::new(ResolveAreaTool::new(deps.clone())))
        .with(Arc::new(DiscoverInterestsTool::new(deps.clone())))
        .with(Arc::new(FilterListingsTool::new(deps)))
}

/// The conversation a tool call acts for.
///
/// The turn context is authoritative; a different id supplied by the model
/// is logged and ignored.
pub(crate) fn acting_conversation<'a>(
    ctx: &'a TurnContext,
    supplied: Option<&str>,
    tool: &str,
) -> &'a ConversationId {
    let actual = ctx.conversation_id();
    if let Some(supplied) = supplied.filter(|s| *s != actual.as_str()) {
        warn!(
            tool,
            conversation_id = %actual,
            supplied,
            "Model supplied a different conversation id, using the turn's"
        );
    }
    actual
}

/// Load a region and check that it belongs to `conversation_id`.
pub(crate) async fn owned_region(
    store: &dyn GeoStore,
    conversation_id: &ConversationId,
    region_id: i64,
) -> Result<Region, ToolError> {
    let region = store
        .get_region(region_id)
        .await?
        .ok_or_else(|| ToolError::InvalidArguments(format!("Region {region_id} does not exist")))?;
    if &region.conversation_id != conversation_id {
        return Err(ToolError::Forbidden {
            region_id,
            conversation_id: conversation_id.to_string(),
        });
    }
    Ok(region)
}
