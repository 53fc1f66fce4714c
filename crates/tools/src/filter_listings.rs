//! Rental listings inside a region.

use crate::{ToolDeps, acting_conversation, owned_region};
use async_trait::async_trait;
use serde::Deserialize;
use settlr_core::error::ToolError;
use settlr_core::geo::Ring;
use settlr_core::notify::MapEvent;
use settlr_core::region::Listing;
use settlr_core::tool::{Tool, ToolName, ToolOutput, parse_arguments};
use settlr_core::turn::TurnContext;
use tracing::{debug, info};

/// Listings echoed back to the model; the map receives all of them.
const MAX_LISTINGS_IN_RESULT: usize = 50;

#[derive(Debug, Deserialize)]
struct FilterListingsArgs {
    region_id: i64,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    max_price: Option<u64>,
}

/// Listings strictly inside `ring`, optionally capped at `max_price` per month.
///
/// Listings whose location does not parse are skipped. With a cap, so are
/// listings whose price does not parse.
pub fn listings_within(listings: Vec<Listing>, ring: &Ring, max_price: Option<u64>) -> Vec<Listing> {
    let mut skipped = 0usize;
    let kept: Vec<Listing> = listings
        .into_iter()
        .filter(|l| match l.coordinate() {
            Some(at) => ring.contains(at),
            None => {
                skipped += 1;
                false
            }
        })
        .filter(|l| match max_price {
            Some(cap) => l.monthly_price().is_some_and(|p| p <= cap),
            None => true,
        })
        .collect();
    if skipped > 0 {
        debug!(skipped, "Skipped listings without a usable location");
    }
    kept
}

pub struct FilterListingsTool {
    deps: ToolDeps,
}

impl FilterListingsTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for FilterListingsTool {
    fn kind(&self) -> ToolName {
        ToolName::FilterListings
    }

    fn description(&self) -> &str {
        "List the rental properties inside a region and show them on the user's map, optionally \
         capped at a maximum monthly rent in pounds."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "region_id": {
                    "type": "integer",
                    "description": "Region to search"
                },
                "conversation_id": {
                    "type": "string",
                    "description": "The current conversation id"
                },
                "max_price": {
                    "type": "integer",
                    "description": "Optional maximum monthly rent in pounds"
                }
            },
            "required": ["region_id", "conversation_id"]
        })
    }

    async fn execute(
        &self,
        ctx: &TurnContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let args: FilterListingsArgs = parse_arguments(arguments)?;
        let conversation_id =
            acting_conversation(ctx, args.conversation_id.as_deref(), self.name());
        let region = owned_region(self.deps.store.as_ref(), conversation_id, args.region_id).await?;

        let listings = self.deps.store.listings().await?;
        let total = listings.len();
        let matched = listings_within(listings, &region.ring, args.max_price);

        info!(
            conversation_id = %conversation_id,
            region_id = region.id,
            total,
            matched = matched.len(),
            max_price = args.max_price,
            "Filtered listings"
        );

        let shown: Vec<&Listing> = matched.iter().take(MAX_LISTINGS_IN_RESULT).collect();
        let output = ToolOutput::json(serde_json::json!({
            "region_id": region.id,
            "region_name": region.name,
            "count": matched.len(),
            "listings": shown,
            "truncated": matched.len() > shown.len(),
        }));

        self.deps.notifier.notify(MapEvent::Listings {
            conversation_id: conversation_id.clone(),
            region_id: region.id,
            listings: matched,
        });

        Ok(output)
    }
}
