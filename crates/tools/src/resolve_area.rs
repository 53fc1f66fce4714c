//! Area resolution: turn a place name into a stored region polygon.
//!
//! Pre-seeded boundaries are tried first. Only when none matches is a
//! polygon generated by a secondary model call, which must come back closed,
//! with at least three points, and inside the configured envelope.

use crate::{ToolDeps, acting_conversation, boundary_match, lenient};
use async_trait::async_trait;
use serde::Deserialize;
use settlr_core::error::ToolError;
use settlr_core::geo::{Coordinate, Ring};
use settlr_core::message::Message;
use settlr_core::notify::MapEvent;
use settlr_core::provider::ProviderRequest;
use settlr_core::tool::{Tool, ToolName, ToolOutput, parse_arguments};
use settlr_core::turn::TurnContext;
use std::time::Instant;
use tracing::{debug, info, warn};

const POLYGON_MAX_TOKENS: u32 = 1000;
const POLYGON_TEMPERATURE: f32 = 0.1;

const POLYGON_PROMPT: &str = "You are a London geography expert. Generate precise coordinates for \
the requested area by following the major streets that form its recognized boundaries.

Method:
1. Identify the roads, railways, canals, or landmarks locals recognize as the area's borders.
2. Place coordinates at major intersections of those streets, adding points every 200-500 meters \
along long or curved edges. Use 8-15 coordinates, moving consistently in one direction.
3. Check that the polygon encloses the area's main landmarks and excludes its neighbors.

Requirements:
- Format: [longitude, latitude] in decimal degrees (WGS84), at least 4 decimal places.
- Longitude between -0.5 and 0.3, latitude between 51.3 and 51.7.
- Close the polygon: the last coordinate repeats the first.

Return ONLY a JSON object, with no comments or explanation:
{\"coordinates\": [[-0.0781, 51.5265], [-0.0745, 51.5285], [-0.0725, 51.5245], [-0.0781, 51.5265]]}";

#[derive(Debug, Deserialize)]
struct ResolveAreaArgs {
    area_name: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

pub struct ResolveAreaTool {
    deps: ToolDeps,
}

impl ResolveAreaTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }

    /// Ask the tool model for a polygon and validate it.
    async fn generate_ring(&self, area_name: &str) -> Result<Ring, ToolError> {
        let settings = &self.deps.settings;
        let request = ProviderRequest::new(
            settings.tool_model.clone(),
            vec![
                Message::system(POLYGON_PROMPT),
                Message::user(format!(
                    "Build a street-based polygon for {area_name} in London using major boundary streets and intersections."
                )),
                Message::assistant("{"),
            ],
        )
        .with_temperature(POLYGON_TEMPERATURE)
        .with_max_tokens(POLYGON_MAX_TOKENS);

        let response = self.deps.provider.complete(request).await?;
        let raw = format!("{{{}", response.message.content.trim());

        let parsed = lenient::parse_object(&raw).ok_or_else(|| {
            warn!(area = area_name, output = %raw, "Unparseable polygon output");
            ToolError::Failed(format!("Could not read a polygon for {area_name}"))
        })?;

        let raw_points = parsed
            .get("coordinates")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ToolError::Failed(format!("No coordinates returned for {area_name}")))?;
        let points: Vec<Coordinate> = raw_points.iter().filter_map(Coordinate::from_value).collect();
        if points.len() < raw_points.len() {
            // A truncated trailing pair is the usual culprit.
            warn!(
                area = area_name,
                skipped = raw_points.len() - points.len(),
                "Dropped malformed polygon coordinates"
            );
        }

        let ring = Ring::new(points)
            .map_err(|e| ToolError::Failed(format!("Invalid polygon for {area_name}: {e}")))?;
        ring.ensure_within(&settings.envelope)
            .map_err(|e| ToolError::Failed(format!("Invalid polygon for {area_name}: {e}")))?;
        Ok(ring)
    }
}

#[async_trait]
impl Tool for ResolveAreaTool {
    fn kind(&self) -> ToolName {
        ToolName::ResolveArea
    }

    fn description(&self) -> &str {
        "Resolve a London area or neighborhood name to a boundary polygon and draw it on the \
         user's map. Returns the new region_id, which the other tools need."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "area_name": {
                    "type": "string",
                    "description": "Name of the London area, e.g. \"Shoreditch\" or \"Stratford International\""
                },
                "conversation_id": {
                    "type": "string",
                    "description": "The current conversation id"
                }
            },
            "required": ["area_name", "conversation_id"]
        })
    }

    async fn execute(
        &self,
        ctx: &TurnContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let args: ResolveAreaArgs = parse_arguments(arguments)?;
        let area_name = args.area_name.trim();
        if area_name.is_empty() {
            return Err(ToolError::InvalidArguments("area_name is empty".into()));
        }
        let conversation_id =
            acting_conversation(ctx, args.conversation_id.as_deref(), self.name());
        let start = Instant::now();

        let boundaries = self.deps.store.boundaries().await?;
        let (name, ring, source) = match boundary_match::find(&boundaries, area_name) {
            Some(boundary) => {
                debug!(area = area_name, matched = %boundary.name, "Using stored boundary");
                (boundary.name.clone(), boundary.ring.clone(), "boundary")
            }
            None => {
                let ring = self.generate_ring(area_name).await?;
                (area_name.to_string(), ring, "generated")
            }
        };

        let region = self
            .deps
            .store
            .insert_region(conversation_id, &name, &ring)
            .await?;
        self.deps.notifier.notify(MapEvent::Refresh {
            conversation_id: conversation_id.clone(),
        });

        info!(
            conversation_id = %conversation_id,
            region_id = region.id,
            region = %region.name,
            source,
            points = ring.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Resolved area"
        );

        Ok(ToolOutput::json(serde_json::json!({
            "region_id": region.id,
            "region_name": region.name,
            "coordinates": region.ring,
            "source": source,
        })))
    }
}
