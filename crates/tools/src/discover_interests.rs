//! Point-of-interest discovery inside a region.
//!
//! A secondary model call proposes candidates per interest label. Candidates
//! are kept only if they fall strictly inside the region polygon, then
//! deduplicated within their label, ranked, capped, and stored as one
//! point-of-interest set per label.

use crate::{ToolDeps, acting_conversation, lenient, owned_region};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use settlr_core::error::ToolError;
use settlr_core::geo::{Coordinate, Ring};
use settlr_core::message::Message;
use settlr_core::notify::MapEvent;
use settlr_core::provider::ProviderRequest;
use settlr_core::region::{PointOfInterest, Region};
use settlr_core::tool::{Tool, ToolName, ToolOutput, parse_arguments};
use settlr_core::turn::TurnContext;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, warn};

const DISCOVERY_TEMPERATURE: f32 = 0.1;

const DISCOVERY_PROMPT: &str = "You are a specialized sub-agent that finds points of interest \
inside a geographic region for a list of user interests.

For each interest, find up to {max} of the most relevant real places that lie inside the polygon. \
Be flexible with interpretation (\"coffee lover\" covers cafes, coffee shops, and roasteries). \
Prefer highly rated, currently operating places with many reviews. Exclude permanently closed \
places and remove duplicates.

Return ONLY a JSON object mapping each interest to an array of places:
{\"interest\": [{\"name\": \"Place\", \"coordinates\": {\"latitude\": 51.5, \"longitude\": -0.1}, \
\"address\": \"Full address\", \"rating\": 4.5, \"review_count\": 123, \
\"categories\": [\"category\"], \"website\": \"https://example.com\", \
\"gmaps_link\": \"https://maps.app.goo.gl/...\"}]}
Use an empty array for an interest with no matches.";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Interests {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct DiscoverInterestsArgs {
    #[serde(default)]
    conversation_id: Option<String>,
    region_id: i64,
    user_interests: Interests,
}

/// A candidate as the model describes it.
#[derive(Debug, Deserialize)]
struct Candidate {
    name: String,
    #[serde(default)]
    coordinates: Option<Value>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    review_count: Option<u32>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    gmaps_link: Option<String>,
}

impl Candidate {
    fn into_point(self) -> Option<PointOfInterest> {
        let at = self
            .coordinates
            .as_ref()
            .and_then(Coordinate::from_value)
            .or_else(|| Some(Coordinate::new(self.longitude?, self.latitude?)))?;
        let name = self.name.trim().to_string();
        if name.is_empty() || !at.is_finite() {
            return None;
        }
        Some(PointOfInterest {
            name,
            latitude: at.lat,
            longitude: at.lon,
            address: self.address,
            rating: self.rating.filter(|r| r.is_finite()),
            review_count: self.review_count,
            categories: self.categories,
            website: self.website,
            gmaps_link: self.gmaps_link,
        })
    }
}

/// Split `"[karaoke bars, 'boxing clubs']"` into labels.
///
/// Brackets and quotes are stripped, blanks dropped, and repeats removed
/// case-insensitively with the first spelling kept.
pub fn parse_interests(text: &str) -> Vec<String> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    let mut seen = HashSet::new();
    inner
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(String::from)
        .collect()
}

/// Keep candidates strictly inside `ring`, drop repeats, rank, and cap.
///
/// Repeats share a case-insensitive name and the same position to six
/// decimal places. Ranking is by rating, then review count, both descending;
/// unrated places sort last.
pub fn select_points(
    candidates: Vec<PointOfInterest>,
    ring: &Ring,
    max: usize,
) -> Vec<PointOfInterest> {
    let mut seen = HashSet::new();
    let mut points: Vec<PointOfInterest> = candidates
        .into_iter()
        .filter(|p| ring.contains(p.coordinate()))
        .filter(|p| {
            seen.insert((
                p.name.to_lowercase(),
                (p.latitude * 1e6).round() as i64,
                (p.longitude * 1e6).round() as i64,
            ))
        })
        .collect();

    points.sort_by(|a, b| {
        let rating = match (a.rating, b.rating) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        rating.then_with(|| b.review_count.unwrap_or(0).cmp(&a.review_count.unwrap_or(0)))
    });
    points.truncate(max);
    points
}

pub struct DiscoverInterestsTool {
    deps: ToolDeps,
}

impl DiscoverInterestsTool {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }

    async fn ask_model(&self, region: &Region, labels: &[String]) -> Result<String, ToolError> {
        let settings = &self.deps.settings;
        let coordinates = serde_json::to_string(&region.ring)
            .map_err(|e| ToolError::Failed(format!("Could not encode region: {e}")))?;
        let system = DISCOVERY_PROMPT.replace("{max}", &settings.max_pois_per_interest.to_string());
        let user = format!(
            "Area: {}\nPolygon ([longitude, latitude]): {coordinates}\nInterests: [{}]",
            region.name,
            labels.join(", ")
        );

        let request = ProviderRequest::new(
            settings.tool_model.clone(),
            vec![
                Message::system(system),
                Message::user(user),
                Message::assistant("{"),
            ],
        )
        .with_temperature(DISCOVERY_TEMPERATURE)
        .with_max_tokens(settings.tool_max_tokens);

        let response = self.deps.provider.complete(request).await?;
        Ok(format!("{{{}", response.message.content.trim()))
    }
}

#[async_trait]
impl Tool for DiscoverInterestsTool {
    fn kind(&self) -> ToolName {
        ToolName::DiscoverInterests
    }

    fn description(&self) -> &str {
        "Find the best places matching the user's interests inside a region and pin them on the \
         user's map. Returns up to 20 ranked places per interest."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "conversation_id": {
                    "type": "string",
                    "description": "The current conversation id"
                },
                "region_id": {
                    "type": "integer",
                    "description": "Region to search, as returned by resolve_area"
                },
                "user_interests": {
                    "type": "string",
                    "description": "Bracketed, comma-separated interests, e.g. \"[karaoke bars, boxing clubs, pizza places]\""
                }
            },
            "required": ["conversation_id", "region_id", "user_interests"]
        })
    }

    async fn execute(
        &self,
        ctx: &TurnContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let args: DiscoverInterestsArgs = parse_arguments(arguments)?;
        let labels = match &args.user_interests {
            Interests::Text(text) => parse_interests(text),
            Interests::List(items) => parse_interests(&items.join(",")),
        };
        if labels.is_empty() {
            return Err(ToolError::InvalidArguments("user_interests is empty".into()));
        }
        let conversation_id =
            acting_conversation(ctx, args.conversation_id.as_deref(), self.name());
        let region = owned_region(self.deps.store.as_ref(), conversation_id, args.region_id).await?;
        let start = Instant::now();

        let raw = self.ask_model(&region, &labels).await?;
        let Some(parsed) = lenient::parse_object(&raw) else {
            warn!(
                conversation_id = %conversation_id,
                region_id = region.id,
                output = %raw,
                "Unrepairable discovery output, nothing saved"
            );
            return Ok(ToolOutput::text(format!(
                "Could not read places for {} in {}. Nothing was saved; try again or rephrase the interests.",
                labels.join(", "),
                region.name
            )));
        };

        let max = self.deps.settings.max_pois_per_interest;
        let mut sets: Vec<(String, Vec<PointOfInterest>)> = Vec::new();
        for (key, value) in parsed {
            // Prefer the user's spelling when the model echoes a label.
            let label = labels
                .iter()
                .find(|l| l.eq_ignore_ascii_case(key.trim()))
                .cloned()
                .unwrap_or(key);
            let candidates = match value {
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value::<Candidate>(item).ok())
                    .filter_map(Candidate::into_point)
                    .collect(),
                _ => Vec::new(),
            };
            sets.push((label, select_points(candidates, &region.ring, max)));
        }

        self.deps.store.insert_poi_sets(&region, &sets).await?;
        let found: serde_json::Map<String, Value> = sets
            .into_iter()
            .map(|(label, points)| (label, serde_json::to_value(&points).unwrap_or_default()))
            .collect();

        if !found.is_empty() {
            self.deps.notifier.notify(MapEvent::Refresh {
                conversation_id: conversation_id.clone(),
            });
        }

        let missing: Vec<&String> = labels.iter().filter(|l| !found.contains_key(*l)).collect();
        info!(
            conversation_id = %conversation_id,
            region_id = region.id,
            interests = found.len(),
            missing = missing.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Discovered points of interest"
        );

        Ok(ToolOutput::json(serde_json::json!({
            "region_id": region.id,
            "region_name": region.name,
            "points_of_interest": found,
            "no_results": missing,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedProvider, seeded_region, square, test_deps};
    use settlr_core::message::ConversationId;
    use settlr_core::store::GeoStore;

    fn poi(name: &str, lon: f64, lat: f64, rating: Option<f64>, reviews: Option<u32>) -> PointOfInterest {
        PointOfInterest {
            name: name.into(),
            latitude: lat,
            longitude: lon,
            address: None,
            rating,
            review_count: reviews,
            categories: vec![],
            website: None,
            gmaps_link: None,
        }
    }

    #[test]
    fn interests_are_split_and_cleaned() {
        assert_eq!(
            parse_interests("[karaoke bars, 'boxing clubs', \"pizza places\", , Karaoke Bars]"),
            vec!["karaoke bars", "boxing clubs", "pizza places"]
        );
        assert_eq!(parse_interests("gyms"), vec!["gyms"]);
        assert!(parse_interests("[]").is_empty());
    }

    #[test]
    fn selection_filters_dedupes_and_ranks() {
        let candidates = vec![
            poi("Low", -0.075, 51.525, Some(3.9), Some(900)),
            poi("Outside", -0.065, 51.525, Some(5.0), Some(10)),
            poi("Top", -0.074, 51.524, Some(4.8), Some(50)),
            poi("top", -0.074, 51.524, Some(4.8), Some(50)),
            poi("Tied", -0.073, 51.523, Some(4.8), Some(500)),
            poi("Unrated", -0.072, 51.522, None, Some(1000)),
            poi("Edge", -0.08, 51.525, Some(4.9), Some(10)),
        ];
        let names: Vec<_> = select_points(candidates, &square(), 20)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Tied", "Top", "Low", "Unrated"]);
    }

    #[test]
    fn selection_capped() {
        let candidates = (0..30)
            .map(|i| poi(&format!("P{i}"), -0.075, 51.521 + i as f64 * 0.0002, Some(4.0), Some(i)))
            .collect();
        assert_eq!(select_points(candidates, &square(), 20).len(), 20);
    }

    #[test]
    fn candidate_accepts_flat_coordinates() {
        let c: Candidate = serde_json::from_value(serde_json::json!({
            "name": "Flat", "latitude": 51.52, "longitude": -0.07
        }))
        .unwrap();
        let p = c.into_point().unwrap();
        assert_eq!((p.longitude, p.latitude), (-0.07, 51.52));
    }

    #[tokio::test]
    async fn discovered_points_are_stored_per_interest() {
        let provider = ScriptedProvider::replying(
            r#""Karaoke Bars": [
                {"name": "Lucky Voice", "coordinates": {"latitude": 51.525, "longitude": -0.075}, "rating": 4.4, "review_count": 300},
                {"name": "Far Away", "coordinates": {"latitude": 51.6, "longitude": -0.2}, "rating": 5.0}
            ],
            "boxing clubs": []
            }"#,
        );
        let (deps, store, events) = test_deps(provider.clone());
        let region = seeded_region(&store, "c1").await;
        let ctx = TurnContext::new(ConversationId::from("c1"), "I like karaoke");

        let out = DiscoverInterestsTool::new(deps)
            .execute(
                &ctx,
                serde_json::json!({
                    "conversation_id": "c1",
                    "region_id": region.id,
                    "user_interests": "[karaoke bars, boxing clubs]"
                }),
            )
            .await
            .unwrap();

        let sets = store.poi_sets(region.id).await.unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].interest, "karaoke bars");
        assert_eq!(sets[0].points.len(), 1);
        assert!(sets[1].points.is_empty());
        assert_eq!(events.taken().len(), 1);

        let data = out.data.unwrap();
        assert_eq!(data["points_of_interest"]["karaoke bars"][0]["name"], "Lucky Voice");

        let request = provider.request(0);
        assert_eq!(request.max_tokens, Some(5000));
        assert_eq!(request.messages.last().unwrap().content, "{");
    }

    #[tokio::test]
    async fn unrepairable_output_saves_nothing() {
        let provider = ScriptedProvider::replying("sorry, ] I cannot help with that");
        let (deps, store, events) = test_deps(provider);
        let region = seeded_region(&store, "c1").await;
        let ctx = TurnContext::new(ConversationId::from("c1"), "hi");

        let out = DiscoverInterestsTool::new(deps)
            .execute(
                &ctx,
                serde_json::json!({"region_id": region.id, "user_interests": "[gyms]"}),
            )
            .await
            .unwrap();

        assert!(out.text.contains("Nothing was saved"));
        assert!(store.poi_sets(region.id).await.unwrap().is_empty());
        assert!(events.taken().is_empty());
    }

    #[tokio::test]
    async fn foreign_region_is_forbidden() {
        let provider = ScriptedProvider::new(vec![]);
        let (deps, store, _events) = test_deps(provider.clone());
        let region = seeded_region(&store, "owner").await;
        let ctx = TurnContext::new(ConversationId::from("intruder"), "hi");

        let err = DiscoverInterestsTool::new(deps)
            .execute(
                &ctx,
                serde_json::json!({
                    "conversation_id": "owner",
                    "region_id": region.id,
                    "user_interests": "[gyms]"
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Forbidden { .. }));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn interests_accepted_as_list() {
        let provider = ScriptedProvider::replying(r#""gyms": []}"#);
        let (deps, store, _events) = test_deps(provider);
        let region = seeded_region(&store, "c1").await;
        let ctx = TurnContext::new(ConversationId::from("c1"), "hi");

        DiscoverInterestsTool::new(deps)
            .execute(
                &ctx,
                serde_json::json!({"region_id": region.id, "user_interests": ["gyms"]}),
            )
            .await
            .unwrap();
        assert_eq!(store.poi_sets(region.id).await.unwrap()[0].interest, "gyms");
    }
}
