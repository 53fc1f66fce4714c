//! Map entities: regions bound to a conversation, the points of interest
//! found inside them, pre-seeded area boundaries, and rental listings.

use crate::geo::{Coordinate, Ring};
use crate::message::ConversationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named polygon bound to one conversation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub name: String,
    pub ring: Ring,
    pub created_at: DateTime<Utc>,
}

/// One point of interest as returned by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmaps_link: Option<String>,
}

impl PointOfInterest {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.longitude, self.latitude)
    }
}

/// The points of interest found for one interest label within one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterestSet {
    pub id: i64,
    pub region_id: i64,
    pub conversation_id: ConversationId,
    pub interest: String,
    pub points: Vec<PointOfInterest>,
    pub created_at: DateTime<Utc>,
}

/// A pre-seeded borough or neighborhood outline used before falling back to
/// a generated polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaBoundary {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(alias = "coordinates")]
    pub ring: Ring,
}

/// A rental listing.
///
/// `location` keeps the raw `[lon, lat]` text as imported; listings whose
/// location does not parse are skipped by the filter rather than rejected at
/// import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub id: i64,
    #[serde(alias = "property_id")]
    pub reference: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "property_link")]
    pub link: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<u32>,
    #[serde(default)]
    pub area_sqm: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub floor_plan_url: Option<String>,
    #[serde(default, alias = "coordinates")]
    pub location: Option<String>,
}

impl Listing {
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.location.as_deref().and_then(Coordinate::parse_text)
    }

    /// Monthly rent in whole pounds, read from text like `£2,150 pcm`.
    ///
    /// Weekly prices (`pw`) are converted at 52 weeks / 12 months.
    pub fn monthly_price(&self) -> Option<u64> {
        let text = self.price.as_deref()?.to_ascii_lowercase();
        let digits: String = text
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
            .filter(|c| *c != ',')
            .collect();
        let amount: f64 = digits.parse().ok()?;
        let weekly = text.contains("pw") || text.contains("per week") || text.contains("/week");
        let monthly = if weekly { amount * 52.0 / 12.0 } else { amount };
        Some(monthly.round() as u64)
    }
}
