//! Coordinates, polygon rings, and point-in-polygon containment.
//!
//! All coordinates are WGS84 degrees and serialize as `[longitude, latitude]`
//! pairs, matching GeoJSON axis order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Tolerance used when deciding whether a point lies on a ring edge.
const EDGE_EPSILON: f64 = 1e-12;

/// A single (longitude, latitude) point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }

    /// Read a coordinate from loosely shaped JSON.
    ///
    /// Accepts `[lon, lat]` arrays (numbers or numeric strings) and objects
    /// keyed `longitude`/`latitude` or `lon`/`lat`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        fn num(v: &serde_json::Value) -> Option<f64> {
            match v {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        }

        let coord = match value {
            serde_json::Value::Array(items) if items.len() == 2 => {
                Self::new(num(&items[0])?, num(&items[1])?)
            }
            serde_json::Value::Object(map) => {
                let lon = map.get("longitude").or_else(|| map.get("lon"))?;
                let lat = map.get("latitude").or_else(|| map.get("lat"))?;
                Self::new(num(lon)?, num(lat)?)
            }
            _ => return None,
        };
        coord.is_finite().then_some(coord)
    }

    /// Parse stored location text such as `"[-0.0754, 51.5246]"`.
    pub fn parse_text(text: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
        Self::from_value(&value)
    }

    fn key(&self) -> (u64, u64) {
        (self.lon.to_bits(), self.lat.to_bits())
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.lon, c.lat]
    }
}

/// A rectangular bounding box in which generated polygons must fall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoEnvelope {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GeoEnvelope {
    /// Greater London, generously rounded.
    pub const LONDON: Self = Self {
        min_lon: -0.5,
        max_lon: 0.3,
        min_lat: 51.3,
        max_lat: 51.7,
    };

    pub fn contains(&self, c: Coordinate) -> bool {
        (self.min_lon..=self.max_lon).contains(&c.lon) && (self.min_lat..=self.max_lat).contains(&c.lat)
    }

    pub fn is_well_formed(&self) -> bool {
        self.min_lon < self.max_lon && self.min_lat < self.max_lat
    }
}

impl Default for GeoEnvelope {
    fn default() -> Self {
        Self::LONDON
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RingError {
    #[error("polygon needs at least 3 distinct points, got {0}")]
    TooFewPoints(usize),

    #[error("polygon contains a non-finite coordinate")]
    NonFinite,

    #[error("point ({lon}, {lat}) lies outside the permitted area")]
    OutsideEnvelope { lon: f64, lat: f64 },
}

/// A closed polygon ring: at least 3 distinct vertices, first point repeated last.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Ring {
    points: Vec<Coordinate>,
}

impl Ring {
    /// Validate and close a ring.
    pub fn new(mut points: Vec<Coordinate>) -> Result<Self, RingError> {
        if points.iter().any(|p| !p.is_finite()) {
            return Err(RingError::NonFinite);
        }

        let distinct: HashSet<(u64, u64)> = points.iter().map(Coordinate::key).collect();
        if distinct.len() < 3 {
            return Err(RingError::TooFewPoints(distinct.len()));
        }

        if points.first() != points.last() {
            points.push(points[0]);
        }
        Ok(Self { points })
    }

    /// Reject rings with any vertex outside `envelope`.
    pub fn ensure_within(&self, envelope: &GeoEnvelope) -> Result<(), RingError> {
        match self.points.iter().find(|p| !envelope.contains(**p)) {
            Some(p) => Err(RingError::OutsideEnvelope { lon: p.lon, lat: p.lat }),
            None => Ok(()),
        }
    }

    /// Vertices including the closing point.
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether `p` lies strictly inside the ring. Points on an edge or vertex
    /// are outside.
    pub fn contains(&self, p: Coordinate) -> bool {
        if !p.is_finite() || self.on_boundary(p) {
            return false;
        }

        let mut inside = false;
        for edge in self.points.windows(2) {
            let (a, b) = (edge[0], edge[1]);
            if (a.lat > p.lat) != (b.lat > p.lat) {
                let x = a.lon + (p.lat - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
                if p.lon < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    fn on_boundary(&self, p: Coordinate) -> bool {
        self.points.windows(2).any(|edge| on_segment(edge[0], edge[1], p))
    }
}

impl<'de> Deserialize<'de> for Ring {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let points = Vec::<Coordinate>::deserialize(deserializer)?;
        Ring::new(points).map_err(serde::de::Error::custom)
    }
}

fn on_segment(a: Coordinate, b: Coordinate, p: Coordinate) -> bool {
    let cross = (b.lon - a.lon) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lon - a.lon);
    let scale = (b.lon - a.lon).abs().max((b.lat - a.lat).abs()).max(1.0);
    if cross.abs() > EDGE_EPSILON * scale {
        return false;
    }
    p.lon >= a.lon.min(b.lon) - EDGE_EPSILON
        && p.lon <= a.lon.max(b.lon) + EDGE_EPSILON
        && p.lat >= a.lat.min(b.lat) - EDGE_EPSILON
        && p.lat <= a.lat.max(b.lat) + EDGE_EPSILON
}
