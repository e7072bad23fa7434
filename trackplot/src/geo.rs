//! Bounding boxes and geographic track filters.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::track::{Track, TrackPoint};

/// Smallest half-span (degrees) used when drawing a degenerate box.
const MIN_VIEW_HALF_SPAN: f64 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn of_points(points: &[TrackPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self::covering(points))
    }

    /// Extent of a track. Tracks are never empty, so this is always finite.
    pub fn of_track(track: &Track) -> Self {
        Self::covering(track.points())
    }

    fn covering(points: &[TrackPoint]) -> Self {
        let empty = BoundingBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        points.iter().fold(empty, |bbox, p| BoundingBox {
            min_lon: bbox.min_lon.min(p.longitude),
            max_lon: bbox.max_lon.max(p.longitude),
            min_lat: bbox.min_lat.min(p.latitude),
            max_lat: bbox.max_lat.max(p.latitude),
        })
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    pub fn union_all<I: IntoIterator<Item = BoundingBox>>(boxes: I) -> Option<BoundingBox> {
        boxes.into_iter().reduce(|acc, b| acc.union(&b))
    }

    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Grow each axis by `fraction` of its span on both sides, rounded to two decimals.
    pub fn with_margin(&self, fraction: f64) -> BoundingBox {
        let dx = self.lon_span() * fraction;
        let dy = self.lat_span() * fraction;
        BoundingBox {
            min_lon: round2(self.min_lon - dx),
            max_lon: round2(self.max_lon + dx),
            min_lat: round2(self.min_lat - dy),
            max_lat: round2(self.max_lat + dy),
        }
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.min_lon
            && self.max_lon >= other.max_lon
            && self.min_lat <= other.min_lat
            && self.max_lat >= other.max_lat
    }

    /// Axis ranges with equal spans centred on this box, for a square plot.
    /// Each range is this box's range padded outwards, so it never cuts the box.
    pub fn square_view(&self) -> (Range<f64>, Range<f64>) {
        let side = self
            .lon_span()
            .max(self.lat_span())
            .max(2.0 * MIN_VIEW_HALF_SPAN);
        let pad_lon = (side - self.lon_span()) / 2.0;
        let pad_lat = (side - self.lat_span()) / 2.0;
        (
            (self.min_lon - pad_lon)..(self.max_lon + pad_lon),
            (self.min_lat - pad_lat)..(self.max_lat + pad_lat),
        )
    }
}

/// Round half to even at two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// A named predicate over a track's extent, used to pick tracks for a render.
pub struct GeoFilter {
    name: String,
    predicate: Box<dyn Fn(&BoundingBox) -> bool>,
}

impl GeoFilter {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&BoundingBox) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }

    /// The implicit `plot_all` guard against tracks sitting near (0, 0).
    pub fn min_longitude_above(threshold: f64) -> Self {
        Self::new("all", move |extent| extent.min_lon > threshold)
    }

    pub fn from_rule(rule: &RegionRule) -> Self {
        let rule = rule.clone();
        Self::new(rule.name.clone(), move |extent| rule.matches(extent))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches_extent(&self, extent: &BoundingBox) -> bool {
        (self.predicate)(extent)
    }

    pub fn matches(&self, track: &Track) -> bool {
        self.matches_extent(&BoundingBox::of_track(track))
    }
}

impl fmt::Debug for GeoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoFilter").field("name", &self.name).finish()
    }
}

/// Declarative region test: every bound that is set must hold (strictly).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionRule {
    pub name: String,
    pub description: Option<String>,
    pub min_lat_above: Option<f64>,
    pub max_lat_below: Option<f64>,
    pub min_lon_above: Option<f64>,
    pub max_lon_below: Option<f64>,
}

impl RegionRule {
    pub fn istanbul() -> Self {
        Self {
            name: "istanbul".into(),
            description: Some("Istanbul area".into()),
            min_lat_above: Some(40.0),
            max_lon_below: Some(30.0),
            ..Self::default()
        }
    }

    pub fn antalya() -> Self {
        Self {
            name: "antalya".into(),
            description: Some("Antalya area".into()),
            max_lat_below: Some(37.2),
            min_lon_above: Some(30.0),
            ..Self::default()
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::istanbul(), Self::antalya()]
    }

    pub fn matches(&self, extent: &BoundingBox) -> bool {
        self.min_lat_above.map_or(true, |v| extent.min_lat > v)
            && self.max_lat_below.map_or(true, |v| extent.max_lat < v)
            && self.min_lon_above.map_or(true, |v| extent.min_lon > v)
            && self.max_lon_below.map_or(true, |v| extent.max_lon < v)
    }

    /// Human-readable form of the bounds, e.g. `min latitude > 40 and max longitude < 30`.
    pub fn condition(&self) -> String {
        let mut parts = Vec::new();
        if let Some(v) = self.min_lat_above {
            parts.push(format!("min latitude > {}", v));
        }
        if let Some(v) = self.max_lat_below {
            parts.push(format!("max latitude < {}", v));
        }
        if let Some(v) = self.min_lon_above {
            parts.push(format!("min longitude > {}", v));
        }
        if let Some(v) = self.max_lon_below {
            parts.push(format!("max longitude < {}", v));
        }
        if parts.is_empty() {
            "any track".to_string()
        } else {
            parts.join(" and ")
        }
    }
}
