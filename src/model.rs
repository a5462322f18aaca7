//! The trip data model: spots, days, and the segments between them.
//!
//! These types mirror the persisted trip document: camelCase keys,
//! coordinates as `[lat, lng]` pairs, and optional fields omitted when
//! absent. All mutation goes through the trip store; nothing outside it
//! writes these fields directly.

use serde::{Deserialize, Serialize};

use crate::colors;
use crate::geometry::LineString;
use crate::ident::generate_id;

/// Geographic coordinate, serialized as a `[lat, lng]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng(pub f64, pub f64);

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self(lat, lng)
    }

    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lng(&self) -> f64 {
        self.1
    }
}

/// Transport mode for a segment. Missing modes in older documents default
/// to driving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Walk,
    #[default]
    Drive,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Walk => "walk",
            TransportMode::Drive => "drive",
        }
    }
}

/// A user-placed point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spot {
    pub id: String,
    pub name: String,
    pub coordinates: LatLng,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The transport leg between two consecutive spots in a day's order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub from_spot_id: String,
    pub to_spot_id: String,
    /// `None` means the route has not been fetched yet (or the last fetch
    /// failed); distinct from a resolved-but-empty geometry.
    #[serde(default)]
    pub route_geometry: Option<LineString>,
    #[serde(default)]
    pub mode: TransportMode,
    /// Travel time in seconds, set together with the geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Travel distance in meters, set together with the geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Overrides the day color when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Overrides the default rendered width when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

impl Segment {
    /// A fresh placeholder for a newly adjacent pair; route data is
    /// fetched later by the reconciler.
    pub fn placeholder(from_spot_id: impl Into<String>, to_spot_id: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            from_spot_id: from_spot_id.into(),
            to_spot_id: to_spot_id.into(),
            route_geometry: None,
            mode: TransportMode::default(),
            duration: None,
            distance: None,
            link: None,
            notes: None,
            color: None,
            width: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.route_geometry.is_some()
    }

    /// Drops fetched route data, marking the segment for re-fetch.
    pub fn clear_route(&mut self) {
        self.route_geometry = None;
        self.duration = None;
        self.distance = None;
    }

    /// Rendered color: the segment override, else the owning day's color.
    pub fn render_color<'a>(&'a self, day: &'a Day) -> &'a str {
        self.color.as_deref().unwrap_or(&day.color)
    }

    /// Rendered width: the segment override, else the default.
    pub fn render_width(&self) -> f64 {
        self.width.unwrap_or(colors::DEFAULT_SEGMENT_WIDTH)
    }
}

/// An ordered grouping of spots representing one day's itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub id: String,
    pub label: String,
    pub color: String,
    /// Itinerary order; unique within the day, every id references a live
    /// spot.
    #[serde(default)]
    pub spot_ids: Vec<String>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// Overnight base for the day, if designated. Must be a member of
    /// `spot_ids` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stay_spot_id: Option<String>,
}

impl Day {
    /// The overnight-stay spot for display: the designated spot when it is
    /// still a member of the day, else the last spot in order. Never
    /// mutates the stored field.
    pub fn effective_stay_spot(&self) -> Option<&str> {
        match &self.stay_spot_id {
            Some(id) if self.spot_ids.iter().any(|s| s == id) => Some(id),
            _ => self.spot_ids.last().map(String::as_str),
        }
    }
}

/// Root aggregate; owns spots and days exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub spots: Vec<Spot>,
    #[serde(default)]
    pub days: Vec<Day>,
}

impl Trip {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            description: None,
            spots: Vec::new(),
            days: Vec::new(),
        }
    }

    pub fn spot(&self, id: &str) -> Option<&Spot> {
        self.spots.iter().find(|s| s.id == id)
    }

    pub fn spot_mut(&mut self, id: &str) -> Option<&mut Spot> {
        self.spots.iter_mut().find(|s| s.id == id)
    }

    pub fn day(&self, id: &str) -> Option<&Day> {
        self.days.iter().find(|d| d.id == id)
    }

    pub fn day_mut(&mut self, id: &str) -> Option<&mut Day> {
        self.days.iter_mut().find(|d| d.id == id)
    }
}

/// Backfills fields that older persisted documents lack. Runs on every
/// load and import.
///
/// Days without `spotIds` get them derived by walking the legacy segment
/// chain: the first segment's origin, then each segment's destination in
/// order. Missing segment modes already default to drive at parse time.
pub fn migrate_trip(trip: &mut Trip) {
    for day in &mut trip.days {
        if day.spot_ids.is_empty() && !day.segments.is_empty() {
            let mut ids = Vec::with_capacity(day.segments.len() + 1);
            ids.push(day.segments[0].from_spot_id.clone());
            for segment in &day.segments {
                ids.push(segment.to_spot_id.clone());
            }
            day.spot_ids = ids;
        }
    }
}
