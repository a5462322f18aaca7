//! Route geometry as decoded coordinate sequences.
//!
//! Routing providers return GeoJSON-style line strings; internally the
//! geometry is kept as the decoded coordinate list. Coordinates follow
//! GeoJSON order, `[lng, lat]`.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// A route geometry as an ordered list of `[lng, lat]` coordinates.
///
/// Serializes as a GeoJSON LineString object, tag included, so exported
/// documents remain valid GeoJSON; the tag is ignored on input since
/// nothing in the system dispatches on it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineString {
    coordinates: Vec<[f64; 2]>,
}

impl Serialize for LineString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("LineString", 2)?;
        state.serialize_field("type", "LineString")?;
        state.serialize_field("coordinates", &self.coordinates)?;
        state.end()
    }
}

impl LineString {
    /// Creates a line string from `[lng, lat]` coordinates.
    pub fn new(coordinates: Vec<[f64; 2]>) -> Self {
        Self { coordinates }
    }

    /// Creates a line string from `(lat, lng)` points, converting to
    /// GeoJSON coordinate order.
    pub fn from_latlng_points(points: Vec<(f64, f64)>) -> Self {
        Self {
            coordinates: points.into_iter().map(|(lat, lng)| [lng, lat]).collect(),
        }
    }

    /// Returns a reference to the coordinates.
    pub fn coordinates(&self) -> &[[f64; 2]] {
        &self.coordinates
    }

    /// Consumes the line string and returns the owned coordinates.
    pub fn into_coordinates(self) -> Vec<[f64; 2]> {
        self.coordinates
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}
