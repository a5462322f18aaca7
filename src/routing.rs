//! Route provider adapters.
//!
//! Translates a `(from, to, mode)` request into resolved route geometry
//! with a bounded wait. Providers never retry internally; retry policy
//! belongs to the reconciler (which only re-triggers on structural
//! change).

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::geometry::LineString;
use crate::model::{LatLng, TransportMode};
use crate::settings::{MapProvider, SettingsStore};

/// Bound on how long a single route request may take before it is aborted.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const OSRM_BASE_URL: &str = "https://router.project-osrm.org";
const GOOGLE_ROUTES_URL: &str = "https://routes.googleapis.com/directions/v2:computeRoutes";

/// A resolved transport leg.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub geometry: LineString,
    pub duration_secs: u32,
    pub distance_meters: f64,
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing request timed out")]
    Timeout,
    #[error("routing request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("routing service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("no route found")]
    NoRoute,
    #[error("no API key configured for the selected provider")]
    MissingApiKey,
}

impl From<reqwest::Error> for RoutingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RoutingError::Timeout
        } else if let Some(status) = err.status() {
            RoutingError::Status(status)
        } else {
            RoutingError::Http(err)
        }
    }
}

/// Computes the route between two coordinates for a transport mode.
pub trait RouteProvider: Send + Sync {
    fn compute_route(
        &self,
        from: LatLng,
        to: LatLng,
        mode: TransportMode,
    ) -> Result<RouteResult, RoutingError>;
}

fn blocking_client(timeout: Duration) -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder().timeout(timeout).build()
}

// ----------------------------------------------------------------------
// OSRM (keyless)
// ----------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: OSRM_BASE_URL.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Free OSM-based router.
#[derive(Debug, Clone)]
pub struct OsrmRouter {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl OsrmRouter {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: config.base_url,
            client: blocking_client(config.timeout)?,
        })
    }

    fn with_client(client: reqwest::blocking::Client, base_url: String) -> Self {
        Self { base_url, client }
    }

    fn profile(mode: TransportMode) -> &'static str {
        match mode {
            TransportMode::Walk => "foot",
            TransportMode::Drive => "driving",
        }
    }
}

impl RouteProvider for OsrmRouter {
    fn compute_route(
        &self,
        from: LatLng,
        to: LatLng,
        mode: TransportMode,
    ) -> Result<RouteResult, RoutingError> {
        // OSRM expects lng,lat order.
        let coords = format!(
            "{:.6},{:.6};{:.6},{:.6}",
            from.lng(),
            from.lat(),
            to.lng(),
            to.lat()
        );
        let url = format!(
            "{}/route/v1/{}/{}?overview=full&geometries=geojson",
            self.base_url,
            Self::profile(mode),
            coords
        );

        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(RoutingError::Status(response.status()));
        }
        let body: OsrmRouteResponse = response.json()?;
        let route = body.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
        Ok(RouteResult {
            geometry: route.geometry,
            duration_secs: route.duration.round() as u32,
            distance_meters: route.distance,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: LineString,
    duration: f64,
    distance: f64,
}

// ----------------------------------------------------------------------
// Google Routes (key-gated)
// ----------------------------------------------------------------------

/// Commercial router using the Google Routes API.
#[derive(Debug, Clone)]
pub struct GoogleRouter {
    api_key: String,
    client: reqwest::blocking::Client,
}

impl GoogleRouter {
    pub fn new(api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api_key: api_key.into(),
            client: blocking_client(REQUEST_TIMEOUT)?,
        })
    }

    fn with_client(client: reqwest::blocking::Client, api_key: String) -> Self {
        Self { api_key, client }
    }

    fn travel_mode(mode: TransportMode) -> &'static str {
        match mode {
            TransportMode::Walk => "WALK",
            TransportMode::Drive => "DRIVE",
        }
    }
}

impl RouteProvider for GoogleRouter {
    fn compute_route(
        &self,
        from: LatLng,
        to: LatLng,
        mode: TransportMode,
    ) -> Result<RouteResult, RoutingError> {
        let body = serde_json::json!({
            "origin": {
                "location": { "latLng": { "latitude": from.lat(), "longitude": from.lng() } }
            },
            "destination": {
                "location": { "latLng": { "latitude": to.lat(), "longitude": to.lng() } }
            },
            "travelMode": Self::travel_mode(mode),
            "polylineEncoding": "GEO_JSON_LINESTRING",
        });

        let response = self
            .client
            .post(GOOGLE_ROUTES_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header(
                "X-Goog-FieldMask",
                "routes.duration,routes.distanceMeters,routes.polyline",
            )
            .json(&body)
            .send()?;
        if !response.status().is_success() {
            return Err(RoutingError::Status(response.status()));
        }
        let parsed: GoogleRoutesResponse = response.json()?;
        let route = parsed
            .routes
            .into_iter()
            .next()
            .ok_or(RoutingError::NoRoute)?;
        Ok(RouteResult {
            geometry: route.polyline.geo_json_linestring,
            duration_secs: parse_google_duration(route.duration.as_deref()),
            distance_meters: route.distance_meters,
        })
    }
}

/// The Routes API reports durations as strings like `"300s"`.
fn parse_google_duration(raw: Option<&str>) -> u32 {
    raw.unwrap_or("0s")
        .trim_end_matches('s')
        .parse()
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct GoogleRoutesResponse {
    #[serde(default)]
    routes: Vec<GoogleRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRoute {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    distance_meters: f64,
    polyline: GooglePolyline,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePolyline {
    geo_json_linestring: LineString,
}

// ----------------------------------------------------------------------
// Settings-driven dispatch
// ----------------------------------------------------------------------

/// Selects the backend from the current settings at call time rather than
/// binding one at construction.
pub struct SettingsRouter {
    settings: Arc<SettingsStore>,
    client: reqwest::blocking::Client,
    osrm_base_url: String,
}

impl SettingsRouter {
    pub fn new(settings: Arc<SettingsStore>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            settings,
            client: blocking_client(REQUEST_TIMEOUT)?,
            osrm_base_url: OSRM_BASE_URL.to_string(),
        })
    }
}

impl RouteProvider for SettingsRouter {
    fn compute_route(
        &self,
        from: LatLng,
        to: LatLng,
        mode: TransportMode,
    ) -> Result<RouteResult, RoutingError> {
        let settings = self.settings.current();
        match settings.map_provider {
            MapProvider::Free => {
                OsrmRouter::with_client(self.client.clone(), self.osrm_base_url.clone())
                    .compute_route(from, to, mode)
            }
            MapProvider::Google => {
                if settings.google_api_key.is_empty() {
                    return Err(RoutingError::MissingApiKey);
                }
                GoogleRouter::with_client(self.client.clone(), settings.google_api_key)
                    .compute_route(from, to, mode)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osrm_profile_mapping() {
        assert_eq!(OsrmRouter::profile(TransportMode::Walk), "foot");
        assert_eq!(OsrmRouter::profile(TransportMode::Drive), "driving");
    }

    #[test]
    fn test_google_travel_mode_mapping() {
        assert_eq!(GoogleRouter::travel_mode(TransportMode::Walk), "WALK");
        assert_eq!(GoogleRouter::travel_mode(TransportMode::Drive), "DRIVE");
    }

    #[test]
    fn test_parse_google_duration() {
        assert_eq!(parse_google_duration(Some("300s")), 300);
        assert_eq!(parse_google_duration(Some("0s")), 0);
        assert_eq!(parse_google_duration(None), 0);
        assert_eq!(parse_google_duration(Some("garbage")), 0);
    }

    #[test]
    fn test_osrm_response_parses_geojson_geometry() {
        let json = r#"{
            "routes": [{
                "geometry": {"type": "LineString", "coordinates": [[-115.17, 36.11], [-115.15, 36.17]]},
                "duration": 734.6,
                "distance": 9182.3
            }]
        }"#;
        let parsed: OsrmRouteResponse = serde_json::from_str(json).expect("parse");
        let route = &parsed.routes[0];
        assert_eq!(route.geometry.coordinates().len(), 2);
        assert_eq!(route.duration.round() as u32, 735);
    }

    #[test]
    fn test_google_response_parses_polyline() {
        let json = r#"{
            "routes": [{
                "duration": "642s",
                "distanceMeters": 8210.0,
                "polyline": {
                    "geoJsonLinestring": {"type": "LineString", "coordinates": [[-115.17, 36.11]]}
                }
            }]
        }"#;
        let parsed: GoogleRoutesResponse = serde_json::from_str(json).expect("parse");
        let route = &parsed.routes[0];
        assert_eq!(parse_google_duration(route.duration.as_deref()), 642);
        assert_eq!(route.distance_meters, 8210.0);
    }

    #[test]
    fn test_empty_routes_is_no_route() {
        let parsed: OsrmRouteResponse = serde_json::from_str(r#"{"routes": []}"#).expect("parse");
        assert!(parsed.routes.is_empty());
    }
}
