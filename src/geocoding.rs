//! Geocoding adapters: free-text place search.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::LatLng;
use crate::routing::REQUEST_TIMEOUT;
use crate::settings::{MapProvider, SettingsStore};

const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";
const GOOGLE_PLACES_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const RESULT_LIMIT: usize = 8;

/// One place search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub coordinates: LatLng,
    pub display_name: String,
}

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("geocoding request timed out")]
    Timeout,
    #[error("geocoding request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("geocoding service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("no API key configured for the selected provider")]
    MissingApiKey,
}

impl From<reqwest::Error> for GeocodingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GeocodingError::Timeout
        } else if let Some(status) = err.status() {
            GeocodingError::Status(status)
        } else {
            GeocodingError::Http(err)
        }
    }
}

/// Looks up coordinates for a free-text query.
pub trait Geocoder: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<Place>, GeocodingError>;
}

fn blocking_client(timeout: Duration) -> Result<reqwest::blocking::Client, reqwest::Error> {
    reqwest::blocking::Client::builder().timeout(timeout).build()
}

/// Keyless geocoder backed by Nominatim.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: NOMINATIM_BASE_URL.to_string(),
            client: blocking_client(REQUEST_TIMEOUT)?,
        })
    }

    fn with_client(client: reqwest::blocking::Client, base_url: String) -> Self {
        Self { base_url, client }
    }
}

impl Geocoder for NominatimGeocoder {
    fn search(&self, query: &str) -> Result<Vec<Place>, GeocodingError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let limit = RESULT_LIMIT.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
            ])
            .header("Accept-Language", "en")
            .send()?;
        if !response.status().is_success() {
            return Err(GeocodingError::Status(response.status()));
        }
        let items: Vec<NominatimItem> = response.json()?;
        Ok(items
            .into_iter()
            .filter_map(NominatimItem::into_place)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct NominatimItem {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    name: Option<String>,
}

impl NominatimItem {
    fn into_place(self) -> Option<Place> {
        let lat: f64 = self.lat.parse().ok()?;
        let lng: f64 = self.lon.parse().ok()?;
        let name = match self.name {
            Some(name) if !name.is_empty() => name,
            _ => self
                .display_name
                .split(',')
                .next()
                .unwrap_or(&self.display_name)
                .trim()
                .to_string(),
        };
        Some(Place {
            name,
            coordinates: LatLng::new(lat, lng),
            display_name: self.display_name,
        })
    }
}

/// Key-gated geocoder backed by Google Places text search.
#[derive(Debug, Clone)]
pub struct GooglePlacesGeocoder {
    api_key: String,
    client: reqwest::blocking::Client,
}

impl GooglePlacesGeocoder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            api_key: api_key.into(),
            client: blocking_client(REQUEST_TIMEOUT)?,
        })
    }

    fn with_client(client: reqwest::blocking::Client, api_key: String) -> Self {
        Self { api_key, client }
    }
}

impl Geocoder for GooglePlacesGeocoder {
    fn search(&self, query: &str) -> Result<Vec<Place>, GeocodingError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(GOOGLE_PLACES_URL)
            .header("X-Goog-Api-Key", &self.api_key)
            .header(
                "X-Goog-FieldMask",
                "places.displayName,places.formattedAddress,places.location",
            )
            .json(&serde_json::json!({ "textQuery": query }))
            .send()?;
        if !response.status().is_success() {
            return Err(GeocodingError::Status(response.status()));
        }
        let parsed: GooglePlacesResponse = response.json()?;
        Ok(parsed
            .places
            .into_iter()
            .map(|place| Place {
                name: place.display_name.text,
                coordinates: LatLng::new(place.location.latitude, place.location.longitude),
                display_name: place.formatted_address,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct GooglePlacesResponse {
    #[serde(default)]
    places: Vec<GooglePlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePlace {
    display_name: GoogleDisplayName,
    formatted_address: String,
    location: GoogleLocation,
}

#[derive(Debug, Deserialize)]
struct GoogleDisplayName {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GoogleLocation {
    latitude: f64,
    longitude: f64,
}

/// Selects the geocoding backend from the current settings at call time.
pub struct SettingsGeocoder {
    settings: Arc<SettingsStore>,
    client: reqwest::blocking::Client,
    nominatim_base_url: String,
}

impl SettingsGeocoder {
    pub fn new(settings: Arc<SettingsStore>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            settings,
            client: blocking_client(REQUEST_TIMEOUT)?,
            nominatim_base_url: NOMINATIM_BASE_URL.to_string(),
        })
    }
}

impl Geocoder for SettingsGeocoder {
    fn search(&self, query: &str) -> Result<Vec<Place>, GeocodingError> {
        let settings = self.settings.current();
        match settings.map_provider {
            MapProvider::Free => {
                NominatimGeocoder::with_client(self.client.clone(), self.nominatim_base_url.clone())
                    .search(query)
            }
            MapProvider::Google => {
                if settings.google_api_key.is_empty() {
                    return Err(GeocodingError::MissingApiKey);
                }
                GooglePlacesGeocoder::with_client(self.client.clone(), settings.google_api_key)
                    .search(query)
            }
        }
    }
}
