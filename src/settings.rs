//! Map/routing provider settings.
//!
//! The active provider is read at call time by the routing and geocoding
//! dispatchers, so the user can switch providers mid-session. Switching
//! the provider (or the credential the active provider uses) invalidates
//! every fetched route in the trip: geometry, duration, and distance from
//! different providers must never be mixed.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::write_atomic;
use crate::store::TripStore;

/// Which map/routing backend is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapProvider {
    /// Keyless OSM-based services (OSRM routing, Nominatim geocoding).
    #[default]
    Free,
    /// Key-gated Google services (Routes, Places).
    Google,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub map_provider: MapProvider,
    #[serde(default)]
    pub google_api_key: String,
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// Settings that are not persisted anywhere.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
            path: None,
        }
    }

    /// Loads settings from the given file, falling back to defaults when
    /// the file is missing or unreadable (matching a fresh install).
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "invalid settings file, using defaults");
                Settings::default()
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Settings::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read settings, using defaults");
                Settings::default()
            }
        };
        Self {
            settings: Mutex::new(settings),
            path: Some(path),
        }
    }

    pub fn current(&self) -> Settings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switches the active provider. A real change invalidates every
    /// fetched route in the trip.
    pub fn set_map_provider(&self, provider: MapProvider, trip: &TripStore) {
        let changed = {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            if settings.map_provider == provider {
                false
            } else {
                settings.map_provider = provider;
                true
            }
        };
        if changed {
            self.persist();
            trip.invalidate_all_routes();
        }
    }

    /// Updates the Google API key. Routes are invalidated only when the
    /// Google provider is active, since only then did the old key produce
    /// the stored geometry.
    pub fn set_google_api_key(&self, key: impl Into<String>, trip: &TripStore) {
        let key = key.into();
        let (changed, google_active) = {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            if settings.google_api_key == key {
                (false, false)
            } else {
                settings.google_api_key = key;
                (true, settings.map_provider == MapProvider::Google)
            }
        };
        if changed {
            self.persist();
            if google_active {
                trip.invalidate_all_routes();
            }
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let settings = self.current();
        let json = match serde_json::to_string_pretty(&settings) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to serialize settings");
                return;
            }
        };
        if let Err(err) = write_atomic(path, &json) {
            warn!(path = %path.display(), error = %err, "failed to persist settings");
        }
    }
}
