//! Trip persistence: JSON documents on disk, export and import.
//!
//! The store persists the whole trip on every mutation; the file backend
//! coalesces rapid writes into one debounced flush. Import wholesale-
//! replaces the current trip (no merge) and leaves it untouched on parse
//! failure.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::model::{Trip, migrate_trip};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access trip document: {0}")]
    Io(#[from] io::Error),
    #[error("invalid trip document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Durable storage for the trip document.
///
/// `save` must never block the mutation that triggered it for long;
/// implementations may coalesce rapid calls. Failures reported after the
/// fact are logged, never surfaced to the mutating caller.
pub trait TripStorage: Send + Sync {
    fn save(&self, trip: &Trip) -> Result<(), StorageError>;
    fn load(&self) -> Result<Option<Trip>, StorageError>;
}

/// In-memory storage for tests and transient sessions.
#[derive(Default)]
pub struct MemoryStorage {
    last: Mutex<Option<Trip>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently saved trip, if any.
    pub fn last_saved(&self) -> Option<Trip> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TripStorage for MemoryStorage {
    fn save(&self, trip: &Trip) -> Result<(), StorageError> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(trip.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<Trip>, StorageError> {
        Ok(self.last_saved())
    }
}

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Default)]
struct FlushState {
    pending: Option<Trip>,
    flush_scheduled: bool,
}

/// JSON file storage with debounced, atomic writes.
pub struct JsonFileStorage {
    path: PathBuf,
    debounce: Duration,
    state: Arc<Mutex<FlushState>>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_debounce(path, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            path: path.into(),
            debounce,
            state: Arc::new(Mutex::new(FlushState::default())),
        }
    }

    /// Writes any pending snapshot immediately. Intended for shutdown.
    pub fn flush(&self) -> Result<(), StorageError> {
        let pending = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .take();
        match pending {
            Some(trip) => write_trip(&self.path, &trip),
            None => Ok(()),
        }
    }
}

impl TripStorage for JsonFileStorage {
    fn save(&self, trip: &Trip) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = Some(trip.clone());
        if !state.flush_scheduled {
            state.flush_scheduled = true;
            let path = self.path.clone();
            let debounce = self.debounce;
            let shared = Arc::clone(&self.state);
            thread::spawn(move || {
                thread::sleep(debounce);
                let pending = {
                    let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    state.flush_scheduled = false;
                    state.pending.take()
                };
                if let Some(trip) = pending {
                    if let Err(err) = write_trip(&path, &trip) {
                        warn!(path = %path.display(), error = %err, "failed to persist trip");
                    }
                }
            });
        }
        Ok(())
    }

    fn load(&self) -> Result<Option<Trip>, StorageError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut trip: Trip = serde_json::from_str(&data)?;
        migrate_trip(&mut trip);
        Ok(Some(trip))
    }
}

fn write_trip(path: &Path, trip: &Trip) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(trip)?;
    write_atomic(path, &json)?;
    Ok(())
}

/// Writes via a temp file and rename so readers never see a torn document.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Serializes the trip as a downloadable document.
pub fn export_trip(trip: &Trip) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(trip)?)
}

/// Writes the export document to a file.
pub fn export_trip_to(path: &Path, trip: &Trip) -> Result<(), StorageError> {
    write_trip(path, trip)
}

/// Parses and migrates an uploaded document.
///
/// On success the caller replaces the current trip wholesale; on failure
/// the current trip must be left untouched.
pub fn import_trip(json: &str) -> Result<Trip, StorageError> {
    let mut trip: Trip = serde_json::from_str(json)?;
    migrate_trip(&mut trip);
    Ok(trip)
}
