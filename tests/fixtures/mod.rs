//! Shared test fixtures: in-memory trip stores, scripted route providers,
//! and task spawners with controllable scheduling.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};

use trip_planner::geometry::LineString;
use trip_planner::model::{LatLng, TransportMode};
use trip_planner::reconcile::TaskSpawner;
use trip_planner::routing::{RouteProvider, RouteResult, RoutingError};
use trip_planner::storage::MemoryStorage;
use trip_planner::store::{NewSpot, TripStore};

/// One recorded provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub from: LatLng,
    pub to: LatLng,
    pub mode: TransportMode,
}

/// Route provider that records every invocation and answers from a fixed
/// script: a synthetic straight-line route, or a failure.
pub struct RecordingRouter {
    calls: Mutex<Vec<RecordedCall>>,
    fail: bool,
}

impl RecordingRouter {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RouteProvider for RecordingRouter {
    fn compute_route(
        &self,
        from: LatLng,
        to: LatLng,
        mode: TransportMode,
    ) -> Result<RouteResult, RoutingError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall { from, to, mode });
        if self.fail {
            return Err(RoutingError::NoRoute);
        }
        Ok(RouteResult {
            geometry: LineString::from_latlng_points(vec![
                (from.lat(), from.lng()),
                (to.lat(), to.lng()),
            ]),
            duration_secs: 600,
            distance_meters: 1000.0,
        })
    }
}

/// Spawner that queues tasks until the test runs them explicitly, so the
/// window between dispatch and completion can be exercised.
#[derive(Default)]
pub struct DeferredSpawner {
    tasks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl DeferredSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs every queued task in dispatch order.
    pub fn run_all(&self) {
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task();
        }
    }
}

impl TaskSpawner for DeferredSpawner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

/// A trip store over in-memory storage, with the storage handle kept for
/// persistence assertions.
pub fn memory_store_with_storage() -> (Arc<TripStore>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let store = Arc::new(TripStore::open(storage.clone()));
    (store, storage)
}

pub fn memory_store() -> Arc<TripStore> {
    memory_store_with_storage().0
}

/// Adds a spot and returns its id.
pub fn add_spot(store: &TripStore, name: &str, lat: f64, lng: f64) -> String {
    store.add_spot(NewSpot::new(name, LatLng::new(lat, lng))).id
}
