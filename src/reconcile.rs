//! The itinerary reconciler.
//!
//! Keeps each day's segment list consistent with its spot order and keeps
//! segments' route data populated, asynchronously, exactly once per
//! distinct unresolved `(day, from, to, mode)` combination.
//!
//! A structural fingerprint guards against redundant recomputation: when
//! the day structure is unchanged since the previous pass, the pass does
//! nothing. Route fetches run on worker tasks; results are applied by
//! re-looking up the current segment by endpoint identity, so a result
//! that arrives after further edits is discarded rather than applied to a
//! stale or deleted segment. There is no other cancellation: the only
//! real abort is the provider's request timeout.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{LatLng, Segment, TransportMode, Trip};
use crate::routing::{RouteProvider, RoutingError};
use crate::store::TripStore;

/// Key identifying one outstanding route fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    day_id: String,
    from_spot_id: String,
    to_spot_id: String,
    mode: TransportMode,
}

/// Dispatches route-fetch tasks to workers.
///
/// No completion ordering is assumed across keys; within one key the
/// in-flight registry guarantees at most one outstanding fetch.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs tasks on the rayon pool.
#[derive(Debug, Default)]
pub struct RayonSpawner;

impl TaskSpawner for RayonSpawner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
        rayon::spawn(task);
    }
}

/// Runs tasks immediately on the calling thread. Makes reconciliation
/// fully synchronous, which tests rely on.
#[derive(Debug, Default)]
pub struct InlineSpawner;

impl TaskSpawner for InlineSpawner {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// Failure of the user-initiated, synchronous segment creation flow.
///
/// Unlike background reconciliation fetches, these are surfaced to the
/// caller so the interaction can report the failure and roll back; the
/// segment is not created at all.
#[derive(Debug, Error)]
pub enum CreateSegmentError {
    #[error("unknown day: {0}")]
    UnknownDay(String),
    #[error("unknown spot: {0}")]
    UnknownSpot(String),
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

pub struct Reconciler {
    store: Arc<TripStore>,
    router: Arc<dyn RouteProvider>,
    spawner: Arc<dyn TaskSpawner>,
    in_flight: Arc<Mutex<HashSet<FetchKey>>>,
    last_fingerprint: Mutex<String>,
}

impl Reconciler {
    pub fn new(
        store: Arc<TripStore>,
        router: Arc<dyn RouteProvider>,
        spawner: Arc<dyn TaskSpawner>,
    ) -> Self {
        Self {
            store,
            router,
            spawner,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            last_fingerprint: Mutex::new(String::new()),
        }
    }

    /// Reconciler dispatching fetches to the rayon pool.
    pub fn with_rayon(store: Arc<TripStore>, router: Arc<dyn RouteProvider>) -> Self {
        Self::new(store, router, Arc::new(RayonSpawner))
    }

    /// Runs one reconciliation pass. Call after every store revision
    /// change; the fingerprint guard makes redundant calls free.
    pub fn reconcile(&self) {
        let trip = self.store.snapshot();
        let fingerprint = trip_fingerprint(&trip);
        {
            let mut last = self
                .last_fingerprint
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *last == fingerprint {
                return;
            }
            *last = fingerprint;
        }

        let spots: HashMap<&str, LatLng> = trip
            .spots
            .iter()
            .map(|s| (s.id.as_str(), s.coordinates))
            .collect();

        for day in &trip.days {
            let segments = derive_day_segments(&day.spot_ids, &day.segments);

            let old_ids: Vec<&str> = day.segments.iter().map(|s| s.id.as_str()).collect();
            let new_ids: Vec<&str> = segments.iter().map(|s| s.id.as_str()).collect();
            if old_ids != new_ids {
                debug!(day = %day.id, segments = segments.len(), "rewriting day segments");
                self.store.set_day_segments(&day.id, segments.clone());
            }

            for segment in &segments {
                if segment.is_resolved() {
                    continue;
                }
                let key = FetchKey {
                    day_id: day.id.clone(),
                    from_spot_id: segment.from_spot_id.clone(),
                    to_spot_id: segment.to_spot_id.clone(),
                    mode: segment.mode,
                };
                // Atomic check-and-mark: a second pass while this key is
                // outstanding must not issue a duplicate fetch.
                if !self.mark_in_flight(key.clone()) {
                    continue;
                }
                let (Some(&from), Some(&to)) = (
                    spots.get(segment.from_spot_id.as_str()),
                    spots.get(segment.to_spot_id.as_str()),
                ) else {
                    self.release_in_flight(&key);
                    continue;
                };
                self.dispatch_fetch(key, from, to);
            }
        }
    }

    /// User-initiated creation by direct map interaction: the route is
    /// fetched first and the trip is only mutated on success.
    pub fn create_segment_via_route(
        &self,
        day_id: &str,
        from_spot_id: &str,
        to_spot_id: &str,
        mode: TransportMode,
    ) -> Result<Segment, CreateSegmentError> {
        let trip = self.store.snapshot();
        if trip.day(day_id).is_none() {
            return Err(CreateSegmentError::UnknownDay(day_id.to_string()));
        }
        let from = trip
            .spot(from_spot_id)
            .ok_or_else(|| CreateSegmentError::UnknownSpot(from_spot_id.to_string()))?;
        let to = trip
            .spot(to_spot_id)
            .ok_or_else(|| CreateSegmentError::UnknownSpot(to_spot_id.to_string()))?;

        let result = self
            .router
            .compute_route(from.coordinates, to.coordinates, mode)?;

        let mut segment = Segment::placeholder(from_spot_id, to_spot_id);
        segment.mode = mode;
        segment.route_geometry = Some(result.geometry);
        segment.duration = Some(result.duration_secs);
        segment.distance = Some(result.distance_meters);

        if !self.store.attach_segment(day_id, segment.clone()) {
            // Day or a spot disappeared between snapshot and write.
            return Err(CreateSegmentError::UnknownDay(day_id.to_string()));
        }
        Ok(segment)
    }

    fn mark_in_flight(&self, key: FetchKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    fn release_in_flight(&self, key: &FetchKey) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn dispatch_fetch(&self, key: FetchKey, from: LatLng, to: LatLng) {
        let store = Arc::clone(&self.store);
        let router = Arc::clone(&self.router);
        let in_flight = Arc::clone(&self.in_flight);
        self.spawner.spawn(Box::new(move || {
            match router.compute_route(from, to, key.mode) {
                Ok(result) => {
                    let applied = store.apply_route_enrichment(
                        &key.day_id,
                        &key.from_spot_id,
                        &key.to_spot_id,
                        key.mode,
                        &result,
                    );
                    if !applied {
                        debug!(
                            day = %key.day_id,
                            from = %key.from_spot_id,
                            to = %key.to_spot_id,
                            "route result no longer applies, discarding"
                        );
                    }
                }
                // Background failures are swallowed: the segment stays
                // unresolved and the next structural change retries it.
                Err(err) => warn!(
                    day = %key.day_id,
                    from = %key.from_spot_id,
                    to = %key.to_spot_id,
                    mode = key.mode.as_str(),
                    error = %err,
                    "route fetch failed"
                ),
            }
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }));
    }
}

/// Builds the segment list a day must have: one segment per consecutive
/// spot pair, reusing an existing segment verbatim when its pair is still
/// adjacent and synthesizing a fresh placeholder otherwise. Segments for
/// pairs that are no longer adjacent simply do not appear in the result.
fn derive_day_segments(spot_ids: &[String], existing: &[Segment]) -> Vec<Segment> {
    let by_pair: HashMap<(&str, &str), &Segment> = existing
        .iter()
        .map(|s| ((s.from_spot_id.as_str(), s.to_spot_id.as_str()), s))
        .collect();

    spot_ids
        .windows(2)
        .map(|pair| {
            let (from, to) = (pair[0].as_str(), pair[1].as_str());
            match by_pair.get(&(from, to)) {
                Some(segment) => (*segment).clone(),
                None => Segment::placeholder(from, to),
            }
        })
        .collect()
}

/// Structural fingerprint of the whole trip's day structure: day ids,
/// spot order, and each segment's endpoints, mode, and resolved state.
fn trip_fingerprint(trip: &Trip) -> String {
    trip.days
        .iter()
        .map(|day| {
            let segments = day
                .segments
                .iter()
                .map(|s| {
                    format!(
                        "{}:{}:{}:{}",
                        s.from_spot_id,
                        s.to_spot_id,
                        s.mode.as_str(),
                        if s.is_resolved() { "ok" } else { "null" }
                    )
                })
                .collect::<Vec<_>>()
                .join(";");
            format!("{}|{}|{}", day.id, day.spot_ids.join(","), segments)
        })
        .collect::<Vec<_>>()
        .join("||")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_reuses_existing_pairs() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let existing = vec![Segment::placeholder("a", "b")];
        let derived = derive_day_segments(&ids, &existing);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived[0].id, existing[0].id);
        assert_ne!(derived[1].id, existing[0].id);
        assert_eq!(derived[1].from_spot_id, "b");
        assert_eq!(derived[1].to_spot_id, "c");
    }

    #[test]
    fn test_derive_drops_non_adjacent_pairs() {
        let existing = vec![Segment::placeholder("a", "b"), Segment::placeholder("b", "c")];
        let ids = vec!["a".to_string(), "c".to_string(), "b".to_string()];
        let derived = derive_day_segments(&ids, &existing);
        let pairs: Vec<(&str, &str)> = derived
            .iter()
            .map(|s| (s.from_spot_id.as_str(), s.to_spot_id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("a", "c"), ("c", "b")]);
    }

    #[test]
    fn test_derive_single_spot_has_no_segments() {
        let ids = vec!["a".to_string()];
        assert!(derive_day_segments(&ids, &[]).is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_resolved_state() {
        let mut trip = Trip::new("t");
        trip.days.push(crate::model::Day {
            id: "d1".into(),
            label: "Day 1".into(),
            color: "#4285F4".into(),
            spot_ids: vec!["a".into(), "b".into()],
            segments: vec![Segment::placeholder("a", "b")],
            stay_spot_id: None,
        });
        let before = trip_fingerprint(&trip);
        trip.days[0].segments[0].route_geometry =
            Some(crate::geometry::LineString::new(vec![[0.0, 0.0]]));
        let after = trip_fingerprint(&trip);
        assert_ne!(before, after);
    }
}
