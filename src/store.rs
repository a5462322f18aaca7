//! The trip store: sole mutation authority over the trip aggregate.
//!
//! Every operation is atomic from the caller's perspective (one lock
//! scope), bumps a monotonic revision counter, and persists the whole trip
//! through the injected storage. Operations referencing missing ids are
//! silent no-ops: stale ids from concurrent UI state are expected and
//! harmless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::colors;
use crate::ident::generate_id;
use crate::model::{Day, LatLng, Segment, Spot, TransportMode, Trip, migrate_trip};
use crate::routing::RouteResult;
use crate::storage::TripStorage;

/// Spot creation data; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewSpot {
    pub name: String,
    pub coordinates: LatLng,
    pub link: Option<String>,
    pub notes: Option<String>,
}

impl NewSpot {
    pub fn new(name: impl Into<String>, coordinates: LatLng) -> Self {
        Self {
            name: name.into(),
            coordinates,
            link: None,
            notes: None,
        }
    }
}

/// Partial spot update; `None` leaves a field unchanged, `Some(None)`
/// clears an optional one.
#[derive(Debug, Clone, Default)]
pub struct SpotPatch {
    pub name: Option<String>,
    pub coordinates: Option<LatLng>,
    pub link: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

/// Partial day update.
#[derive(Debug, Clone, Default)]
pub struct DayPatch {
    pub label: Option<String>,
    pub color: Option<String>,
}

/// Partial segment update for user-editable fields. Mode changes go
/// through [`TripStore::set_segment_mode`] so route data is reset.
#[derive(Debug, Clone, Default)]
pub struct SegmentPatch {
    pub link: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub width: Option<Option<f64>>,
}

pub struct TripStore {
    trip: Mutex<Trip>,
    revision: AtomicU64,
    storage: Arc<dyn TripStorage>,
}

impl TripStore {
    /// Loads the persisted trip, falling back to an empty one, and takes
    /// ownership of future persistence.
    pub fn open(storage: Arc<dyn TripStorage>) -> Self {
        let trip = match storage.load() {
            Ok(Some(mut trip)) => {
                migrate_trip(&mut trip);
                trip
            }
            Ok(None) => Trip::new("My Trip"),
            Err(err) => {
                warn!(error = %err, "failed to load persisted trip, starting empty");
                Trip::new("My Trip")
            }
        };
        Self::with_trip(trip, storage)
    }

    pub fn with_trip(trip: Trip, storage: Arc<dyn TripStorage>) -> Self {
        Self {
            trip: Mutex::new(trip),
            revision: AtomicU64::new(0),
            storage,
        }
    }

    /// Monotonic change counter; observers poll this instead of
    /// subscribing to field-level changes.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// A consistent copy of the current trip.
    pub fn snapshot(&self) -> Trip {
        self.lock_trip().clone()
    }

    fn lock_trip(&self) -> MutexGuard<'_, Trip> {
        self.trip.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a mutation under the lock; when it reports a change, bumps the
    /// revision and persists the new snapshot.
    fn commit(&self, op: impl FnOnce(&mut Trip) -> bool) -> bool {
        let snapshot = {
            let mut trip = self.lock_trip();
            if !op(&mut trip) {
                return false;
            }
            trip.clone()
        };
        self.after_mutation(&snapshot);
        true
    }

    fn after_mutation(&self, snapshot: &Trip) {
        self.revision.fetch_add(1, Ordering::Release);
        if let Err(err) = self.storage.save(snapshot) {
            warn!(error = %err, "failed to persist trip");
        }
    }

    // ------------------------------------------------------------------
    // Trip
    // ------------------------------------------------------------------

    pub fn set_trip_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.commit(|trip| {
            if trip.name == name {
                return false;
            }
            trip.name = name;
            true
        });
    }

    pub fn set_trip_description(&self, description: impl Into<String>) {
        let description = Some(description.into());
        self.commit(|trip| {
            if trip.description == description {
                return false;
            }
            trip.description = description;
            true
        });
    }

    /// Wholesale replacement, used by import. The caller is responsible
    /// for migrating the incoming document.
    pub fn replace_trip(&self, new_trip: Trip) {
        self.commit(|trip| {
            *trip = new_trip;
            true
        });
    }

    // ------------------------------------------------------------------
    // Spots
    // ------------------------------------------------------------------

    pub fn add_spot(&self, new: NewSpot) -> Spot {
        let spot = Spot {
            id: generate_id(),
            name: new.name,
            coordinates: new.coordinates,
            link: new.link,
            notes: new.notes,
        };
        let created = spot.clone();
        self.commit(move |trip| {
            trip.spots.push(spot);
            true
        });
        created
    }

    pub fn update_spot(&self, id: &str, patch: SpotPatch) {
        self.commit(|trip| {
            let Some(spot) = trip.spot_mut(id) else {
                return false;
            };
            if let Some(name) = patch.name {
                spot.name = name;
            }
            if let Some(coordinates) = patch.coordinates {
                spot.coordinates = coordinates;
            }
            if let Some(link) = patch.link {
                spot.link = link;
            }
            if let Some(notes) = patch.notes {
                spot.notes = notes;
            }
            true
        });
    }

    /// Removes a spot and cascades: every day's spot order, every segment
    /// touching it as an endpoint, and any stay-spot designation.
    pub fn remove_spot(&self, id: &str) {
        self.commit(|trip| {
            let before = trip.spots.len();
            trip.spots.retain(|s| s.id != id);
            if trip.spots.len() == before {
                return false;
            }
            for day in &mut trip.days {
                detach_spot_from_day(day, id);
            }
            true
        });
    }

    // ------------------------------------------------------------------
    // Days
    // ------------------------------------------------------------------

    /// Adds a day with the next auto label and palette color. The new day
    /// inherits the previous day's last spot as its first, so consecutive
    /// days form a continuous journey by default.
    pub fn add_day(&self, label: Option<&str>) -> Day {
        let (day, snapshot) = {
            let mut trip = self.lock_trip();
            let inherited = trip.days.last().and_then(|d| d.spot_ids.last().cloned());
            let day = Day {
                id: generate_id(),
                label: label
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Day {}", trip.days.len() + 1)),
                color: colors::day_color(trip.days.len()).to_string(),
                spot_ids: inherited.into_iter().collect(),
                segments: Vec::new(),
                stay_spot_id: None,
            };
            trip.days.push(day.clone());
            (day, trip.clone())
        };
        self.after_mutation(&snapshot);
        day
    }

    pub fn update_day(&self, id: &str, patch: DayPatch) {
        self.commit(|trip| {
            let Some(day) = trip.day_mut(id) else {
                return false;
            };
            if let Some(label) = patch.label {
                day.label = label;
            }
            if let Some(color) = patch.color {
                day.color = color;
            }
            true
        });
    }

    /// Removes a day and renumbers the remaining auto-labeled "Day N"
    /// days by position; custom labels are preserved.
    pub fn remove_day(&self, id: &str) {
        self.commit(|trip| {
            let before = trip.days.len();
            trip.days.retain(|d| d.id != id);
            if trip.days.len() == before {
                return false;
            }
            for (index, day) in trip.days.iter_mut().enumerate() {
                if is_auto_label(&day.label) {
                    day.label = format!("Day {}", index + 1);
                }
            }
            true
        });
    }

    /// Reorders days to the given id sequence; ids not present in the
    /// trip are skipped, days not mentioned are dropped.
    pub fn reorder_days(&self, day_ids: &[String]) {
        self.commit(|trip| {
            let old_ids: Vec<String> = trip.days.iter().map(|d| d.id.clone()).collect();
            let mut by_id: HashMap<String, Day> =
                trip.days.drain(..).map(|d| (d.id.clone(), d)).collect();
            trip.days = day_ids.iter().filter_map(|id| by_id.remove(id)).collect();
            let new_ids: Vec<String> = trip.days.iter().map(|d| d.id.clone()).collect();
            old_ids != new_ids
        });
    }

    /// Designates the overnight base; ignored unless the spot is a member
    /// of the day (clearing is always allowed).
    pub fn set_day_stay_spot(&self, day_id: &str, spot_id: Option<&str>) {
        self.commit(|trip| {
            let Some(day) = trip.day_mut(day_id) else {
                return false;
            };
            if let Some(id) = spot_id {
                if !day.spot_ids.iter().any(|s| s == id) {
                    return false;
                }
            }
            let next = spot_id.map(str::to_string);
            if day.stay_spot_id == next {
                return false;
            }
            day.stay_spot_id = next;
            true
        });
    }

    // ------------------------------------------------------------------
    // Spot membership
    // ------------------------------------------------------------------

    pub fn add_spot_to_day(&self, day_id: &str, spot_id: &str) {
        self.commit(|trip| {
            if trip.spot(spot_id).is_none() {
                return false;
            }
            let Some(day) = trip.day_mut(day_id) else {
                return false;
            };
            if day.spot_ids.iter().any(|s| s == spot_id) {
                return false;
            }
            day.spot_ids.push(spot_id.to_string());
            true
        });
    }

    pub fn remove_spot_from_day(&self, day_id: &str, spot_id: &str) {
        self.commit(|trip| {
            let Some(day) = trip.day_mut(day_id) else {
                return false;
            };
            detach_spot_from_day(day, spot_id)
        });
    }

    /// Reorders a day's itinerary. Ids that are not current members are
    /// dropped and duplicates collapse to the first occurrence, so a stale
    /// drag-and-drop payload cannot corrupt the order.
    pub fn reorder_day_spots(&self, day_id: &str, new_order: &[String]) {
        self.commit(|trip| {
            let Some(day) = trip.day_mut(day_id) else {
                return false;
            };
            let mut reordered = Vec::with_capacity(day.spot_ids.len());
            for id in new_order {
                if day.spot_ids.iter().any(|s| s == id) && !reordered.contains(id) {
                    reordered.push(id.clone());
                }
            }
            // Members missing from the payload keep their relative order
            // at the end.
            for id in &day.spot_ids {
                if !reordered.contains(id) {
                    reordered.push(id.clone());
                }
            }
            if day.spot_ids == reordered {
                return false;
            }
            day.spot_ids = reordered;
            true
        });
    }

    /// Cross-day move used by drag-and-drop. `None` on either side means
    /// the unassigned pool. The insert index is clamped; a spot already in
    /// the target day is not duplicated.
    pub fn move_spot_to_day(
        &self,
        spot_id: &str,
        from_day_id: Option<&str>,
        to_day_id: Option<&str>,
        insert_index: usize,
    ) {
        self.commit(|trip| {
            if trip.spot(spot_id).is_none() {
                return false;
            }
            let mut changed = false;
            if let Some(from_id) = from_day_id {
                if let Some(day) = trip.day_mut(from_id) {
                    changed |= detach_spot_from_day(day, spot_id);
                }
            }
            if let Some(to_id) = to_day_id {
                if let Some(day) = trip.day_mut(to_id) {
                    if !day.spot_ids.iter().any(|s| s == spot_id) {
                        let index = insert_index.min(day.spot_ids.len());
                        day.spot_ids.insert(index, spot_id.to_string());
                        changed = true;
                    }
                }
            }
            changed
        });
    }

    // ------------------------------------------------------------------
    // Segments
    // ------------------------------------------------------------------

    /// Replaces a day's segment list. Intended for the reconciler, which
    /// is the only component that derives segment sets.
    pub fn set_day_segments(&self, day_id: &str, segments: Vec<Segment>) {
        self.commit(|trip| {
            let Some(day) = trip.day_mut(day_id) else {
                return false;
            };
            if day.segments == segments {
                return false;
            }
            day.segments = segments;
            true
        });
    }

    pub fn update_segment(&self, day_id: &str, segment_id: &str, patch: SegmentPatch) {
        self.commit(|trip| {
            let Some(segment) = segment_mut(trip, day_id, segment_id) else {
                return false;
            };
            if let Some(link) = patch.link {
                segment.link = link;
            }
            if let Some(notes) = patch.notes {
                segment.notes = notes;
            }
            if let Some(color) = patch.color {
                segment.color = color;
            }
            if let Some(width) = patch.width {
                segment.width = width;
            }
            true
        });
    }

    /// Changes a segment's transport mode, resetting its route data so the
    /// reconciler re-fetches under the new mode.
    pub fn set_segment_mode(&self, day_id: &str, segment_id: &str, mode: TransportMode) {
        self.commit(|trip| {
            let Some(segment) = segment_mut(trip, day_id, segment_id) else {
                return false;
            };
            if segment.mode == mode {
                return false;
            }
            segment.mode = mode;
            segment.clear_route();
            true
        });
    }

    /// Applies fetched route data to the segment currently matching the
    /// endpoints and mode. Returns `false` when no such segment exists
    /// anymore (it was deleted or the pair is no longer adjacent); the
    /// caller discards the result.
    pub fn apply_route_enrichment(
        &self,
        day_id: &str,
        from_spot_id: &str,
        to_spot_id: &str,
        mode: TransportMode,
        result: &RouteResult,
    ) -> bool {
        self.commit(|trip| {
            let Some(day) = trip.day_mut(day_id) else {
                return false;
            };
            let Some(segment) = day.segments.iter_mut().find(|s| {
                s.from_spot_id == from_spot_id && s.to_spot_id == to_spot_id && s.mode == mode
            }) else {
                return false;
            };
            segment.route_geometry = Some(result.geometry.clone());
            segment.duration = Some(result.duration_secs);
            segment.distance = Some(result.distance_meters);
            true
        })
    }

    /// Appends a segment created by the direct map flow, appending its
    /// endpoints to the day's itinerary when not already present.
    pub fn attach_segment(&self, day_id: &str, segment: Segment) -> bool {
        self.commit(|trip| {
            if trip.spot(&segment.from_spot_id).is_none()
                || trip.spot(&segment.to_spot_id).is_none()
            {
                return false;
            }
            let Some(day) = trip.day_mut(day_id) else {
                return false;
            };
            for id in [&segment.from_spot_id, &segment.to_spot_id] {
                if !day.spot_ids.iter().any(|s| s == id) {
                    day.spot_ids.push(id.clone());
                }
            }
            day.segments.push(segment);
            true
        })
    }

    /// Clears fetched route data on every segment trip-wide. Run when the
    /// routing provider or its credential changes: geometry from different
    /// providers must never be mixed within one trip.
    pub fn invalidate_all_routes(&self) {
        self.commit(|trip| {
            let mut changed = false;
            for day in &mut trip.days {
                for segment in &mut day.segments {
                    if segment.is_resolved()
                        || segment.duration.is_some()
                        || segment.distance.is_some()
                    {
                        segment.clear_route();
                        changed = true;
                    }
                }
            }
            changed
        });
    }
}

fn segment_mut<'a>(trip: &'a mut Trip, day_id: &str, segment_id: &str) -> Option<&'a mut Segment> {
    trip.day_mut(day_id)?
        .segments
        .iter_mut()
        .find(|s| s.id == segment_id)
}

/// Drops a spot from a day's order, every segment touching it, and the
/// stay designation if it pointed at the spot.
fn detach_spot_from_day(day: &mut Day, spot_id: &str) -> bool {
    let mut changed = false;
    let n = day.spot_ids.len();
    day.spot_ids.retain(|s| s != spot_id);
    changed |= day.spot_ids.len() != n;
    let n = day.segments.len();
    day.segments
        .retain(|seg| seg.from_spot_id != spot_id && seg.to_spot_id != spot_id);
    changed |= day.segments.len() != n;
    if day.stay_spot_id.as_deref() == Some(spot_id) {
        day.stay_spot_id = None;
        changed = true;
    }
    changed
}

fn is_auto_label(label: &str) -> bool {
    label
        .strip_prefix("Day ")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}
