//! trip-planner core
//!
//! Itinerary synchronization engine for an interactive trip planner:
//! a trip store over spots, days, and segments; a reconciler that derives
//! transport segments from spot order and enriches them with fetched
//! routes; and interchangeable routing/geocoding provider adapters.

pub mod colors;
pub mod geocoding;
pub mod geometry;
pub mod ident;
pub mod model;
pub mod reconcile;
pub mod routing;
pub mod selection;
pub mod settings;
pub mod storage;
pub mod store;
