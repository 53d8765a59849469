//! Warden World - Facility data for the Warden NPC engine
//!
//! Provides the facility layout (posts, cells, stations, doors), patrol routes
//! and their assignments, and region/movement tracking for the tracked subject.

pub mod error;
pub mod facility;
pub mod regions;
pub mod routes;

pub use error::WorldError;
pub use facility::{CellSpec, DoorSpec, FacilityLayout, StationKind, StationSpec};
pub use regions::{Region, RegionEvent, RegionTracker};
pub use routes::{PatrolAssignment, PatrolRoute, RouteRegistry};
