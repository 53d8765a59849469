//! Warden Core - Core types and utilities for the Warden NPC engine
//!
//! This crate provides the foundational types used throughout the engine:
//! - Mathematical primitives (re-exported from glam)
//! - Typed identifiers for agents, subjects, doors, and sessions
//! - Simulation clock driving every cooperative delay
//! - Point/segment geometry and axis-aligned bounds
//! - An ordered, synchronous event bus
//! - Bounded startup retry for dependencies that come up late

pub mod events;
pub mod geometry;
pub mod ids;
pub mod retry;
pub mod time;

pub use events::{EventBus, SubscriptionId};
pub use geometry::{point_segment_distance, polyline_distance, Aabb};
pub use glam::{Vec2, Vec3};
pub use ids::{AgentId, AssignmentId, DoorId, DoorOpId, MoveRequestId, SessionId, SubjectId};
pub use retry::{RetryStatus, StartupRetry};
pub use time::{SimClock, TimeConfig};
