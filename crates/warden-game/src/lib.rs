//! Warden Game - Officer behavior for the Warden NPC engine
//!
//! This crate drives prison officer NPCs on top of a host game world:
//! - Agent core with a coarse state machine, stuck detection and an action queue
//! - Door negotiation around closed doors on an agent's path
//! - The intake escort pipeline from holding cell to housing cell
//! - Activities (patrol, escort, monitor, search, incident response) with a
//!   compliance/patience model
//! - Hysteresis-based population control for patrol officers
//!
//! The host world is reached only through the traits in [`services`].
//! Reference backends for all of them are included so the engine runs headless.

pub mod config;
pub mod doors;
pub mod drill;
pub mod event;
pub mod intake;
pub mod nav;
pub mod npc;
pub mod services;
pub mod sim;

pub use config::{ConfigError, EngineConfig, OfficerConfig, RegionConfig};
pub use doors::{DoorFault, DoorSystem};
pub use drill::{DrillConfig, DrillReport};
pub use event::EngineEvent;
pub use intake::{CellRegistry, IntakeDesk, MessageLog, SearchDesk};
pub use nav::StraightLineNav;
pub use npc::{CompositeState, Officer, OfficerRole};
pub use services::{
    CellAssignment, DoorCommand, DoorError, DoorEvent, DoorSubsystem, IntakeSignals, IntakeStep,
    MessageSink, NavigationService, SearchProcedure, Services,
};
pub use sim::{EngineError, Simulation};
