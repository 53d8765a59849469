//! Seams to the systems the engine drives but does not own
//!
//! Navigation, doors, booking signals, cell assignment, on-screen messages and
//! the search procedure all live outside the engine. Each is consumed through a
//! trait here and handed to the simulation once per tick in a [`Services`]
//! bundle. The crate ships reference backends for every trait
//! ([`crate::nav`], [`crate::doors`], [`crate::intake`]).

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use warden_core::{AgentId, DoorId, DoorOpId, SubjectId};

/// Path-following backend for officer agents
pub trait NavigationService {
    /// Register an agent at a position with a movement speed
    fn add_agent(&mut self, agent: AgentId, position: Vec3, speed: f32);
    fn remove_agent(&mut self, agent: AgentId);
    /// Whether the agent has a navigation component
    fn has_agent(&self, agent: AgentId) -> bool;
    fn position(&self, agent: AgentId) -> Option<Vec3>;
    /// Start pathing toward `destination`. Returns `false` if refused.
    fn set_destination(&mut self, agent: AgentId, destination: Vec3) -> bool;
    /// Drop the current path and stop in place
    fn reset_path(&mut self, agent: AgentId);
    fn remaining_distance(&self, agent: AgentId) -> f32;
    /// Whether a path is still being computed
    fn path_pending(&self, agent: AgentId) -> bool;
    fn velocity(&self, agent: AgentId) -> Vec3;
    /// Teleport the agent. Returns `false` if the position is unreachable.
    fn warp(&mut self, agent: AgentId, position: Vec3) -> bool;
    fn set_speed(&mut self, agent: AgentId, speed: f32);
    fn stopping_distance(&self, agent: AgentId) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DoorCommand {
    Open,
    Close,
}

impl fmt::Display for DoorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoorCommand::Open => write!(f, "open"),
            DoorCommand::Close => write!(f, "close"),
        }
    }
}

/// Asynchronous outcome of a door request
#[derive(Debug, Clone, PartialEq)]
pub enum DoorEvent {
    Completed {
        op: DoorOpId,
        door: DoorId,
        command: DoorCommand,
    },
    Failed {
        op: DoorOpId,
        door: DoorId,
        command: DoorCommand,
        reason: String,
    },
}

impl DoorEvent {
    /// Correlation id of the request that produced this event
    pub fn op(&self) -> DoorOpId {
        match self {
            DoorEvent::Completed { op, .. } | DoorEvent::Failed { op, .. } => *op,
        }
    }

    pub fn door(&self) -> DoorId {
        match self {
            DoorEvent::Completed { door, .. } | DoorEvent::Failed { door, .. } => *door,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DoorError {
    #[error("unknown door {0}")]
    UnknownDoor(DoorId),

    #[error("no door is bound to trigger '{0}'")]
    UnknownTrigger(String),

    #[error("{0} already has an operation in flight")]
    Busy(DoorId),

    #[error("{0} is locked")]
    Locked(DoorId),

    #[error("{0} is jammed")]
    Jammed(DoorId),
}

/// Door control backend
pub trait DoorSubsystem {
    fn door_position(&self, door: DoorId) -> Option<Vec3>;
    /// Every door whose position lies within `radius` of `center`
    fn doors_within(&self, center: Vec3, radius: f32) -> Vec<DoorId>;
    fn is_closed(&self, door: DoorId) -> bool;
    fn is_locked(&self, door: DoorId) -> bool;
    /// Name bound to the door in the escort trigger API, if any
    fn trigger_name(&self, door: DoorId) -> Option<String>;
    /// Start an asynchronous open/close by door id
    fn request(&mut self, door: DoorId, command: DoorCommand) -> Result<DoorOpId, DoorError>;
    /// Start an asynchronous open/close through the escort trigger API.
    /// Trigger-operated doors are unlocked on open.
    fn trigger(&mut self, name: &str, command: DoorCommand) -> Result<DoorOpId, DoorError>;
    /// Direct low-level command, applied immediately
    fn force(&mut self, door: DoorId, command: DoorCommand) -> Result<(), DoorError>;
    fn set_locked(&mut self, door: DoorId, locked: bool) -> Result<(), DoorError>;
    /// Take every completion/failure event produced since the last drain
    fn drain_events(&mut self) -> Vec<DoorEvent>;
}

/// Booking step whose completion is signalled by the intake subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntakeStep {
    Mugshot,
    Fingerprint,
    GearPickup,
}

pub trait IntakeSignals {
    fn is_complete(&self, subject: SubjectId, step: IntakeStep) -> bool;
}

pub trait CellAssignment {
    /// Assign the subject to a housing cell, returning its index
    fn assign(&mut self, subject: SubjectId) -> Option<u32>;
}

pub trait MessageSink {
    /// Show transient text near an agent for `duration` seconds
    fn show(&mut self, agent: AgentId, text: &str, duration: f32);
}

/// External contraband search procedure run by patrol officers
pub trait SearchProcedure {
    fn is_eligible(&self, officer: AgentId, subject: SubjectId) -> bool;
    /// Hand control to the procedure. Returns `false` if it refused to start.
    fn begin(&mut self, officer: AgentId, subject: SubjectId) -> bool;
    fn is_finished(&self, officer: AgentId, subject: SubjectId) -> bool;
}

/// Every external collaborator, borrowed for one tick
pub struct Services<'a> {
    pub nav: &'a mut dyn NavigationService,
    pub doors: &'a mut dyn DoorSubsystem,
    pub intake: &'a dyn IntakeSignals,
    pub cells: &'a mut dyn CellAssignment,
    pub messages: &'a mut dyn MessageSink,
    pub search: &'a mut dyn SearchProcedure,
}
