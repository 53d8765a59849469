//! Events exposed by the engine

use warden_world::RegionEvent;

use crate::npc::activity::ActivityEvent;
use crate::npc::agent::AgentEvent;
use crate::npc::door_nav::DoorNavEvent;
use crate::npc::escort::IntakeEvent;
use crate::npc::population::PopulationEvent;

/// Every event the simulation publishes on its bus, in tick order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Agent(AgentEvent),
    DoorNav(DoorNavEvent),
    Activity(ActivityEvent),
    Intake(IntakeEvent),
    Population(PopulationEvent),
    Region(RegionEvent),
}

impl From<AgentEvent> for EngineEvent {
    fn from(event: AgentEvent) -> Self {
        EngineEvent::Agent(event)
    }
}

impl From<DoorNavEvent> for EngineEvent {
    fn from(event: DoorNavEvent) -> Self {
        EngineEvent::DoorNav(event)
    }
}

impl From<ActivityEvent> for EngineEvent {
    fn from(event: ActivityEvent) -> Self {
        EngineEvent::Activity(event)
    }
}

impl From<IntakeEvent> for EngineEvent {
    fn from(event: IntakeEvent) -> Self {
        EngineEvent::Intake(event)
    }
}

impl From<PopulationEvent> for EngineEvent {
    fn from(event: PopulationEvent) -> Self {
        EngineEvent::Population(event)
    }
}

impl From<RegionEvent> for EngineEvent {
    fn from(event: RegionEvent) -> Self {
        EngineEvent::Region(event)
    }
}
