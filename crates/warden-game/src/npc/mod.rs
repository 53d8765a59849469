//! Officer NPCs: agent core, door negotiation, intake escort, activities,
//! roster and population control

pub mod activity;
pub mod agent;
pub mod door_nav;
pub mod escort;
pub mod population;
pub mod roster;

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use warden_core::{AgentId, AssignmentId, SessionId, SubjectId};
use warden_world::{FacilityLayout, PatrolRoute};

use self::activity::{Activity, ActivityLayer};
use self::agent::{Agent, AgentEvent, AgentState};
use self::door_nav::{DoorNavEvent, DoorNavigator};
use self::escort::{EscortError, IntakeEscort};
use crate::config::EngineConfig;
use crate::event::EngineEvent;
use crate::services::{DoorEvent, NavigationService, Services};

/// Everything an officer needs from the outside world for one tick
pub struct TickContext<'a, 'b> {
    pub now: f64,
    pub delta: f32,
    pub layout: &'a FacilityLayout,
    /// Last known position of every subject
    pub subjects: &'a BTreeMap<SubjectId, Vec3>,
    pub services: &'a mut Services<'b>,
}

/// What the officer is on duty for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfficerRole {
    Intake,
    Patrol,
    Supervisor,
}

impl OfficerRole {
    pub fn name(&self) -> &'static str {
        match self {
            OfficerRole::Intake => "Intake",
            OfficerRole::Patrol => "Patrol",
            OfficerRole::Supervisor => "Supervisor",
        }
    }
}

/// Coarse movement state alongside the activity above it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeState {
    pub coarse: AgentState,
    pub activity: Activity,
}

/// A live officer: the agent plus the layers stacked on it
pub struct Officer {
    agent: Agent,
    role: OfficerRole,
    door_nav: DoorNavigator,
    escort: Option<IntakeEscort>,
    activity: ActivityLayer,
    assignment: Option<AssignmentId>,
}

impl Officer {
    pub fn new(agent: Agent, role: OfficerRole, config: &EngineConfig) -> Self {
        let id = agent.id();
        let escort = match role {
            OfficerRole::Intake => Some(IntakeEscort::new(id, config.escort.clone())),
            OfficerRole::Patrol | OfficerRole::Supervisor => None,
        };
        Self {
            agent,
            role,
            door_nav: DoorNavigator::new(config.door_nav.clone()),
            escort,
            activity: ActivityLayer::new(id, config.activity.clone()),
            assignment: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.agent.id()
    }

    pub fn role(&self) -> OfficerRole {
        self.role
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    pub fn escort(&self) -> Option<&IntakeEscort> {
        self.escort.as_ref()
    }

    pub fn escort_mut(&mut self) -> Option<&mut IntakeEscort> {
        self.escort.as_mut()
    }

    pub fn activity(&self) -> &ActivityLayer {
        &self.activity
    }

    pub fn door_nav(&self) -> &DoorNavigator {
        &self.door_nav
    }

    pub fn assignment(&self) -> Option<AssignmentId> {
        self.assignment
    }

    pub fn composite_state(&self) -> CompositeState {
        CompositeState {
            coarse: self.agent.state(),
            activity: self.activity.activity(),
        }
    }

    /// Whether the officer is free to take an intake or an incident
    pub fn is_available(&self) -> bool {
        let escorting = self.escort.as_ref().is_some_and(|e| e.is_active());
        !escorting
            && self.agent.is_enabled()
            && !matches!(
                self.activity.activity(),
                Activity::RespondingToIncident | Activity::Searching
            )
    }

    pub fn assign_patrol(
        &mut self,
        assignment: AssignmentId,
        route: PatrolRoute,
        nav: &mut dyn NavigationService,
    ) -> bool {
        self.assignment = Some(assignment);
        self.activity.assign_patrol(route, &self.agent, nav)
    }

    pub fn assign_post(&mut self, post: Vec3) {
        self.activity.assign_post(post);
    }

    /// Begin escorting a booked subject. Only intake officers can.
    pub fn start_intake(
        &mut self,
        subject: SubjectId,
        holding_cell: u32,
        now: f64,
    ) -> Result<SessionId, EscortError> {
        match self.escort.as_mut() {
            Some(escort) => escort.start(subject, holding_cell, &self.agent, now),
            None => Err(EscortError::OfficerBusy(self.agent.id())),
        }
    }

    /// Send the officer to an incident unless it is busy with an intake
    pub fn dispatch(&mut self, location: Vec3, now: f64, nav: &mut dyn NavigationService) -> bool {
        if self.escort.as_ref().is_some_and(|e| e.is_active()) {
            return false;
        }
        self.activity.dispatch(location, &mut self.agent, now, nav)
    }

    pub fn despawn(self, nav: &mut dyn NavigationService) {
        self.agent.despawn(nav);
    }

    /// Run one tick: coarse state, then activity, then door negotiation with
    /// arrival and door events routed into the escort.
    pub fn tick(
        &mut self,
        door_events: &[DoorEvent],
        ctx: &mut TickContext<'_, '_>,
        out: &mut Vec<EngineEvent>,
    ) {
        let now = ctx.now;
        self.agent.tick(now, ctx.delta, ctx.services.nav);
        self.activity.tick(&mut self.agent, self.escort.as_ref(), ctx);

        if let Some(escort) = &self.escort {
            self.door_nav.set_excluded(escort.owned_doors(ctx.layout));
        }
        for event in door_events {
            self.door_nav.handle_door_event(event);
            if let Some(escort) = self.escort.as_mut() {
                escort.handle_door_event(event, now, ctx.services.doors);
            }
        }

        self.door_nav
            .update(&mut self.agent, now, ctx.services.nav, ctx.services.doors);
        let nav_events = self.door_nav.drain_events();
        if let Some(escort) = self.escort.as_mut() {
            for event in &nav_events {
                match event {
                    DoorNavEvent::DoorRequested {
                        door, was_locked, ..
                    }
                    | DoorNavEvent::DoorPassed {
                        door, was_locked, ..
                    } => escort.note_door_passed(*door, *was_locked),
                    _ => {}
                }
            }
        }

        let agent_events = self.agent.drain_events();
        if let Some(escort) = self.escort.as_mut() {
            for event in &agent_events {
                if let AgentEvent::DestinationReached {
                    request,
                    destination,
                    ..
                } = event
                {
                    escort.handle_arrival(*request, *destination, false, &self.agent, now, ctx.services);
                }
            }
            escort.tick(&mut self.agent, ctx);
        }

        out.extend(agent_events.into_iter().map(EngineEvent::from));
        out.extend(nav_events.into_iter().map(EngineEvent::from));
        out.extend(self.activity.drain_events().into_iter().map(EngineEvent::from));
        if let Some(escort) = self.escort.as_mut() {
            out.extend(escort.drain_events().into_iter().map(EngineEvent::from));
        }
        // State changes caused by the escort's own move requests
        out.extend(self.agent.drain_events().into_iter().map(EngineEvent::from));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::doors::DoorSystem;
    use crate::intake::{CellRegistry, IntakeDesk, MessageLog, SearchDesk};
    use crate::nav::StraightLineNav;
    use crate::npc::agent::AgentConfig;
    use crate::services::DoorSubsystem;
    use warden_core::DoorId;

    #[test]
    fn test_composite_state_and_availability() {
        let config = EngineConfig::default();
        let mut nav = StraightLineNav::new();
        let agent = Agent::spawn(AgentId(1), Vec3::ZERO, 2.0, AgentConfig::default(), &mut nav);
        let mut officer = Officer::new(agent, OfficerRole::Supervisor, &config);
        officer.assign_post(Vec3::ZERO);
        assert_eq!(
            officer.composite_state(),
            CompositeState {
                coarse: AgentState::Idle,
                activity: Activity::Monitoring,
            }
        );
        assert!(officer.escort().is_none());
        assert!(officer.is_available());

        assert!(officer.dispatch(Vec3::new(5.0, 0.0, 0.0), 0.0, &mut nav));
        assert!(!officer.is_available());
    }

    #[test]
    fn test_officer_negotiates_corridor_door() {
        let config = EngineConfig::default();
        let layout = FacilityLayout::demo();
        let mut nav = StraightLineNav::new();
        let mut doors = DoorSystem::from_layout(&layout, 0.5);
        let (desk, mut cells) = (IntakeDesk::new(), CellRegistry::new(Vec::new()));
        let (mut messages, mut search) = (MessageLog::new(), SearchDesk::new());
        let subjects = BTreeMap::new();

        let start = Vec3::new(10.0, 0.0, 6.0);
        let agent = Agent::spawn(AgentId(1), start, 4.0, AgentConfig::default(), &mut nav);
        let mut officer = Officer::new(agent, OfficerRole::Patrol, &config);
        officer
            .agent_mut()
            .move_to(Vec3::new(20.0, 0.0, 0.0), 0.5, 0.0, &mut nav);

        let mut events = Vec::new();
        let mut now = 0.0;
        for _ in 0..100 {
            nav.update(0.1);
            doors.update(0.1);
            now += 0.1;
            let door_events = doors.drain_events();
            let mut services = Services {
                nav: &mut nav,
                doors: &mut doors,
                intake: &desk,
                cells: &mut cells,
                messages: &mut messages,
                search: &mut search,
            };
            let mut ctx = TickContext {
                now,
                delta: 0.1,
                layout: &layout,
                subjects: &subjects,
                services: &mut services,
            };
            officer.tick(&door_events, &mut ctx, &mut events);
        }

        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::DoorNav(DoorNavEvent::DoorPassed { door, .. }) if *door == DoorId(30)
        )));
        assert!(!doors.is_closed(DoorId(30)));
        assert!(officer.agent().position().distance(Vec3::new(20.0, 0.0, 0.0)) < 0.6);
    }
}
