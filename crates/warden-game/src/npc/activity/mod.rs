//! Role-specific activity layered over the coarse agent state
//!
//! The coarse [`AgentState`] drives movement mechanics; the [`Activity`]
//! records intent. Patrol officers walk routes and stop for searches, the
//! supervisor holds its post, intake officers mirror their escort pipeline
//! and judge the escorted subject's compliance. Any officer not busy with an
//! intake can be dispatched to an incident.

pub mod compliance;
pub mod patrol;
pub mod search;

pub use compliance::{
    ComplianceConfig, ComplianceResponse, ComplianceTracker, ComplianceUpdate, DistanceBand,
};
pub use patrol::PatrolRunner;
pub use search::{SearchConfig, SearchPoller};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use warden_core::{AgentId, SessionId, SubjectId};
use warden_world::PatrolRoute;

use super::agent::{Agent, AgentState};
use super::escort::IntakeEscort;
use super::TickContext;
use crate::services::NavigationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    Idle,
    Patrolling,
    ProcessingIntake,
    Escorting,
    Monitoring,
    RespondingToIncident,
    Searching,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    Changed {
        officer: AgentId,
        from: Activity,
        to: Activity,
    },
    ComplianceWarning {
        officer: AgentId,
        subject: SubjectId,
        response: ComplianceResponse,
        distance: f32,
    },
    PatienceExhausted {
        officer: AgentId,
        subject: SubjectId,
    },
    SearchStarted {
        officer: AgentId,
        subject: SubjectId,
    },
    SearchFinished {
        officer: AgentId,
        subject: SubjectId,
    },
    IncidentReached {
        officer: AgentId,
        location: Vec3,
    },
    PatrolDisabled {
        officer: AgentId,
        route: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub compliance: ComplianceConfig,
    pub search: SearchConfig,
    /// Arrival tolerance for patrol waypoints
    pub waypoint_tolerance: f32,
    /// Seconds an officer holds at an incident before resuming
    pub incident_hold_time: f32,
    pub incident_tolerance: f32,
    /// How far the supervisor may drift from its post
    pub post_tolerance: f32,
    pub message_duration: f32,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            compliance: ComplianceConfig::default(),
            search: SearchConfig::default(),
            waypoint_tolerance: 0.6,
            incident_hold_time: 10.0,
            incident_tolerance: 1.5,
            post_tolerance: 1.0,
            message_duration: 3.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Incident {
    location: Vec3,
    previous: Activity,
    arrived_at: Option<f64>,
}

pub struct ActivityLayer {
    officer: AgentId,
    activity: Activity,
    config: ActivityConfig,
    patrol: Option<PatrolRunner>,
    search: SearchPoller,
    searching: Option<SubjectId>,
    monitor_post: Option<Vec3>,
    incident: Option<Incident>,
    /// Tracker for the escort session it was created for
    compliance: Option<(SessionId, ComplianceTracker)>,
    events: Vec<ActivityEvent>,
}

impl ActivityLayer {
    pub fn new(officer: AgentId, config: ActivityConfig) -> Self {
        Self {
            officer,
            activity: Activity::Idle,
            search: SearchPoller::new(config.search.clone()),
            config,
            patrol: None,
            searching: None,
            monitor_post: None,
            incident: None,
            compliance: None,
            events: Vec::new(),
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn patrol(&self) -> Option<&PatrolRunner> {
        self.patrol.as_ref()
    }

    /// Patience toward the currently escorted subject
    pub fn patience(&self) -> Option<f32> {
        self.compliance.as_ref().map(|(_, t)| t.patience())
    }

    pub fn drain_events(&mut self) -> Vec<ActivityEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_activity(&mut self, to: Activity) {
        if to == self.activity {
            return;
        }
        let from = self.activity;
        self.activity = to;
        info!("{} activity {:?} -> {:?}", self.officer, from, to);
        self.events.push(ActivityEvent::Changed {
            officer: self.officer,
            from,
            to,
        });
    }

    /// Start walking a route. An empty route disables patrol.
    pub fn assign_patrol(
        &mut self,
        route: PatrolRoute,
        agent: &Agent,
        nav: &mut dyn NavigationService,
    ) -> bool {
        let name = route.name.clone();
        let speed = route.speed;
        match PatrolRunner::new(route) {
            Some(runner) => {
                nav.set_speed(agent.id(), speed);
                self.patrol = Some(runner);
                self.set_activity(Activity::Patrolling);
                true
            }
            None => {
                error!("{} route '{}' has no waypoints, patrol disabled", self.officer, name);
                self.patrol = None;
                self.events.push(ActivityEvent::PatrolDisabled {
                    officer: self.officer,
                    route: name,
                });
                false
            }
        }
    }

    /// Hold position at a post
    pub fn assign_post(&mut self, post: Vec3) {
        self.monitor_post = Some(post);
        self.set_activity(Activity::Monitoring);
    }

    /// Send the officer to an incident. Refused while it is already
    /// responding to one or in the middle of a search.
    pub fn dispatch(
        &mut self,
        location: Vec3,
        agent: &mut Agent,
        now: f64,
        nav: &mut dyn NavigationService,
    ) -> bool {
        if self.incident.is_some() || self.activity == Activity::Searching {
            return false;
        }
        info!("{} dispatched to incident at {:?}", self.officer, location);
        agent.clear_actions();
        if agent.state() == AgentState::Moving {
            agent.stop(now, nav);
        }
        self.incident = Some(Incident {
            location,
            previous: self.activity,
            arrived_at: None,
        });
        self.set_activity(Activity::RespondingToIncident);
        true
    }

    pub fn tick(
        &mut self,
        agent: &mut Agent,
        escort: Option<&IntakeEscort>,
        ctx: &mut TickContext<'_, '_>,
    ) {
        if !agent.is_enabled() {
            return;
        }
        if self.incident.is_some() {
            self.tick_incident(agent, ctx);
            return;
        }
        if let Some(escort) = escort {
            self.tick_intake(agent, escort, ctx);
            return;
        }
        match self.activity {
            Activity::Patrolling => self.tick_patrol(agent, ctx),
            Activity::Searching => self.tick_search(ctx),
            Activity::Monitoring => self.tick_monitor(agent, ctx),
            _ => {}
        }
    }

    fn tick_intake(&mut self, agent: &Agent, escort: &IntakeEscort, ctx: &mut TickContext<'_, '_>) {
        let Some(session) = escort.session() else {
            self.compliance = None;
            self.set_activity(Activity::Idle);
            return;
        };

        if self.compliance.as_ref().map(|(id, _)| *id) != Some(session.id) {
            self.compliance = Some((
                session.id,
                ComplianceTracker::new(self.config.compliance.clone()),
            ));
        }

        if !session.state.subject_follows() {
            self.set_activity(Activity::ProcessingIntake);
            return;
        }
        self.set_activity(Activity::Escorting);

        let Some(subject_pos) = ctx.subjects.get(&session.subject) else {
            return;
        };
        let distance = agent.position().distance(*subject_pos);
        let Some((_, tracker)) = self.compliance.as_mut() else {
            return;
        };
        let update = tracker.update(distance, ctx.now, ctx.delta);

        if let Some(response) = update.response {
            ctx.services
                .messages
                .show(self.officer, response.line(), self.config.message_duration);
            self.events.push(ActivityEvent::ComplianceWarning {
                officer: self.officer,
                subject: session.subject,
                response,
                distance,
            });
        }
        if update.exhausted {
            warn!("{} ran out of patience with {}", self.officer, session.subject);
            self.events.push(ActivityEvent::PatienceExhausted {
                officer: self.officer,
                subject: session.subject,
            });
        }
    }

    fn tick_patrol(&mut self, agent: &mut Agent, ctx: &mut TickContext<'_, '_>) {
        let Some(patrol) = self.patrol.as_mut() else {
            return;
        };
        patrol.observe(agent);

        let candidate = self.search.poll(
            self.officer,
            agent.position(),
            ctx.now,
            ctx.subjects,
            &*ctx.services.search,
        );
        if let Some(subject) = candidate {
            if ctx.services.search.begin(self.officer, subject) {
                info!("{} searching {}", self.officer, subject);
                agent.clear_actions();
                agent.stop(ctx.now, ctx.services.nav);
                self.searching = Some(subject);
                self.set_activity(Activity::Searching);
                self.events.push(ActivityEvent::SearchStarted {
                    officer: self.officer,
                    subject,
                });
                return;
            }
        }

        if let Some(patrol) = self.patrol.as_mut() {
            patrol.tick(agent, self.config.waypoint_tolerance);
        }
    }

    fn tick_search(&mut self, ctx: &mut TickContext<'_, '_>) {
        let Some(subject) = self.searching else {
            self.set_activity(Activity::Patrolling);
            return;
        };
        if !ctx.services.search.is_finished(self.officer, subject) {
            return;
        }
        info!("{} finished searching {}", self.officer, subject);
        self.searching = None;
        self.events.push(ActivityEvent::SearchFinished {
            officer: self.officer,
            subject,
        });
        if let Some(patrol) = self.patrol.as_mut() {
            patrol.resume();
        }
        self.set_activity(Activity::Patrolling);
    }

    fn tick_monitor(&mut self, agent: &mut Agent, ctx: &mut TickContext<'_, '_>) {
        let Some(post) = self.monitor_post else {
            return;
        };
        if agent.state() != AgentState::Idle || agent.queued_actions() > 0 {
            return;
        }
        if agent.position().distance(post) > self.config.post_tolerance {
            agent.move_to(post, self.config.post_tolerance * 0.5, ctx.now, ctx.services.nav);
        }
    }

    fn tick_incident(&mut self, agent: &mut Agent, ctx: &mut TickContext<'_, '_>) {
        let Some(incident) = self.incident.as_mut() else {
            return;
        };

        if let Some(arrived_at) = incident.arrived_at {
            if ctx.now - arrived_at < self.config.incident_hold_time as f64 {
                return;
            }
            let previous = incident.previous;
            self.finish_incident(previous);
            return;
        }

        if agent.position().distance(incident.location) <= self.config.incident_tolerance {
            if agent.state() == AgentState::Moving {
                agent.stop(ctx.now, ctx.services.nav);
            }
            incident.arrived_at = Some(ctx.now);
            info!("{} reached incident at {:?}", self.officer, incident.location);
            self.events.push(ActivityEvent::IncidentReached {
                officer: self.officer,
                location: incident.location,
            });
            return;
        }

        match agent.state() {
            AgentState::Idle => {
                let location = incident.location;
                let previous = incident.previous;
                let tolerance = self.config.incident_tolerance * 0.5;
                if agent.move_to(location, tolerance, ctx.now, ctx.services.nav).is_none() {
                    error!("{} cannot reach incident at {:?}", self.officer, location);
                    self.finish_incident(previous);
                }
            }
            AgentState::Error => {
                let previous = incident.previous;
                self.finish_incident(previous);
            }
            _ => {}
        }
    }

    fn finish_incident(&mut self, previous: Activity) {
        self.incident = None;
        if previous == Activity::Patrolling {
            if let Some(patrol) = self.patrol.as_mut() {
                patrol.resume();
            }
        }
        self.set_activity(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::doors::DoorSystem;
    use crate::intake::{CellRegistry, IntakeDesk, MessageLog, SearchDesk};
    use crate::nav::StraightLineNav;
    use crate::npc::agent::{AgentConfig, AgentEvent};
    use crate::services::Services;
    use warden_world::FacilityLayout;

    struct Rig {
        layout: FacilityLayout,
        nav: StraightLineNav,
        doors: DoorSystem,
        desk: IntakeDesk,
        cells: CellRegistry,
        messages: MessageLog,
        search: SearchDesk,
        subjects: BTreeMap<SubjectId, Vec3>,
        agent: Agent,
        layer: ActivityLayer,
        now: f64,
        events: Vec<ActivityEvent>,
        arrivals: Vec<Vec3>,
    }

    impl Rig {
        fn new() -> Self {
            let mut nav = StraightLineNav::new();
            let agent = Agent::spawn(AgentId(1), Vec3::ZERO, 4.0, AgentConfig::default(), &mut nav);
            Self {
                layout: FacilityLayout::demo(),
                nav,
                doors: DoorSystem::new(0.5),
                desk: IntakeDesk::new(),
                cells: CellRegistry::new(Vec::new()),
                messages: MessageLog::new(),
                search: SearchDesk::new(),
                subjects: BTreeMap::new(),
                agent,
                layer: ActivityLayer::new(AgentId(1), ActivityConfig::default()),
                now: 0.0,
                events: Vec::new(),
                arrivals: Vec::new(),
            }
        }

        fn step(&mut self, escort: Option<&IntakeEscort>) {
            let dt = 0.1;
            self.nav.update(dt);
            self.now += dt as f64;
            self.agent.tick(self.now, dt, &mut self.nav);
            let mut services = Services {
                nav: &mut self.nav,
                doors: &mut self.doors,
                intake: &self.desk,
                cells: &mut self.cells,
                messages: &mut self.messages,
                search: &mut self.search,
            };
            let mut ctx = TickContext {
                now: self.now,
                delta: dt,
                layout: &self.layout,
                subjects: &self.subjects,
                services: &mut services,
            };
            self.layer.tick(&mut self.agent, escort, &mut ctx);
            self.events.extend(self.layer.drain_events());
            for event in self.agent.drain_events() {
                if let AgentEvent::DestinationReached { destination, .. } = event {
                    self.arrivals.push(destination);
                }
            }
        }

        fn run(&mut self, ticks: usize) {
            for _ in 0..ticks {
                self.step(None);
            }
        }

        fn patrol_route() -> PatrolRoute {
            let mut route = PatrolRoute::new(
                "test_loop",
                vec![Vec3::new(4.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 4.0)],
            );
            route.speed = 4.0;
            route.dwell_time = 0.5;
            route
        }
    }

    #[test]
    fn test_empty_route_disables_patrol() {
        let mut rig = Rig::new();
        let ok = rig.layer.assign_patrol(
            PatrolRoute::new("nowhere", Vec::new()),
            &rig.agent,
            &mut rig.nav,
        );
        assert!(!ok);
        assert_eq!(rig.layer.activity(), Activity::Idle);
        assert!(matches!(
            rig.layer.drain_events().as_slice(),
            [ActivityEvent::PatrolDisabled { route, .. }] if route == "nowhere"
        ));
    }

    #[test]
    fn test_patrol_walks_route() {
        let mut rig = Rig::new();
        assert!(rig.layer.assign_patrol(Rig::patrol_route(), &rig.agent, &mut rig.nav));
        assert_eq!(rig.layer.activity(), Activity::Patrolling);
        rig.run(100);
        assert!(rig.arrivals.len() >= 3);
        assert_eq!(rig.arrivals[0], Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(rig.arrivals[1], Vec3::new(4.0, 0.0, 4.0));
    }

    #[test]
    fn test_search_suspends_and_resumes_patrol() {
        let mut rig = Rig::new();
        rig.layer.assign_patrol(Rig::patrol_route(), &rig.agent, &mut rig.nav);
        rig.subjects.insert(SubjectId(5), Vec3::new(1.0, 0.0, 0.0));
        rig.search.set_eligible(SubjectId(5), true);

        rig.run(1);
        assert_eq!(rig.layer.activity(), Activity::Searching);
        assert!(rig.search.is_running(AgentId(1), SubjectId(5)));
        assert_eq!(rig.agent.queued_actions(), 0);

        rig.run(20);
        assert_eq!(rig.layer.activity(), Activity::Searching);
        rig.search.finish(AgentId(1), SubjectId(5));
        rig.run(1);
        assert_eq!(rig.layer.activity(), Activity::Patrolling);
        assert!(rig.events.contains(&ActivityEvent::SearchFinished {
            officer: AgentId(1),
            subject: SubjectId(5),
        }));
        rig.run(30);
        assert_eq!(rig.arrivals.first(), Some(&Vec3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_incident_holds_then_resumes() {
        let mut rig = Rig::new();
        rig.layer.assign_post(Vec3::ZERO);
        let target = Vec3::new(6.0, 0.0, 0.0);
        assert!(rig.layer.dispatch(target, &mut rig.agent, 0.0, &mut rig.nav));
        assert!(!rig.layer.dispatch(target, &mut rig.agent, 0.0, &mut rig.nav));
        assert_eq!(rig.layer.activity(), Activity::RespondingToIncident);

        rig.run(40);
        assert!(rig.events.iter().any(|e| matches!(e, ActivityEvent::IncidentReached { .. })));
        assert!(rig.agent.position().distance(target) <= 1.5);
        assert_eq!(rig.layer.activity(), Activity::RespondingToIncident);

        rig.run(100);
        assert_eq!(rig.layer.activity(), Activity::Monitoring);
        // Walks back to its post
        rig.run(40);
        assert!(rig.agent.position().distance(Vec3::ZERO) <= 1.0);
    }

    #[test]
    fn test_intake_activity_follows_escort_session() {
        let mut rig = Rig::new();
        let idle = IntakeEscort::new(AgentId(1), Default::default());
        rig.step(Some(&idle));
        assert_eq!(rig.layer.activity(), Activity::Idle);
        assert_eq!(rig.layer.patience(), None);

        let mut escort = IntakeEscort::new(
            AgentId(1),
            crate::npc::escort::EscortConfig {
                fetch_delay_min: 0.0,
                fetch_delay_max: 0.0,
                seed: Some(3),
                ..Default::default()
            },
        );
        escort.start(SubjectId(9), 1, &rig.agent, 0.0).unwrap();
        rig.step(Some(&escort));
        assert_eq!(rig.layer.activity(), Activity::ProcessingIntake);
        assert_eq!(rig.layer.patience(), Some(100.0));

        rig.step(Some(&idle));
        assert_eq!(rig.layer.activity(), Activity::Idle);
        assert_eq!(rig.layer.patience(), None);
    }
}
