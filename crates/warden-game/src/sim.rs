//! Simulation driver
//!
//! Owns the clock, the officer roster, the population manager and the event
//! bus, and runs the fixed per-tick ordering. External systems are borrowed
//! through [`Services`] for the duration of one tick.

use std::collections::BTreeMap;

use glam::Vec3;
use tracing::{debug, info, warn};
use warden_core::{AgentId, EventBus, SessionId, SimClock, SubjectId, SubscriptionId};
use warden_world::{FacilityLayout, RegionTracker, RouteRegistry};

use crate::config::{ConfigError, EngineConfig};
use crate::event::EngineEvent;
use crate::npc::escort::EscortError;
use crate::npc::population::{PopulationError, PopulationManager};
use crate::npc::roster::{OfficerRoster, RosterSpawner};
use crate::npc::{CompositeState, OfficerRole, TickContext};
use crate::services::{NavigationService, Services};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Population(#[from] PopulationError),

    #[error("booking refused: {0}")]
    Booking(#[from] EscortError),
}

pub struct Simulation {
    config: EngineConfig,
    layout: FacilityLayout,
    clock: SimClock,
    roster: OfficerRoster,
    population: PopulationManager,
    regions: RegionTracker,
    bus: EventBus<EngineEvent>,
    /// Subject the population manager keys on
    tracked: Option<SubjectId>,
    subjects: BTreeMap<SubjectId, Vec3>,
    eligibility: Box<dyn Fn(SubjectId) -> bool>,
}

impl Simulation {
    pub fn new(
        config: EngineConfig,
        layout: FacilityLayout,
        routes: RouteRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let population = PopulationManager::new(config.population.clone(), routes)?;
        let regions = RegionTracker::new(layout.regions.clone(), config.regions.movement_threshold);
        info!(
            "Simulation ready: {} doors, {} patrol assignments",
            layout.doors.len(),
            population.routes().assignments().len()
        );
        Ok(Self {
            clock: SimClock::new(config.time.clone()),
            config,
            layout,
            roster: OfficerRoster::new(),
            population,
            regions,
            bus: EventBus::new(),
            tracked: None,
            subjects: BTreeMap::new(),
            eligibility: Box::new(|_| true),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layout(&self) -> &FacilityLayout {
        &self.layout
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn roster(&self) -> &OfficerRoster {
        &self.roster
    }

    pub fn population(&self) -> &PopulationManager {
        &self.population
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn resume(&mut self) {
        self.clock.resume();
    }

    pub fn subscribe<F: FnMut(&EngineEvent) + 'static>(&mut self, subscriber: F) -> SubscriptionId {
        self.bus.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Replace the predicate deciding whether the tracked subject warrants
    /// patrol officers at all
    pub fn set_eligibility<F: Fn(SubjectId) -> bool + 'static>(&mut self, predicate: F) {
        self.eligibility = Box::new(predicate);
    }

    /// Key population control on this subject
    pub fn track_subject(&mut self, subject: SubjectId) {
        if self.tracked != Some(subject) {
            info!("Tracking {}", subject);
            self.tracked = Some(subject);
            self.regions.reset();
        }
    }

    pub fn subject_position(&self, subject: SubjectId) -> Option<Vec3> {
        self.subjects.get(&subject).copied()
    }

    /// Record a subject's position. Region changes and significant movement
    /// of the tracked subject re-evaluate the population right away.
    pub fn update_subject(
        &mut self,
        subject: SubjectId,
        position: Vec3,
        nav: &mut dyn NavigationService,
    ) {
        self.subjects.insert(subject, position);
        if self.tracked != Some(subject) {
            return;
        }

        let region_events = self.regions.update(position);
        if region_events.is_empty() {
            return;
        }
        for event in &region_events {
            debug!("{} {:?}", subject, event);
        }
        self.bus
            .publish_all(region_events.into_iter().map(EngineEvent::from));

        let eligible = (self.eligibility)(subject);
        let mut spawner = RosterSpawner {
            roster: &mut self.roster,
            nav,
            layout: &self.layout,
            config: &self.config,
        };
        self.population.evaluate(Some(position), eligible, &mut spawner);
        self.bus.publish_all(
            self.population
                .drain_events()
                .into_iter()
                .map(EngineEvent::from),
        );
    }

    pub fn remove_subject(&mut self, subject: SubjectId) {
        self.subjects.remove(&subject);
    }

    /// A subject is booked and waiting in a holding cell. The lowest-id free
    /// intake officer picks it up.
    pub fn on_booking_started(
        &mut self,
        subject: SubjectId,
        holding_cell: u32,
    ) -> Result<SessionId, EscortError> {
        if self.layout.holding_cell(holding_cell).is_none() {
            return Err(EscortError::UnknownHoldingCell(holding_cell));
        }
        let intake = self.roster.with_role(OfficerRole::Intake);
        let Some(&first) = intake.first() else {
            return Err(EscortError::NoOfficerOnDuty);
        };

        let now = self.clock.now();
        let free = intake
            .iter()
            .copied()
            .find(|id| self.roster.get(*id).is_some_and(|o| o.is_available()));
        match free.and_then(|id| self.roster.get_mut(id)) {
            Some(officer) => officer.start_intake(subject, holding_cell, now),
            None => {
                warn!("Booking of {} refused: every intake officer is busy", subject);
                Err(EscortError::OfficerBusy(first))
            }
        }
    }

    /// Officer running the given intake session
    pub fn session_officer(&self, session: SessionId) -> Option<AgentId> {
        self.roster
            .iter()
            .find(|o| {
                o.escort()
                    .and_then(|e| e.session())
                    .is_some_and(|s| s.id == session)
            })
            .map(|o| o.id())
    }

    /// Abandon an officer's intake session. It walks back to post and
    /// restores the doors it opened.
    pub fn stop_intake(&mut self, officer: AgentId) -> bool {
        let now = self.clock.now();
        self.roster
            .get_mut(officer)
            .and_then(|o| o.escort_mut())
            .map(|e| e.stop(now))
            .unwrap_or(false)
    }

    /// Send the nearest available patrol or supervising officer to a
    /// location
    pub fn report_incident(
        &mut self,
        location: Vec3,
        nav: &mut dyn NavigationService,
    ) -> Option<AgentId> {
        let now = self.clock.now();
        let nearest = self
            .roster
            .iter()
            .filter(|o| o.role() != OfficerRole::Intake && o.is_available())
            .min_by(|a, b| {
                let da = a.agent().position().distance(location);
                let db = b.agent().position().distance(location);
                da.total_cmp(&db)
            })
            .map(|o| o.id())?;

        let officer = self.roster.get_mut(nearest)?;
        if officer.dispatch(location, now, nav) {
            Some(nearest)
        } else {
            None
        }
    }

    pub fn notify_attacked(&mut self, officer: AgentId, subject: SubjectId) {
        if let Some(o) = self.roster.get_mut(officer) {
            o.agent_mut().notify_attacked(subject);
        }
    }

    pub fn composite_state(&self, officer: AgentId) -> Option<CompositeState> {
        self.roster.get(officer).map(|o| o.composite_state())
    }

    /// Advance the whole simulation by one frame. Returns every event
    /// dispatched to subscribers this tick, in order.
    pub fn tick(&mut self, raw_delta: f32, services: &mut Services<'_>) -> Vec<EngineEvent> {
        self.clock.advance(raw_delta);
        if self.clock.paused {
            return Vec::new();
        }
        let now = self.clock.now();
        let delta = self.clock.delta_time;

        self.staff_intake(services.nav);

        let door_events = services.doors.drain_events();
        let mut out = Vec::new();
        for id in self.roster.ids() {
            let Some(officer) = self.roster.get_mut(id) else {
                continue;
            };
            let mut ctx = TickContext {
                now,
                delta,
                layout: &self.layout,
                subjects: &self.subjects,
                services: &mut *services,
            };
            officer.tick(&door_events, &mut ctx, &mut out);
        }

        let subject = self.tracked.and_then(|s| self.subjects.get(&s).copied());
        let eligible = self.tracked.is_some_and(|s| (self.eligibility)(s));
        let mut spawner = RosterSpawner {
            roster: &mut self.roster,
            nav: &mut *services.nav,
            layout: &self.layout,
            config: &self.config,
        };
        self.population.update(now, subject, eligible, &mut spawner);
        out.extend(
            self.population
                .drain_events()
                .into_iter()
                .map(EngineEvent::from),
        );

        self.bus.publish_all(out);
        self.bus.dispatch()
    }

    /// Keep the configured number of intake officers on duty at the post
    fn staff_intake(&mut self, nav: &mut dyn NavigationService) {
        let on_duty = self.roster.with_role(OfficerRole::Intake).len();
        let wanted = self.config.officers.intake_count as usize;
        for _ in on_duty..wanted {
            self.roster.spawn(
                OfficerRole::Intake,
                self.layout.post,
                self.config.officers.intake_speed,
                &self.config,
                nav,
            );
        }
    }
}
