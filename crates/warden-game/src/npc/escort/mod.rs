//! Intake escort orchestrator
//!
//! Walks one officer and one subject through the booking pipeline: fetch the
//! subject from a holding cell, visit the mugshot, scanner and storage
//! stations, lock the subject into an assigned cell, and return to post.
//!
//! Arrival signals from navigation are not trusted on their own. An arrival
//! only advances the pipeline when no door operation is in flight, the
//! post-door cooldown has elapsed, it carries the move request this
//! orchestrator issued for the expected station, and the station has not
//! already been processed. A soft timeout forces arrival if navigation never
//! reports it.

pub mod session;
pub mod state;

pub use session::{EscortSession, PendingDoorOp};
pub use state::{DoorTarget, EscortState, Station, PIPELINE};

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use warden_core::{Aabb, AgentId, DoorId, MoveRequestId, SessionId, SubjectId};
use warden_world::FacilityLayout;

use super::agent::{Agent, AgentState};
use super::TickContext;
use crate::services::{DoorCommand, DoorError, DoorEvent, DoorSubsystem, Services};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscortConfig {
    /// Random delay before fetching the subject, in seconds
    pub fetch_delay_min: f32,
    pub fetch_delay_max: f32,
    /// Movement states force arrival after this many seconds
    pub soft_timeout: f32,
    /// Arrivals are ignored for this long after a door operation completes
    pub arrival_cooldown: f32,
    /// Wait after a door operation before walking on
    pub clearance_delay: f32,
    /// How long the subject must stay out of (or in) a cell before the door closes
    pub subject_clear_delay: f32,
    /// Maximum distance between an arrival and the expected station point
    pub arrival_tolerance: f32,
    /// Tolerance passed to the agent's move requests
    pub move_tolerance: f32,
    pub message_duration: f32,
    /// Fixed seed for the fetch delay; random when unset
    pub seed: Option<u64>,
}

impl Default for EscortConfig {
    fn default() -> Self {
        Self {
            fetch_delay_min: 5.0,
            fetch_delay_max: 10.0,
            soft_timeout: 30.0,
            arrival_cooldown: 1.0,
            clearance_delay: 1.5,
            subject_clear_delay: 2.0,
            arrival_tolerance: 1.0,
            move_tolerance: 0.6,
            message_duration: 3.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EscortError {
    #[error("{0} is busy and cannot start an intake")]
    OfficerBusy(AgentId),
    #[error("no intake officer is on duty")]
    NoOfficerOnDuty,
    #[error("holding cell {0} does not exist")]
    UnknownHoldingCell(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeEvent {
    Started {
        officer: AgentId,
        subject: SubjectId,
        session: SessionId,
        holding_cell: u32,
    },
    StateChanged {
        officer: AgentId,
        session: SessionId,
        from: EscortState,
        to: EscortState,
    },
    StationReached {
        officer: AgentId,
        session: SessionId,
        station: Station,
    },
    Completed {
        officer: AgentId,
        subject: SubjectId,
        session: SessionId,
        aborted: bool,
    },
}

/// Result of trying to start the move for a movement state
enum MoveOutcome {
    Waiting,
    Issued,
    NoTarget,
    Refused,
}

pub struct IntakeEscort {
    officer: AgentId,
    config: EscortConfig,
    session: Option<EscortSession>,
    rng: StdRng,
    events: Vec<IntakeEvent>,
    completed: u32,
}

impl IntakeEscort {
    pub fn new(officer: AgentId, config: EscortConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ officer.0),
            None => StdRng::from_entropy(),
        };
        Self {
            officer,
            config,
            session: None,
            rng,
            events: Vec::new(),
            completed: 0,
        }
    }

    pub fn state(&self) -> EscortState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(EscortState::Idle)
    }

    pub fn session(&self) -> Option<&EscortSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Sessions finished so far, aborted or not
    pub fn completed_sessions(&self) -> u32 {
        self.completed
    }

    pub fn drain_events(&mut self) -> Vec<IntakeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Doors this orchestrator operates itself
    pub fn owned_doors(&self, layout: &FacilityLayout) -> Vec<DoorId> {
        let Some(session) = &self.session else {
            return Vec::new();
        };
        let mut doors = Vec::new();
        if let Some(cell) = layout.holding_cell(session.holding_cell) {
            doors.push(cell.door);
        }
        if let Some(cell) = session.cell.and_then(|c| layout.cell(c)) {
            doors.push(cell.door);
        }
        doors
    }

    /// Begin a session for a subject waiting in `holding_cell`. Only an idle
    /// officer without a session can start one.
    pub fn start(
        &mut self,
        subject: SubjectId,
        holding_cell: u32,
        agent: &Agent,
        now: f64,
    ) -> Result<SessionId, EscortError> {
        if self.session.is_some() || agent.state() != AgentState::Idle || !agent.is_enabled() {
            return Err(EscortError::OfficerBusy(self.officer));
        }

        let (lo, hi) = (
            self.config.fetch_delay_min.min(self.config.fetch_delay_max),
            self.config.fetch_delay_min.max(self.config.fetch_delay_max),
        );
        let delay = self.rng.gen_range(lo..=hi);
        let session = EscortSession::new(self.officer, subject, holding_cell, now, now + delay as f64);
        let id = session.id;
        info!(
            "{} starting intake of {} from holding cell {} in {:.1}s ({})",
            self.officer, subject, holding_cell, delay, id
        );
        self.session = Some(session);
        self.events.push(IntakeEvent::Started {
            officer: self.officer,
            subject,
            session: id,
            holding_cell,
        });
        self.transition(EscortState::DelayBeforeFetch, now);
        Ok(id)
    }

    /// Abandon the session and walk back to post. Returns `false` when there
    /// is nothing to stop.
    pub fn stop(&mut self, now: f64) -> bool {
        match self.state() {
            EscortState::Idle | EscortState::ReturningToPost => false,
            _ => {
                self.abort("stop requested", now);
                true
            }
        }
    }

    /// Record a door the officer opened on its own while escorting
    pub fn note_door_passed(&mut self, door: DoorId, was_locked: bool) {
        if let Some(session) = self.session.as_mut() {
            session.record_opened(door, was_locked);
        }
    }

    fn transition(&mut self, to: EscortState, now: f64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let from = session.state;
        if !from.can_transition_to(to) {
            warn!("{} rejected escort transition {:?} -> {:?}", self.officer, from, to);
            return false;
        }
        session.enter(to, now);
        debug!("{} escort {:?} -> {:?}", self.officer, from, to);
        self.events.push(IntakeEvent::StateChanged {
            officer: self.officer,
            session: session.id,
            from,
            to,
        });
        true
    }

    fn abort(&mut self, reason: &str, now: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state == EscortState::ReturningToPost {
            return;
        }
        warn!(
            "{} aborting intake of {} in {:?}: {}",
            self.officer, session.subject, session.state, reason
        );
        session.aborted = true;
        session.pending_door = None;
        self.transition(EscortState::ReturningToPost, now);
    }

    /// Per-state handler, run once per tick
    pub fn tick(&mut self, agent: &mut Agent, ctx: &mut TickContext<'_, '_>) {
        let Some(state) = self.session.as_ref().map(|s| s.state) else {
            return;
        };

        if state == EscortState::DelayBeforeFetch {
            if self.session.as_ref().is_some_and(|s| ctx.now >= s.fetch_at) {
                self.transition(EscortState::EscortToHolding, ctx.now);
            }
        } else if state.is_movement() {
            self.tick_movement(state, agent, ctx);
        } else if let Some((target, command)) = state.door_operation() {
            self.tick_door(target, command, ctx);
        } else if state == EscortState::WaitingForPlayerExit {
            self.tick_subject_cell(DoorTarget::Holding, false, ctx);
        } else if state == EscortState::WaitingForCellEntry {
            self.tick_subject_cell(DoorTarget::Cell, true, ctx);
        } else if let Some(step) = state.awaited_step() {
            let Some(subject) = self.session.as_ref().map(|s| s.subject) else {
                return;
            };
            if !ctx.services.intake.is_complete(subject, step) {
                return;
            }
            info!("{} sees {:?} complete for {}", self.officer, step, subject);
            if state == EscortState::WaitingForStorage && !self.assign_cell(ctx) {
                return;
            }
            self.transition(state.next(), ctx.now);
        }
    }

    fn station_point(
        session: &EscortSession,
        station: Station,
        layout: &FacilityLayout,
    ) -> Option<Vec3> {
        match station {
            Station::HoldingCell => layout.holding_cell(session.holding_cell).map(|c| c.door_point),
            Station::Processing(kind) => layout.station(kind).map(|s| s.point),
            Station::Cell => session.cell.and_then(|c| layout.cell(c)).map(|c| c.door_point),
            Station::Post => Some(layout.post),
        }
    }

    fn tick_movement(&mut self, state: EscortState, agent: &mut Agent, ctx: &mut TickContext<'_, '_>) {
        let Some(station) = state.station() else {
            return;
        };
        let now = ctx.now;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if let Some(request) = session.move_request {
            if now - session.move_started_at < self.config.soft_timeout as f64 {
                return;
            }
            let target = session.move_target.unwrap_or(agent.position());
            warn!(
                "{} soft timeout heading to {}, forcing arrival",
                self.officer,
                station.name()
            );
            if agent.state() == AgentState::Moving {
                agent.stop(now, ctx.services.nav);
            }
            self.handle_arrival(request, target, true, agent, now, ctx.services);
            return;
        }

        let outcome = if session.door_active() || now < session.clearance_until {
            MoveOutcome::Waiting
        } else {
            match Self::station_point(session, station, ctx.layout) {
                None => MoveOutcome::NoTarget,
                Some(target) => {
                    match agent.move_to(target, self.config.move_tolerance, now, ctx.services.nav) {
                        Some(request) => {
                            session.move_request = Some(request);
                            session.move_target = Some(target);
                            session.move_started_at = now;
                            if let Some(text) = state.announcement() {
                                ctx.services
                                    .messages
                                    .show(self.officer, text, self.config.message_duration);
                            }
                            MoveOutcome::Issued
                        }
                        None => MoveOutcome::Refused,
                    }
                }
            }
        };

        match outcome {
            MoveOutcome::Waiting | MoveOutcome::Issued => {}
            MoveOutcome::NoTarget | MoveOutcome::Refused => {
                error!(
                    "{} cannot head to {} ({})",
                    self.officer,
                    station.name(),
                    if matches!(outcome, MoveOutcome::NoTarget) {
                        "no such location"
                    } else {
                        "navigation refused"
                    }
                );
                if state == EscortState::ReturningToPost {
                    self.teardown(ctx.services.doors);
                } else {
                    self.abort("station lookup failed", now);
                }
            }
        }
    }

    /// Offer an arrival to the pipeline. Returns `true` if it advanced.
    pub fn handle_arrival(
        &mut self,
        request: MoveRequestId,
        destination: Vec3,
        forced: bool,
        agent: &Agent,
        now: f64,
        services: &mut Services<'_>,
    ) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let state = session.state;
        let Some(station) = state.station() else {
            return false;
        };

        if session.door_active() {
            debug!("{} ignoring arrival while a door operation is active", self.officer);
            return false;
        }
        if let Some(completed_at) = session.last_door_completed_at {
            if now - completed_at < self.config.arrival_cooldown as f64 {
                debug!("{} ignoring arrival inside door cooldown", self.officer);
                return false;
            }
        }
        if !forced {
            if session.move_request != Some(request) {
                debug!("{} ignoring arrival for stale {:?}", self.officer, request);
                return false;
            }
            let on_target = session
                .move_target
                .map(|t| t.distance(destination) <= self.config.arrival_tolerance)
                .unwrap_or(false);
            if !on_target {
                debug!("{} ignoring arrival at {:?}", self.officer, destination);
                return false;
            }
        }
        if !session.processed.insert(station) {
            debug!("{} already processed {}", self.officer, station.name());
            return false;
        }

        info!(
            "{} reached {} at {:?}",
            self.officer,
            station.name(),
            agent.position()
        );
        self.events.push(IntakeEvent::StationReached {
            officer: self.officer,
            session: session.id,
            station,
        });

        if state == EscortState::ReturningToPost {
            self.teardown(services.doors);
        } else {
            self.transition(state.next(), now);
        }
        true
    }

    fn door_for(&self, target: DoorTarget, layout: &FacilityLayout) -> Option<DoorId> {
        let session = self.session.as_ref()?;
        match target {
            DoorTarget::Holding => layout.holding_cell(session.holding_cell).map(|c| c.door),
            DoorTarget::Cell => session.cell.and_then(|c| layout.cell(c)).map(|c| c.door),
        }
    }

    fn tick_door(&mut self, target: DoorTarget, command: DoorCommand, ctx: &mut TickContext<'_, '_>) {
        let Some(door) = self.door_for(target, ctx.layout) else {
            error!("{} has no {:?} door for this session", self.officer, target);
            self.abort("door lookup failed", ctx.now);
            return;
        };
        let needs_request = match self.session.as_ref().map(|s| &s.pending_door) {
            Some(None) => true,
            Some(Some(pending)) => pending.op.is_none(),
            None => false,
        };
        if needs_request {
            self.begin_door_op(door, command, ctx.now, ctx.services.doors);
        }
    }

    fn begin_door_op(
        &mut self,
        door: DoorId,
        command: DoorCommand,
        now: f64,
        doors: &mut dyn DoorSubsystem,
    ) {
        let was_locked = doors.is_locked(door);
        let result = match doors.trigger_name(door) {
            Some(name) => doors.trigger(&name, command),
            None => doors.request(door, command),
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match result {
            Ok(op) => {
                debug!("{} requested {} {} ({:?})", self.officer, command, door, op);
                if command == DoorCommand::Open {
                    session.record_opened(door, was_locked);
                }
                session.pending_door = Some(PendingDoorOp {
                    door,
                    command,
                    op: Some(op),
                    fallback_used: false,
                });
            }
            Err(DoorError::Busy(_)) => {
                debug!("{} waiting for {} to free up", self.officer, door);
                session.pending_door = Some(PendingDoorOp {
                    door,
                    command,
                    op: None,
                    fallback_used: false,
                });
            }
            Err(e) => {
                warn!("{} door request failed: {}", self.officer, e);
                session.pending_door = Some(PendingDoorOp {
                    door,
                    command,
                    op: None,
                    fallback_used: true,
                });
                self.force_door(door, command, was_locked, now, doors);
            }
        }
    }

    /// Direct command after a failed request. The pipeline moves on whether
    /// or not it works.
    fn force_door(
        &mut self,
        door: DoorId,
        command: DoorCommand,
        was_locked: bool,
        now: f64,
        doors: &mut dyn DoorSubsystem,
    ) {
        match doors.force(door, command) {
            Ok(()) => {
                info!("{} forced {} {}", self.officer, command, door);
                if command == DoorCommand::Open {
                    if let Some(session) = self.session.as_mut() {
                        session.record_opened(door, was_locked);
                    }
                }
            }
            Err(e) => error!(
                "{} could not force {} {}: {}, continuing",
                self.officer, command, door, e
            ),
        }
        self.complete_door_op(now);
    }

    fn complete_door_op(&mut self, now: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.pending_door = None;
        session.last_door_completed_at = Some(now);
        session.clearance_until = now + self.config.clearance_delay as f64;
        let next = session.state.next();
        self.transition(next, now);
    }

    /// Match a door completion or failure against the pending request
    pub fn handle_door_event(&mut self, event: &DoorEvent, now: f64, doors: &mut dyn DoorSubsystem) {
        let Some(pending) = self.session.as_mut().and_then(|s| s.pending_door.as_mut()) else {
            return;
        };
        if pending.op != Some(event.op()) {
            return;
        }

        match event {
            DoorEvent::Completed { door, command, .. } => {
                debug!("{} door {} {} complete", self.officer, door, command);
                self.complete_door_op(now);
            }
            DoorEvent::Failed {
                door,
                command,
                reason,
                ..
            } => {
                let (door, command) = (*door, *command);
                if pending.fallback_used {
                    error!("{} door {} failed again: {}", self.officer, door, reason);
                    self.complete_door_op(now);
                    return;
                }
                pending.fallback_used = true;
                warn!(
                    "{} door {} failed to {}: {}, forcing",
                    self.officer, door, command, reason
                );
                let was_locked = doors.is_locked(door);
                self.force_door(door, command, was_locked, now, doors);
            }
        }
    }

    fn tick_subject_cell(&mut self, target: DoorTarget, want_inside: bool, ctx: &mut TickContext<'_, '_>) {
        let bounds: Option<Aabb> = self.session.as_ref().and_then(|s| match target {
            DoorTarget::Holding => ctx.layout.holding_cell(s.holding_cell).map(|c| c.bounds),
            DoorTarget::Cell => s.cell.and_then(|c| ctx.layout.cell(c)).map(|c| c.bounds),
        });
        let Some(bounds) = bounds else {
            error!("{} has no {:?} cell for this session", self.officer, target);
            self.abort("cell lookup failed", ctx.now);
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(position) = ctx.subjects.get(&session.subject) else {
            return;
        };

        if bounds.contains(*position) != want_inside {
            session.subject_clear_since = None;
            return;
        }
        let since = *session.subject_clear_since.get_or_insert(ctx.now);
        if ctx.now - since >= self.config.subject_clear_delay as f64 {
            let next = session.state.next();
            self.transition(next, ctx.now);
        }
    }

    fn assign_cell(&mut self, ctx: &mut TickContext<'_, '_>) -> bool {
        let Some(subject) = self.session.as_ref().map(|s| s.subject) else {
            return false;
        };
        match ctx.services.cells.assign(subject) {
            Some(cell) if ctx.layout.cell(cell).is_some() => {
                info!("{} assigned to cell {}", subject, cell);
                if let Some(session) = self.session.as_mut() {
                    session.cell = Some(cell);
                }
                true
            }
            Some(cell) => {
                error!("{} assigned to unknown cell {}", subject, cell);
                self.abort("assigned cell not in layout", ctx.now);
                false
            }
            None => {
                warn!("No free cell for {}", subject);
                self.abort("no cell available", ctx.now);
                false
            }
        }
    }

    /// Close and relock every door opened during the session, then end it
    fn teardown(&mut self, doors: &mut dyn DoorSubsystem) {
        let Some(session) = self.session.take() else {
            return;
        };

        // Closed doors are forced too, cancelling opens still in flight
        for (&door, &was_locked) in &session.opened_doors {
            if let Err(e) = doors.force(door, DoorCommand::Close) {
                error!("{} could not close {} at teardown: {}", self.officer, door, e);
            }
            if was_locked {
                if let Err(e) = doors.set_locked(door, true) {
                    warn!("{} could not relock {}: {}", self.officer, door, e);
                }
            }
        }

        info!(
            "{} finished intake of {} ({}){}",
            self.officer,
            session.subject,
            session.id,
            if session.aborted { " [aborted]" } else { "" }
        );
        self.events.push(IntakeEvent::StateChanged {
            officer: self.officer,
            session: session.id,
            from: session.state,
            to: EscortState::Idle,
        });
        self.events.push(IntakeEvent::Completed {
            officer: self.officer,
            subject: session.subject,
            session: session.id,
            aborted: session.aborted,
        });
        self.completed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::doors::{DoorFault, DoorSystem};
    use crate::intake::{CellRegistry, IntakeDesk, MessageLog, SearchDesk};
    use crate::nav::StraightLineNav;
    use crate::npc::agent::AgentConfig;
    use crate::services::NavigationService;

    const SUBJECT: SubjectId = SubjectId(7);

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
        escort: IntakeEscort,
        now: f64,
        events: Vec<IntakeEvent>,
    }

    impl Rig {
        fn new() -> Self {
            let layout = FacilityLayout::demo();
            let mut nav = StraightLineNav::new();
            let agent = Agent::spawn(AgentId(1), layout.post, 4.0, AgentConfig::default(), &mut nav);
            let config = EscortConfig {
                fetch_delay_min: 0.0,
                fetch_delay_max: 0.0,
                seed: Some(1),
                ..EscortConfig::default()
            };
            let mut subjects = BTreeMap::new();
            subjects.insert(SUBJECT, layout.holding_cell(2).unwrap().bounds.center());
            Self {
                doors: DoorSystem::from_layout(&layout, 0.5),
                cells: CellRegistry::new(layout.cells.iter().map(|c| c.index)),
                layout,
                nav,
                desk: IntakeDesk::new(),
                messages: MessageLog::new(),
                search: SearchDesk::new(),
                subjects,
                agent,
                escort: IntakeEscort::new(AgentId(1), config),
                now: 0.0,
                events: Vec::new(),
            }
        }

        fn step(&mut self) {
            let dt = 0.1;
            self.nav.update(dt);
            self.doors.update(dt);
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
            for event in services.doors.drain_events() {
                self.escort.handle_door_event(&event, self.now, services.doors);
            }
            for event in self.agent.drain_events() {
                if let crate::npc::agent::AgentEvent::DestinationReached {
                    request,
                    destination,
                    ..
                } = event
                {
                    self.escort.handle_arrival(
                        request,
                        destination,
                        false,
                        &self.agent,
                        self.now,
                        &mut services,
                    );
                }
            }
            let mut ctx = TickContext {
                now: self.now,
                delta: dt,
                layout: &self.layout,
                subjects: &self.subjects,
                services: &mut services,
            };
            self.escort.tick(&mut self.agent, &mut ctx);
            self.events.extend(self.escort.drain_events());
        }

        fn run_until(&mut self, max_ticks: usize, mut done: impl FnMut(&Rig) -> bool) -> bool {
            for _ in 0..max_ticks {
                self.step();
                if done(self) {
                    return true;
                }
            }
            false
        }

        fn start(&mut self) {
            self.escort.start(SUBJECT, 2, &self.agent, self.now).unwrap();
        }

        /// Deliver an arrival for the current move, as navigation would
        fn arrive(&mut self) -> bool {
            let (request, target) = {
                let session = self.escort.session().unwrap();
                (session.move_request.unwrap(), session.move_target.unwrap())
            };
            let mut services = Services {
                nav: &mut self.nav,
                doors: &mut self.doors,
                intake: &self.desk,
                cells: &mut self.cells,
                messages: &mut self.messages,
                search: &mut self.search,
            };
            self.escort
                .handle_arrival(request, target, false, &self.agent, self.now, &mut services)
        }

        fn walking_to_holding(&self) -> bool {
            self.escort.state() == EscortState::EscortToHolding
                && self.escort.session().is_some_and(|s| s.move_request.is_some())
        }

        fn stations_reached(&self) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, IntakeEvent::StationReached { .. }))
                .count()
        }
    }

    #[test]
    fn test_arrival_ignored_while_door_operation_pending() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.run_until(10, |r| r.walking_to_holding()));

        let session = rig.escort.session.as_mut().unwrap();
        session.last_door_completed_at = None;
        session.pending_door = Some(PendingDoorOp {
            door: DoorId(30),
            command: DoorCommand::Open,
            op: None,
            fallback_used: false,
        });
        assert!(!rig.arrive());
        assert_eq!(rig.escort.state(), EscortState::EscortToHolding);
        assert!(rig.escort.session().unwrap().processed.is_empty());

        rig.escort.session.as_mut().unwrap().pending_door = None;
        assert!(rig.arrive());
        assert_ne!(rig.escort.state(), EscortState::EscortToHolding);
    }

    #[test]
    fn test_arrival_ignored_inside_door_cooldown() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.run_until(10, |r| r.walking_to_holding()));
        let cooldown = rig.escort.config.arrival_cooldown as f64;

        let session = rig.escort.session.as_mut().unwrap();
        session.pending_door = None;
        session.last_door_completed_at = Some(rig.now - cooldown * 0.5);
        assert!(!rig.arrive());
        assert_eq!(rig.escort.state(), EscortState::EscortToHolding);

        rig.escort.session.as_mut().unwrap().last_door_completed_at = Some(rig.now - cooldown - 0.1);
        assert!(rig.arrive());
        assert_ne!(rig.escort.state(), EscortState::EscortToHolding);
    }

    #[test]
    fn test_fetch_delay_stays_within_bounds() {
        for seed in 0..20 {
            let mut rig = Rig::new();
            rig.escort = IntakeEscort::new(
                AgentId(1),
                EscortConfig {
                    seed: Some(seed),
                    ..EscortConfig::default()
                },
            );
            rig.start();
            let fetch_at = rig.escort.session().unwrap().fetch_at;
            assert!((5.0..=10.0).contains(&fetch_at), "seed {seed}: {fetch_at}");

            assert!(rig.run_until(120, |r| r.escort.state() != EscortState::DelayBeforeFetch));
            assert!(rig.now >= fetch_at, "left the delay at {} before {}", rig.now, fetch_at);
            assert!(rig.now < fetch_at + 0.2);
        }
    }

    #[test]
    fn test_busy_officer_rejects_start() {
        let mut rig = Rig::new();
        rig.start();
        assert_eq!(
            rig.escort.start(SubjectId(8), 1, &rig.agent, 0.0),
            Err(EscortError::OfficerBusy(AgentId(1)))
        );

        let mut rig = Rig::new();
        rig.agent
            .move_to(Vec3::new(5.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(rig.escort.start(SUBJECT, 2, &rig.agent, 0.0).is_err());
    }

    #[test]
    fn test_duplicate_arrival_processes_station_once() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.run_until(5, |r| r
            .escort
            .session()
            .is_some_and(|s| s.move_request.is_some())));
        assert_eq!(rig.escort.state(), EscortState::EscortToHolding);

        let session = rig.escort.session().unwrap().clone();
        let request = session.move_request.unwrap();
        let target = session.move_target.unwrap();
        let mut services = Services {
            nav: &mut rig.nav,
            doors: &mut rig.doors,
            intake: &rig.desk,
            cells: &mut rig.cells,
            messages: &mut rig.messages,
            search: &mut rig.search,
        };
        assert!(rig
            .escort
            .handle_arrival(request, target, false, &rig.agent, rig.now, &mut services));
        assert!(!rig
            .escort
            .handle_arrival(request, target, false, &rig.agent, rig.now, &mut services));

        rig.events.extend(rig.escort.drain_events());
        assert_eq!(rig.stations_reached(), 1);
        assert_eq!(rig.escort.state(), EscortState::OpeningHoldingDoor);
    }

    #[test]
    fn test_mismatched_arrivals_are_ignored() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.run_until(5, |r| r
            .escort
            .session()
            .is_some_and(|s| s.move_request.is_some())));
        let session = rig.escort.session().unwrap().clone();
        let request = session.move_request.unwrap();
        let target = session.move_target.unwrap();

        let mut services = Services {
            nav: &mut rig.nav,
            doors: &mut rig.doors,
            intake: &rig.desk,
            cells: &mut rig.cells,
            messages: &mut rig.messages,
            search: &mut rig.search,
        };
        // Stale request id
        assert!(!rig.escort.handle_arrival(
            MoveRequestId(request.0 + 10),
            target,
            false,
            &rig.agent,
            rig.now,
            &mut services
        ));
        // Wrong place
        assert!(!rig.escort.handle_arrival(
            request,
            target + Vec3::new(5.0, 0.0, 0.0),
            false,
            &rig.agent,
            rig.now,
            &mut services
        ));
        assert_eq!(rig.escort.state(), EscortState::EscortToHolding);
    }

    #[test]
    fn test_holding_door_opens_and_closes_after_exit() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.run_until(100, |r| r.escort.state() == EscortState::WaitingForPlayerExit));
        assert!(!rig.doors.is_closed(DoorId(12)));
        assert!(!rig.doors.is_locked(DoorId(12)));

        // Subject still inside: nothing happens
        rig.run_until(30, |_| false);
        assert_eq!(rig.escort.state(), EscortState::WaitingForPlayerExit);

        rig.subjects.insert(SUBJECT, Vec3::new(10.0, 0.0, 5.0));
        let left_at = rig.now;
        assert!(rig.run_until(40, |r| r.escort.state() == EscortState::ClosingHoldingDoor));
        assert!(rig.now - left_at >= 2.0 - 1e-6);

        assert!(rig.run_until(20, |r| r.escort.state() == EscortState::EscortToMugshot));
        assert!(rig.doors.is_closed(DoorId(12)));
        // Clearance delay holds the next move
        assert!(rig.escort.session().unwrap().move_request.is_none());
        assert!(rig.run_until(20, |r| r
            .escort
            .session()
            .is_some_and(|s| s.move_request.is_some())));
    }

    #[test]
    fn test_soft_timeout_forces_arrival() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.run_until(5, |r| r
            .escort
            .session()
            .is_some_and(|s| s.move_request.is_some())));
        rig.nav.set_blocked(AgentId(1), true);

        assert!(!rig.run_until(290, |r| r.escort.state() != EscortState::EscortToHolding));
        assert!(rig.run_until(20, |r| r.escort.state() == EscortState::OpeningHoldingDoor));
        assert_eq!(rig.stations_reached(), 1);
        assert_eq!(rig.agent.state(), AgentState::Idle);
    }

    #[test]
    fn test_jammed_door_falls_back_to_force() {
        let mut rig = Rig::new();
        rig.doors.set_fault(DoorId(12), DoorFault::Jammed);
        rig.start();
        assert!(rig.run_until(100, |r| r.escort.state() == EscortState::WaitingForPlayerExit));
        assert!(!rig.doors.is_closed(DoorId(12)));
    }

    #[test]
    fn test_dead_door_still_proceeds() {
        let mut rig = Rig::new();
        rig.doors.set_fault(DoorId(12), DoorFault::Dead);
        rig.start();
        assert!(rig.run_until(100, |r| r.escort.state() == EscortState::WaitingForPlayerExit));
        assert!(rig.doors.is_closed(DoorId(12)));
    }

    #[test]
    fn test_busy_door_is_retried() {
        let mut rig = Rig::new();
        rig.doors = DoorSystem::from_layout(&rig.layout, 5.0);
        rig.start();
        assert!(rig.run_until(5, |r| r
            .escort
            .session()
            .is_some_and(|s| s.move_request.is_some())));

        // Another caller still holds the door when the officer arrives
        rig.doors.trigger("holding_2", DoorCommand::Open).unwrap();
        assert!(rig.run_until(60, |r| r.escort.state() == EscortState::OpeningHoldingDoor));
        let session = rig.escort.session().unwrap();
        assert!(session.door_active());
        assert_eq!(session.pending_door.as_ref().unwrap().op, None);

        assert!(rig.run_until(150, |r| r.escort.state() == EscortState::WaitingForPlayerExit));
        assert!(!rig.doors.is_closed(DoorId(12)));
    }

    #[test]
    fn test_stop_returns_to_post_and_relocks() {
        let mut rig = Rig::new();
        rig.start();
        assert!(rig.run_until(100, |r| r.escort.state() == EscortState::WaitingForPlayerExit));
        assert!(!rig.doors.is_locked(DoorId(12)));

        assert!(rig.escort.stop(rig.now));
        assert_eq!(rig.escort.state(), EscortState::ReturningToPost);
        assert!(!rig.escort.stop(rig.now));

        assert!(rig.run_until(200, |r| !r.escort.is_active()));
        assert!(rig.doors.is_closed(DoorId(12)));
        assert!(rig.doors.is_locked(DoorId(12)));
        assert!(rig.events.contains(&IntakeEvent::Completed {
            officer: AgentId(1),
            subject: SUBJECT,
            session: match &rig.events[0] {
                IntakeEvent::Started { session, .. } => *session,
                _ => unreachable!(),
            },
            aborted: true,
        }));
        assert!(rig.agent.position().distance(rig.layout.post) < 1.0);
    }

    #[test]
    fn test_no_free_cell_aborts() {
        let mut rig = Rig::new();
        rig.cells = CellRegistry::new(Vec::new());
        rig.desk.complete(SUBJECT, crate::services::IntakeStep::Mugshot);
        rig.desk.complete(SUBJECT, crate::services::IntakeStep::Fingerprint);
        rig.desk.complete(SUBJECT, crate::services::IntakeStep::GearPickup);
        rig.start();
        assert!(rig.run_until(100, |r| r.escort.state() == EscortState::WaitingForPlayerExit));
        rig.subjects.insert(SUBJECT, Vec3::new(10.0, 0.0, 5.0));

        assert!(rig.run_until(600, |r| r.escort.state() == EscortState::ReturningToPost));
        let history = &rig.escort.session().unwrap().history;
        assert_eq!(history[history.len() - 2], EscortState::WaitingForStorage);
        assert!(rig.escort.session().unwrap().aborted);
    }

    #[test]
    fn test_announcements_are_shown() {
        let mut rig = Rig::new();
        rig.start();
        rig.run_until(5, |r| r.escort.session().is_some_and(|s| s.move_request.is_some()));
        assert_eq!(
            rig.messages.texts_for(AgentId(1)),
            vec!["Stand back from the door."]
        );
        assert!(rig.nav.has_agent(AgentId(1)));
    }
}
