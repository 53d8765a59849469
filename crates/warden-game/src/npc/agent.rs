//! Coarse per-agent lifecycle shared by every officer
//!
//! An [`Agent`] owns its coarse [`AgentState`], a FIFO of deferred actions, and
//! stuck detection. Movement itself is delegated to the [`NavigationService`];
//! the agent only decides when to start, stop, pause and reissue paths.

use std::collections::VecDeque;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use warden_core::{AgentId, MoveRequestId, SubjectId};

use crate::services::NavigationService;

/// Coarse movement/lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    Moving,
    Interacting,
    Waiting,
    Working,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    StateChanged {
        agent: AgentId,
        from: AgentState,
        to: AgentState,
    },
    /// Fired once per move request, carrying the request's correlation id
    DestinationReached {
        agent: AgentId,
        request: MoveRequestId,
        destination: Vec3,
    },
    Stuck {
        agent: AgentId,
        position: Vec3,
    },
    AttackedBySubject {
        agent: AgentId,
        subject: SubjectId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Default straight-line arrival tolerance
    pub arrival_tolerance: f32,
    /// Per-tick displacement below which the agent counts as not moving
    pub stuck_epsilon: f32,
    /// Seconds without movement before a Stuck event
    pub stuck_threshold: f32,
    /// Seconds spent in Error before recovering to Idle
    pub error_recovery_time: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            arrival_tolerance: 0.6,
            stuck_epsilon: 0.01,
            stuck_threshold: 3.0,
            error_recovery_time: 5.0,
        }
    }
}

/// Work queued for the agent, run one per tick while Idle
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    MoveTo { destination: Vec3, tolerance: f32 },
    Wait { duration: f32 },
    Work { duration: f32 },
    Interact { duration: f32 },
    Warp { position: Vec3 },
}

pub struct Agent {
    id: AgentId,
    position: Vec3,
    previous_position: Vec3,
    last_good_position: Vec3,
    destination: Option<Vec3>,
    tolerance: f32,
    state: AgentState,
    state_entered_at: f64,
    stuck_time: f32,
    busy_until: f64,
    queue: VecDeque<DeferredAction>,
    move_request: Option<MoveRequestId>,
    next_request: u64,
    nav_paused: bool,
    enabled: bool,
    config: AgentConfig,
    events: Vec<AgentEvent>,
}

impl Agent {
    /// Create an agent without registering it with navigation
    pub fn new(id: AgentId, position: Vec3, config: AgentConfig) -> Self {
        Self {
            id,
            position,
            previous_position: position,
            last_good_position: position,
            destination: None,
            tolerance: config.arrival_tolerance,
            state: AgentState::Idle,
            state_entered_at: 0.0,
            stuck_time: 0.0,
            busy_until: 0.0,
            queue: VecDeque::new(),
            move_request: None,
            next_request: 1,
            nav_paused: false,
            enabled: true,
            config,
            events: Vec::new(),
        }
    }

    /// Create an agent and register it with navigation
    pub fn spawn(
        id: AgentId,
        position: Vec3,
        speed: f32,
        config: AgentConfig,
        nav: &mut dyn NavigationService,
    ) -> Self {
        nav.add_agent(id, position, speed);
        Self::new(id, position, config)
    }

    pub fn despawn(self, nav: &mut dyn NavigationService) {
        nav.remove_agent(self.id);
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    pub fn last_good_position(&self) -> Vec3 {
        self.last_good_position
    }

    pub fn state_entered_at(&self) -> f64 {
        self.state_entered_at
    }

    /// Correlation id of the most recent move request still in effect
    pub fn move_request(&self) -> Option<MoveRequestId> {
        self.move_request
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_navigation_paused(&self) -> bool {
        self.nav_paused
    }

    pub fn queued_actions(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(&mut self, action: DeferredAction) {
        self.queue.push_back(action);
    }

    /// Drop every queued action that has not started yet
    pub fn clear_actions(&mut self) {
        self.queue.clear();
    }

    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Switch state: exit the old state, stamp the time, enter the new one,
    /// then fire StateChanged. Re-entering the current state does nothing.
    pub fn change_state(&mut self, new_state: AgentState, now: f64) {
        if new_state == self.state {
            return;
        }
        let old = self.state;
        self.on_exit(old);
        self.state = new_state;
        self.state_entered_at = now;
        self.on_enter(new_state);
        debug!("{} {:?} -> {:?}", self.id, old, new_state);
        self.events.push(AgentEvent::StateChanged {
            agent: self.id,
            from: old,
            to: new_state,
        });
    }

    fn on_exit(&mut self, state: AgentState) {
        if state == AgentState::Moving {
            self.stuck_time = 0.0;
            self.nav_paused = false;
        }
    }

    fn on_enter(&mut self, state: AgentState) {
        match state {
            AgentState::Idle | AgentState::Error => self.busy_until = 0.0,
            AgentState::Moving => self.stuck_time = 0.0,
            _ => {}
        }
    }

    /// Path toward `destination`. Returns the request's correlation id, or
    /// `None` if the agent is disabled or navigation refused (the agent then
    /// enters Error).
    pub fn move_to(
        &mut self,
        destination: Vec3,
        tolerance: f32,
        now: f64,
        nav: &mut dyn NavigationService,
    ) -> Option<MoveRequestId> {
        if !self.enabled {
            return None;
        }
        if !nav.set_destination(self.id, destination) {
            self.fail("navigation refused destination", now, nav);
            return None;
        }

        let request = MoveRequestId(self.next_request);
        self.next_request += 1;
        self.destination = Some(destination);
        self.tolerance = tolerance.max(0.0);
        self.move_request = Some(request);
        self.nav_paused = false;
        self.stuck_time = 0.0;
        self.change_state(AgentState::Moving, now);
        Some(request)
    }

    /// Navigation reports arrival, or the agent is within tolerance in a
    /// straight line.
    pub fn has_reached_destination(&self, nav: &dyn NavigationService) -> bool {
        let Some(destination) = self.destination else {
            return false;
        };
        let nav_arrived = !nav.path_pending(self.id)
            && nav.remaining_distance(self.id) <= nav.stopping_distance(self.id);
        nav_arrived || self.position.distance(destination) < self.tolerance
    }

    /// Drop the current path and go Idle
    pub fn stop(&mut self, now: f64, nav: &mut dyn NavigationService) {
        nav.reset_path(self.id);
        self.destination = None;
        self.move_request = None;
        self.nav_paused = false;
        if self.state != AgentState::Error {
            self.change_state(AgentState::Idle, now);
        }
    }

    pub fn fail(&mut self, reason: &str, now: f64, nav: &mut dyn NavigationService) {
        error!("{} failed: {}", self.id, reason);
        nav.reset_path(self.id);
        self.destination = None;
        self.move_request = None;
        self.change_state(AgentState::Error, now);
    }

    /// Halt in place while keeping the destination. Arrival and stuck
    /// detection are suspended until [`Agent::resume_navigation`].
    pub fn pause_navigation(&mut self, nav: &mut dyn NavigationService) -> bool {
        if self.state != AgentState::Moving || self.nav_paused {
            return false;
        }
        nav.reset_path(self.id);
        self.nav_paused = true;
        true
    }

    /// Resume toward the destination held before the pause
    pub fn resume_navigation(&mut self, now: f64, nav: &mut dyn NavigationService) -> bool {
        if !self.nav_paused {
            return false;
        }
        self.nav_paused = false;
        self.stuck_time = 0.0;
        let Some(destination) = self.destination else {
            return false;
        };
        if !nav.set_destination(self.id, destination) {
            self.fail("navigation refused resumed destination", now, nav);
            return false;
        }
        true
    }

    /// Send the current destination to navigation again
    pub fn reissue_destination(&mut self, nav: &mut dyn NavigationService) -> bool {
        if self.state != AgentState::Moving || self.nav_paused {
            return false;
        }
        match self.destination {
            Some(destination) => nav.set_destination(self.id, destination),
            None => false,
        }
    }

    pub fn notify_attacked(&mut self, subject: SubjectId) {
        warn!("{} attacked by {}", self.id, subject);
        self.events.push(AgentEvent::AttackedBySubject {
            agent: self.id,
            subject,
        });
    }

    /// Run the handler for the current state
    pub fn tick(&mut self, now: f64, delta: f32, nav: &mut dyn NavigationService) {
        if !self.enabled {
            return;
        }
        if !nav.has_agent(self.id) {
            error!("{} has no navigation component, disabling", self.id);
            self.enabled = false;
            return;
        }
        if let Some(position) = nav.position(self.id) {
            self.position = position;
        }

        match self.state {
            AgentState::Idle => self.handle_idle(now, nav),
            AgentState::Moving => self.handle_moving(now, delta, nav),
            AgentState::Waiting | AgentState::Working | AgentState::Interacting => {
                if now >= self.busy_until {
                    self.change_state(AgentState::Idle, now);
                }
            }
            AgentState::Error => {
                if now - self.state_entered_at >= self.config.error_recovery_time as f64 {
                    info!("{} recovered from error", self.id);
                    self.change_state(AgentState::Idle, now);
                }
            }
        }

        self.previous_position = self.position;
    }

    fn handle_idle(&mut self, now: f64, nav: &mut dyn NavigationService) {
        let Some(action) = self.queue.pop_front() else {
            return;
        };
        match action {
            DeferredAction::MoveTo {
                destination,
                tolerance,
            } => {
                self.move_to(destination, tolerance, now, nav);
            }
            DeferredAction::Wait { duration } => self.begin_timed(AgentState::Waiting, duration, now),
            DeferredAction::Work { duration } => self.begin_timed(AgentState::Working, duration, now),
            DeferredAction::Interact { duration } => {
                self.begin_timed(AgentState::Interacting, duration, now)
            }
            DeferredAction::Warp { position } => {
                if nav.warp(self.id, position) {
                    self.position = position;
                    self.previous_position = position;
                    self.last_good_position = position;
                } else {
                    warn!("{} could not warp to {:?}", self.id, position);
                }
            }
        }
    }

    fn begin_timed(&mut self, state: AgentState, duration: f32, now: f64) {
        self.change_state(state, now);
        self.busy_until = now + duration.max(0.0) as f64;
    }

    fn handle_moving(&mut self, now: f64, delta: f32, nav: &mut dyn NavigationService) {
        if self.nav_paused {
            return;
        }

        if self.has_reached_destination(nav) {
            let request = self.move_request;
            let destination = self.destination.take();
            nav.reset_path(self.id);
            if let (Some(request), Some(destination)) = (request, destination) {
                self.events.push(AgentEvent::DestinationReached {
                    agent: self.id,
                    request,
                    destination,
                });
            }
            self.change_state(AgentState::Idle, now);
            return;
        }

        let displacement = self.position.distance(self.previous_position);
        if displacement >= self.config.stuck_epsilon {
            self.stuck_time = 0.0;
            self.last_good_position = self.position;
            return;
        }

        self.stuck_time += delta;
        if self.stuck_time >= self.config.stuck_threshold {
            warn!("{} stuck at {:?}, reissuing destination", self.id, self.position);
            self.stuck_time = 0.0;
            self.events.push(AgentEvent::Stuck {
                agent: self.id,
                position: self.position,
            });
            if let Some(destination) = self.destination {
                nav.set_destination(self.id, destination);
            }
        }
    }
}
