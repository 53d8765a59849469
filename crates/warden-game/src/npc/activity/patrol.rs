//! Round-robin waypoint patrol

use glam::Vec3;
use tracing::debug;
use warden_world::PatrolRoute;

use crate::npc::agent::{Agent, AgentState, DeferredAction};

/// Feeds an agent's action queue with one waypoint leg at a time: a move to
/// the next waypoint followed by a dwell there.
#[derive(Debug, Clone)]
pub struct PatrolRunner {
    route: PatrolRoute,
    next: usize,
    last_issued: Option<usize>,
    legs: u64,
}

impl PatrolRunner {
    /// Returns `None` for a route with no waypoints
    pub fn new(route: PatrolRoute) -> Option<Self> {
        if route.waypoints.is_empty() {
            return None;
        }
        Some(Self {
            route,
            next: 0,
            last_issued: None,
            legs: 0,
        })
    }

    pub fn route(&self) -> &PatrolRoute {
        &self.route
    }

    /// Waypoint the next leg heads for
    pub fn next_waypoint(&self) -> Vec3 {
        self.route.waypoints[self.next]
    }

    /// Legs issued so far
    pub fn legs(&self) -> u64 {
        self.legs
    }

    /// Forget the current leg once its move is done. The dwell is the last
    /// queued action, so an empty queue means the waypoint was reached.
    pub fn observe(&mut self, agent: &Agent) {
        if agent.queued_actions() == 0 {
            self.last_issued = None;
        }
    }

    /// Queue the next leg once the agent is idle with nothing queued
    pub fn tick(&mut self, agent: &mut Agent, tolerance: f32) {
        self.observe(agent);
        if agent.state() != AgentState::Idle || agent.queued_actions() > 0 {
            return;
        }

        let index = self.next;
        let destination = self.route.waypoints[index];
        agent.enqueue(DeferredAction::MoveTo {
            destination,
            tolerance,
        });
        agent.enqueue(DeferredAction::Wait {
            duration: self.route.dwell_time,
        });
        debug!(
            "{} patrol leg to waypoint {} of '{}'",
            agent.id(),
            index,
            self.route.name
        );

        self.last_issued = Some(index);
        self.next = (index + 1) % self.route.waypoints.len();
        self.legs += 1;
    }

    /// Walk the interrupted leg again after the patrol was suspended, unless
    /// its waypoint had already been reached
    pub fn resume(&mut self) {
        if let Some(index) = self.last_issued.take() {
            self.next = index;
        }
    }
}
