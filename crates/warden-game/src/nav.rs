//! Straight-line navigation backend
//!
//! Moves agents directly toward their destination at a fixed speed, ignoring
//! geometry. Used by the dry-run binary and tests in place of a navmesh.

use std::collections::HashMap;

use glam::Vec3;
use warden_core::AgentId;

use crate::services::NavigationService;

#[derive(Debug, Clone)]
struct NavAgent {
    position: Vec3,
    destination: Option<Vec3>,
    pending: bool,
    speed: f32,
    velocity: Vec3,
    blocked: bool,
}

pub struct StraightLineNav {
    agents: HashMap<AgentId, NavAgent>,
    stopping_distance: f32,
}

impl StraightLineNav {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            stopping_distance: 0.1,
        }
    }

    pub fn with_stopping_distance(mut self, distance: f32) -> Self {
        self.stopping_distance = distance.max(0.0);
        self
    }

    /// Block an agent in place (it keeps its path but cannot move)
    pub fn set_blocked(&mut self, agent: AgentId, blocked: bool) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.blocked = blocked;
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Advance every agent. A fresh path resolves on the first update after
    /// it was requested; movement starts on the next one.
    pub fn update(&mut self, delta: f32) {
        let stopping = self.stopping_distance;
        for agent in self.agents.values_mut() {
            if agent.pending {
                agent.pending = false;
                continue;
            }
            let Some(dest) = agent.destination else {
                agent.velocity = Vec3::ZERO;
                continue;
            };
            if agent.blocked {
                agent.velocity = Vec3::ZERO;
                continue;
            }

            let to_target = dest - agent.position;
            let dist = to_target.length();
            if dist <= stopping {
                agent.velocity = Vec3::ZERO;
                agent.destination = None;
                continue;
            }

            let dir = to_target / dist;
            let step = (agent.speed * delta).min(dist);
            agent.velocity = dir * agent.speed;
            agent.position += dir * step;
        }
    }
}

impl Default for StraightLineNav {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationService for StraightLineNav {
    fn add_agent(&mut self, agent: AgentId, position: Vec3, speed: f32) {
        self.agents.insert(
            agent,
            NavAgent {
                position,
                destination: None,
                pending: false,
                speed,
                velocity: Vec3::ZERO,
                blocked: false,
            },
        );
    }

    fn remove_agent(&mut self, agent: AgentId) {
        self.agents.remove(&agent);
    }

    fn has_agent(&self, agent: AgentId) -> bool {
        self.agents.contains_key(&agent)
    }

    fn position(&self, agent: AgentId) -> Option<Vec3> {
        self.agents.get(&agent).map(|a| a.position)
    }

    fn set_destination(&mut self, agent: AgentId, destination: Vec3) -> bool {
        match self.agents.get_mut(&agent) {
            Some(a) => {
                a.destination = Some(destination);
                a.pending = true;
                true
            }
            None => false,
        }
    }

    fn reset_path(&mut self, agent: AgentId) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.destination = None;
            a.pending = false;
            a.velocity = Vec3::ZERO;
        }
    }

    fn remaining_distance(&self, agent: AgentId) -> f32 {
        self.agents
            .get(&agent)
            .and_then(|a| a.destination.map(|d| d.distance(a.position)))
            .unwrap_or(0.0)
    }

    fn path_pending(&self, agent: AgentId) -> bool {
        self.agents.get(&agent).map(|a| a.pending).unwrap_or(false)
    }

    fn velocity(&self, agent: AgentId) -> Vec3 {
        self.agents
            .get(&agent)
            .map(|a| a.velocity)
            .unwrap_or(Vec3::ZERO)
    }

    fn warp(&mut self, agent: AgentId, position: Vec3) -> bool {
        match self.agents.get_mut(&agent) {
            Some(a) => {
                a.position = position;
                a.destination = None;
                a.pending = false;
                a.velocity = Vec3::ZERO;
                true
            }
            None => false,
        }
    }

    fn set_speed(&mut self, agent: AgentId, speed: f32) {
        if let Some(a) = self.agents.get_mut(&agent) {
            a.speed = speed.max(0.0);
        }
    }

    fn stopping_distance(&self, _agent: AgentId) -> f32 {
        self.stopping_distance
    }
}
