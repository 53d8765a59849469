//! Periodic contraband-search eligibility polling

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use warden_core::{AgentId, SubjectId};

use crate::services::SearchProcedure;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Seconds between eligibility polls
    pub poll_interval: f32,
    /// Subjects further away than this are not considered
    pub radius: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            poll_interval: 2.0,
            radius: 3.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchPoller {
    config: SearchConfig,
    next_poll_at: f64,
}

impl SearchPoller {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            next_poll_at: 0.0,
        }
    }

    /// Nearest eligible subject within the search radius, checked at most
    /// once per poll interval
    pub fn poll(
        &mut self,
        officer: AgentId,
        position: Vec3,
        now: f64,
        subjects: &BTreeMap<SubjectId, Vec3>,
        search: &dyn SearchProcedure,
    ) -> Option<SubjectId> {
        if now < self.next_poll_at {
            return None;
        }
        self.next_poll_at = now + self.config.poll_interval as f64;

        subjects
            .iter()
            .map(|(id, p)| (*id, p.distance(position)))
            .filter(|(_, d)| *d <= self.config.radius)
            .filter(|(id, _)| search.is_eligible(officer, *id))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}
