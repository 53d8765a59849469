//! Distance-driven patrol population
//!
//! Each patrol assignment is staffed only while the tracked subject is near
//! its route. Spawning happens below `spawn_threshold`; a spawned officer is
//! only removed once the subject is beyond `despawn_threshold`, which must be
//! strictly larger so the two cannot oscillate. A single supervisor is kept
//! alive while the subject is eligible.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use warden_core::{AgentId, AssignmentId, RetryStatus, StartupRetry};
use warden_world::{PatrolAssignment, PatrolRoute, RouteRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Spawn an assignment's officer when the subject is closer than this
    pub spawn_threshold: f32,
    /// Despawn it again once the subject is further than this
    pub despawn_threshold: f32,
    /// Seconds between checks for the tracked subject at startup
    pub startup_retry_interval: f32,
    pub startup_max_attempts: u32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            spawn_threshold: 30.0,
            despawn_threshold: 45.0,
            startup_retry_interval: 1.0,
            startup_max_attempts: 10,
        }
    }
}

impl PopulationConfig {
    pub fn validate(&self) -> Result<(), PopulationError> {
        if self.spawn_threshold < 0.0 || self.despawn_threshold <= self.spawn_threshold {
            return Err(PopulationError::InvalidThresholds {
                spawn: self.spawn_threshold,
                despawn: self.despawn_threshold,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PopulationError {
    #[error("despawn threshold {despawn} must exceed spawn threshold {spawn}")]
    InvalidThresholds { spawn: f32, despawn: f32 },
}

/// One patrol assignment and the officer staffing it, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRecord {
    pub assignment: AssignmentId,
    pub officer: Option<AgentId>,
}

impl SpawnRecord {
    pub fn spawned(&self) -> bool {
        self.officer.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopulationEvent {
    PatrolSpawned {
        assignment: AssignmentId,
        officer: AgentId,
        distance: f32,
    },
    PatrolDespawned {
        assignment: AssignmentId,
        officer: AgentId,
        distance: Option<f32>,
    },
    SupervisorSpawned {
        officer: AgentId,
    },
    SupervisorDespawned {
        officer: AgentId,
    },
    /// The tracked subject never showed up; population control is off
    Disabled,
}

/// Creates and removes officers on behalf of the population manager
pub trait OfficerSpawner {
    fn spawn_patrol(&mut self, assignment: &PatrolAssignment, route: &PatrolRoute) -> Option<AgentId>;
    fn spawn_supervisor(&mut self) -> Option<AgentId>;
    fn despawn(&mut self, officer: AgentId);
    fn is_alive(&self, officer: AgentId) -> bool;
}

pub struct PopulationManager {
    config: PopulationConfig,
    routes: RouteRegistry,
    records: BTreeMap<AssignmentId, SpawnRecord>,
    supervisor: Option<AgentId>,
    startup: StartupRetry,
    disabled: bool,
    events: Vec<PopulationEvent>,
}

impl PopulationManager {
    pub fn new(config: PopulationConfig, routes: RouteRegistry) -> Result<Self, PopulationError> {
        config.validate()?;
        let records = routes
            .assignments()
            .iter()
            .map(|a| {
                (
                    a.id,
                    SpawnRecord {
                        assignment: a.id,
                        officer: None,
                    },
                )
            })
            .collect();
        let startup = StartupRetry::new(
            "Tracked subject",
            config.startup_retry_interval as f64,
            config.startup_max_attempts,
        );
        Ok(Self {
            config,
            routes,
            records,
            supervisor: None,
            startup,
            disabled: false,
            events: Vec::new(),
        })
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn patrol_count(&self) -> usize {
        self.records.values().filter(|r| r.spawned()).count()
    }

    pub fn supervisor(&self) -> Option<AgentId> {
        self.supervisor
    }

    pub fn is_spawned(&self, assignment: AssignmentId) -> bool {
        self.records
            .get(&assignment)
            .map(|r| r.spawned())
            .unwrap_or(false)
    }

    pub fn records(&self) -> impl Iterator<Item = &SpawnRecord> {
        self.records.values()
    }

    /// Whether startup has finished and the manager is running
    pub fn is_active(&self) -> bool {
        !self.disabled && self.startup.status() == RetryStatus::Ready
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn drain_events(&mut self) -> Vec<PopulationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Per-tick update. `subject` is the tracked subject's position, if it is
    /// registered.
    pub fn update(
        &mut self,
        now: f64,
        subject: Option<Vec3>,
        eligible: bool,
        spawner: &mut dyn OfficerSpawner,
    ) {
        if self.disabled {
            return;
        }
        match self.startup.poll(now, || subject.is_some()) {
            RetryStatus::Pending => return,
            RetryStatus::Exhausted => {
                error!("Population manager disabled: no tracked subject");
                self.disabled = true;
                self.events.push(PopulationEvent::Disabled);
                return;
            }
            RetryStatus::Ready => {}
        }
        self.evaluate(subject, eligible, spawner);
    }

    /// Apply eligibility and hysteresis against the subject's position. Also
    /// called between ticks on region changes and significant movement.
    pub fn evaluate(&mut self, subject: Option<Vec3>, eligible: bool, spawner: &mut dyn OfficerSpawner) {
        if !self.is_active() {
            return;
        }
        self.clear_dead(spawner);

        let Some(position) = subject.filter(|_| eligible) else {
            self.despawn_all(spawner);
            return;
        };

        self.ensure_supervisor(spawner);

        let assignments: Vec<PatrolAssignment> = self.routes.assignments().to_vec();
        for assignment in &assignments {
            let Some(route) = self.routes.route(&assignment.route) else {
                warn!("{} references unknown route '{}'", assignment.id, assignment.route);
                continue;
            };
            let Some(distance) = route.distance_to(position) else {
                continue;
            };
            let record = self
                .records
                .entry(assignment.id)
                .or_insert_with(|| SpawnRecord {
                    assignment: assignment.id,
                    officer: None,
                });

            match record.officer {
                None if distance < self.config.spawn_threshold => {
                    if let Some(officer) = spawner.spawn_patrol(assignment, route) {
                        info!(
                            "Spawned {} for {} ('{}', subject {:.1}m away)",
                            officer, assignment.id, route.name, distance
                        );
                        record.officer = Some(officer);
                        self.events.push(PopulationEvent::PatrolSpawned {
                            assignment: assignment.id,
                            officer,
                            distance,
                        });
                    } else {
                        warn!("Could not spawn officer for {}", assignment.id);
                    }
                }
                Some(officer) if distance > self.config.despawn_threshold => {
                    info!(
                        "Despawning {} from {} (subject {:.1}m away)",
                        officer, assignment.id, distance
                    );
                    spawner.despawn(officer);
                    record.officer = None;
                    self.events.push(PopulationEvent::PatrolDespawned {
                        assignment: assignment.id,
                        officer,
                        distance: Some(distance),
                    });
                }
                _ => {}
            }
        }
    }

    /// Release officers that stopped working, so each spawned record maps to
    /// exactly one live officer
    fn clear_dead(&mut self, spawner: &mut dyn OfficerSpawner) {
        for record in self.records.values_mut() {
            if let Some(officer) = record.officer {
                if !spawner.is_alive(officer) {
                    warn!("{} for {} is gone, clearing record", officer, record.assignment);
                    spawner.despawn(officer);
                    record.officer = None;
                }
            }
        }
        if let Some(officer) = self.supervisor {
            if !spawner.is_alive(officer) {
                warn!("Supervisor {} is gone, clearing", officer);
                spawner.despawn(officer);
                self.supervisor = None;
            }
        }
    }

    fn ensure_supervisor(&mut self, spawner: &mut dyn OfficerSpawner) {
        if self.supervisor.is_some() {
            return;
        }
        if let Some(officer) = spawner.spawn_supervisor() {
            info!("Spawned supervisor {}", officer);
            self.supervisor = Some(officer);
            self.events.push(PopulationEvent::SupervisorSpawned { officer });
        }
    }

    fn despawn_all(&mut self, spawner: &mut dyn OfficerSpawner) {
        for record in self.records.values_mut() {
            if let Some(officer) = record.officer.take() {
                spawner.despawn(officer);
                self.events.push(PopulationEvent::PatrolDespawned {
                    assignment: record.assignment,
                    officer,
                    distance: None,
                });
            }
        }
        if let Some(officer) = self.supervisor.take() {
            spawner.despawn(officer);
            self.events.push(PopulationEvent::SupervisorDespawned { officer });
        }
    }
}
