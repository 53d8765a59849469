//! Door negotiation while moving
//!
//! Every `scan_interval` the negotiator probes ahead of a moving agent for a
//! closed door. When one is within `pause_distance` it halts the agent,
//! requests the door open and waits until the request completes, the door is
//! seen open, or `max_wait` runs out. Then it resumes toward the original
//! destination. A separate, coarser check reissues the destination when the
//! agent stops closing the distance to it.

use std::collections::HashSet;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_core::{point_segment_distance, AgentId, DoorId, DoorOpId, MoveRequestId};

use crate::npc::agent::{Agent, AgentState};
use crate::services::{DoorCommand, DoorError, DoorEvent, DoorSubsystem, NavigationService};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorNavConfig {
    pub scan_interval: f32,
    /// Length of the probe cast ahead of the agent
    pub probe_range: f32,
    /// Maximum distance from the probe for a door to count as obstructing
    pub detect_radius: f32,
    /// Distance at which the agent halts in front of a detected door
    pub pause_distance: f32,
    /// Longest the agent waits for a door before moving on anyway
    pub max_wait: f32,
    pub progress_check_interval: f32,
    /// Distance the agent must gain on its destination per progress check
    pub min_progress: f32,
}

impl Default for DoorNavConfig {
    fn default() -> Self {
        Self {
            scan_interval: 0.25,
            probe_range: 4.0,
            detect_radius: 1.5,
            pause_distance: 2.5,
            max_wait: 6.0,
            progress_check_interval: 4.0,
            min_progress: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DoorNavEvent {
    /// An open request for `door` was accepted. The door may finish opening
    /// after the agent has stopped waiting for it.
    DoorRequested {
        agent: AgentId,
        door: DoorId,
        was_locked: bool,
    },
    DoorPassed {
        agent: AgentId,
        door: DoorId,
        /// Whether the door was locked before the agent opened it
        was_locked: bool,
    },
    DoorWaitTimedOut {
        agent: AgentId,
        door: DoorId,
    },
    ProgressStalled {
        agent: AgentId,
    },
}

#[derive(Debug, Clone)]
enum Phase {
    Scanning,
    Waiting {
        door: DoorId,
        op: Option<DoorOpId>,
        since: f64,
        resolved: bool,
        was_locked: bool,
    },
}

pub struct DoorNavigator {
    config: DoorNavConfig,
    phase: Phase,
    next_scan_at: f64,
    detected: HashSet<DoorId>,
    excluded: HashSet<DoorId>,
    seen_request: Option<MoveRequestId>,
    progress_anchor: Option<(f64, f32)>,
    events: Vec<DoorNavEvent>,
}

impl DoorNavigator {
    pub fn new(config: DoorNavConfig) -> Self {
        Self {
            config,
            phase: Phase::Scanning,
            next_scan_at: 0.0,
            detected: HashSet::new(),
            excluded: HashSet::new(),
            seen_request: None,
            progress_anchor: None,
            events: Vec::new(),
        }
    }

    /// Doors handled by someone else (the escort orchestrator)
    pub fn set_excluded(&mut self, doors: impl IntoIterator<Item = DoorId>) {
        self.excluded = doors.into_iter().collect();
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.phase, Phase::Waiting { .. })
    }

    /// Door the agent is currently halted for
    pub fn waiting_for(&self) -> Option<DoorId> {
        match self.phase {
            Phase::Waiting { door, .. } => Some(door),
            Phase::Scanning => None,
        }
    }

    pub fn drain_events(&mut self) -> Vec<DoorNavEvent> {
        std::mem::take(&mut self.events)
    }

    /// Match a door completion against the pending request
    pub fn handle_door_event(&mut self, event: &DoorEvent) {
        if let Phase::Waiting {
            op: Some(op),
            resolved,
            ..
        } = &mut self.phase
        {
            if event.op() == *op {
                if let DoorEvent::Failed { reason, .. } = event {
                    warn!("Door {} failed to open for negotiation: {}", event.door(), reason);
                }
                *resolved = true;
            }
        }
    }

    pub fn update(
        &mut self,
        agent: &mut Agent,
        now: f64,
        nav: &mut dyn NavigationService,
        doors: &mut dyn DoorSubsystem,
    ) {
        if agent.move_request() != self.seen_request {
            self.seen_request = agent.move_request();
            self.detected.clear();
            self.progress_anchor = None;
        }

        match self.phase.clone() {
            Phase::Waiting {
                door,
                op,
                since,
                resolved,
                was_locked,
            } => {
                if agent.state() != AgentState::Moving {
                    // Someone else stopped the agent; drop the wait.
                    self.phase = Phase::Scanning;
                    return;
                }
                let open = !doors.is_closed(door);
                if resolved || open {
                    debug!("{} passing {}", agent.id(), door);
                    self.events.push(DoorNavEvent::DoorPassed {
                        agent: agent.id(),
                        door,
                        was_locked,
                    });
                    self.resume(agent, now, nav);
                } else if now - since >= self.config.max_wait as f64 {
                    warn!("{} gave up waiting for {} ({:?})", agent.id(), door, op);
                    self.events.push(DoorNavEvent::DoorWaitTimedOut {
                        agent: agent.id(),
                        door,
                    });
                    self.resume(agent, now, nav);
                } else if op.is_none() {
                    // Busy elsewhere: keep watching, but try to claim it again
                    if let Ok(op) = Self::request_open(door, doors) {
                        self.events.push(DoorNavEvent::DoorRequested {
                            agent: agent.id(),
                            door,
                            was_locked,
                        });
                        self.phase = Phase::Waiting {
                            door,
                            op: Some(op),
                            since,
                            resolved: false,
                            was_locked,
                        };
                    }
                }
            }
            Phase::Scanning => {
                if agent.state() != AgentState::Moving || agent.is_navigation_paused() {
                    self.progress_anchor = None;
                    return;
                }
                if now >= self.next_scan_at {
                    self.next_scan_at = now + self.config.scan_interval as f64;
                    self.scan(agent, now, nav, doors);
                }
                if !self.is_waiting() {
                    self.check_progress(agent, now, nav);
                }
            }
        }
    }

    fn resume(&mut self, agent: &mut Agent, now: f64, nav: &mut dyn NavigationService) {
        self.phase = Phase::Scanning;
        self.progress_anchor = None;
        agent.resume_navigation(now, nav);
    }

    fn request_open(door: DoorId, doors: &mut dyn DoorSubsystem) -> Result<DoorOpId, DoorError> {
        match doors.trigger_name(door) {
            Some(name) => doors.trigger(&name, DoorCommand::Open),
            None => doors.request(door, DoorCommand::Open),
        }
    }

    fn scan(
        &mut self,
        agent: &mut Agent,
        now: f64,
        nav: &mut dyn NavigationService,
        doors: &mut dyn DoorSubsystem,
    ) {
        let position = agent.position();
        let velocity = nav.velocity(agent.id());
        let direction = if velocity.length_squared() > 0.0025 {
            velocity.normalize()
        } else {
            match agent.destination() {
                Some(dest) => (dest - position).normalize_or_zero(),
                None => Vec3::ZERO,
            }
        };
        if direction == Vec3::ZERO {
            return;
        }

        let probe_end = position + direction * self.config.probe_range;
        let reach = self.config.probe_range + self.config.detect_radius;
        let nearest = doors
            .doors_within(position, reach)
            .into_iter()
            .filter(|d| !self.detected.contains(d) && !self.excluded.contains(d))
            .filter(|d| doors.is_closed(*d))
            .filter_map(|d| doors.door_position(d).map(|p| (d, p)))
            .filter(|(_, p)| {
                point_segment_distance(*p, position, probe_end) <= self.config.detect_radius
            })
            .map(|(d, p)| (d, p.distance(position)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        let Some((door, distance)) = nearest else {
            return;
        };
        if distance > self.config.pause_distance {
            return;
        }

        self.detected.insert(door);
        let was_locked = doors.is_locked(door);
        agent.pause_navigation(nav);
        let op = match Self::request_open(door, doors) {
            Ok(op) => {
                self.events.push(DoorNavEvent::DoorRequested {
                    agent: agent.id(),
                    door,
                    was_locked,
                });
                Some(op)
            }
            Err(DoorError::Busy(_)) => None,
            Err(e) => {
                warn!("{} cannot open {}: {}", agent.id(), door, e);
                None
            }
        };
        info!("{} halted for {}", agent.id(), door);
        self.phase = Phase::Waiting {
            door,
            op,
            since: now,
            resolved: false,
            was_locked,
        };
    }

    fn check_progress(&mut self, agent: &mut Agent, now: f64, nav: &mut dyn NavigationService) {
        let Some(destination) = agent.destination() else {
            return;
        };
        let remaining = agent.position().distance(destination);
        let Some((checked_at, anchor)) = self.progress_anchor else {
            self.progress_anchor = Some((now, remaining));
            return;
        };
        if now - checked_at < self.config.progress_check_interval as f64 {
            return;
        }
        if anchor - remaining < self.config.min_progress {
            warn!("{} made no progress toward {:?}", agent.id(), destination);
            self.events.push(DoorNavEvent::ProgressStalled { agent: agent.id() });
            agent.reissue_destination(nav);
        }
        self.progress_anchor = Some((now, remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doors::{DoorFault, DoorSystem};
    use crate::nav::StraightLineNav;
    use crate::npc::agent::AgentConfig;

    struct Rig {
        agent: Agent,
        nav: StraightLineNav,
        doors: DoorSystem,
        negotiator: DoorNavigator,
        now: f64,
        events: Vec<DoorNavEvent>,
    }

    impl Rig {
        fn new(operation_time: f32) -> Self {
            let mut nav = StraightLineNav::new();
            let agent = Agent::spawn(AgentId(1), Vec3::ZERO, 2.0, AgentConfig::default(), &mut nav);
            let mut doors = DoorSystem::new(operation_time);
            doors.add_door(DoorId(5), Vec3::new(6.0, 0.0, 0.0), None, false);
            Self {
                agent,
                nav,
                doors,
                negotiator: DoorNavigator::new(DoorNavConfig::default()),
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
            for event in self.doors.drain_events() {
                self.negotiator.handle_door_event(&event);
            }
            self.negotiator
                .update(&mut self.agent, self.now, &mut self.nav, &mut self.doors);
            self.events.extend(self.negotiator.drain_events());
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
    }

    #[test]
    fn test_pauses_requests_and_resumes() {
        let mut rig = Rig::new(1.0);
        let target = Vec3::new(12.0, 0.0, 0.0);
        rig.agent.move_to(target, 0.5, 0.0, &mut rig.nav);

        assert!(rig.run_until(100, |r| r.negotiator.is_waiting()));
        assert!(rig.agent.is_navigation_paused());
        assert!(rig.doors.is_busy(DoorId(5)));
        let halted_at = rig.agent.position();
        assert!(halted_at.distance(Vec3::new(6.0, 0.0, 0.0)) <= 2.5);

        assert!(rig.run_until(30, |r| !r.negotiator.is_waiting()));
        assert!(!rig.doors.is_closed(DoorId(5)));
        assert!(rig.events.contains(&DoorNavEvent::DoorPassed {
            agent: AgentId(1),
            door: DoorId(5),
            was_locked: false,
        }));

        assert!(rig.run_until(100, |r| r.agent.state() == AgentState::Idle));
        assert!(rig.agent.position().distance(target) < 0.5);
    }

    #[test]
    fn test_max_wait_bounds_the_pause() {
        // The door takes far longer than the negotiator is willing to wait
        let mut rig = Rig::new(100.0);
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(rig.run_until(100, |r| r.negotiator.is_waiting()));
        let started = rig.now;

        assert!(rig.run_until(100, |r| !r.negotiator.is_waiting()));
        let waited = rig.now - started;
        assert!(waited >= 6.0 - 1e-6 && waited < 6.5, "waited {}", waited);
        assert!(rig.events.contains(&DoorNavEvent::DoorWaitTimedOut {
            agent: AgentId(1),
            door: DoorId(5),
        }));
        assert!(!rig.agent.is_navigation_paused());
    }

    #[test]
    fn test_request_is_reported_before_the_door_opens() {
        let mut rig = Rig::new(100.0);
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(rig.run_until(100, |r| r.negotiator.is_waiting()));
        assert!(rig.doors.is_closed(DoorId(5)));
        assert_eq!(
            rig.events,
            vec![DoorNavEvent::DoorRequested {
                agent: AgentId(1),
                door: DoorId(5),
                was_locked: false,
            }]
        );

        // Abandoning the wait still leaves the request on record
        assert!(rig.run_until(100, |r| !r.negotiator.is_waiting()));
        assert_eq!(
            rig.events
                .iter()
                .filter(|e| matches!(e, DoorNavEvent::DoorRequested { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_busy_door_is_reported_once_claimed() {
        // Someone else holds the door when the agent reaches it
        let mut rig = Rig::new(5.0);
        rig.doors.request(DoorId(5), DoorCommand::Close).unwrap();
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(rig.run_until(100, |r| r.negotiator.is_waiting()));
        assert!(rig.events.is_empty());

        assert!(rig.run_until(60, |r| !r.events.is_empty()));
        assert!(matches!(
            rig.events[0],
            DoorNavEvent::DoorRequested { door: DoorId(5), .. }
        ));
        assert!(rig.negotiator.is_waiting());
        assert!(rig.doors.is_busy(DoorId(5)));
    }

    #[test]
    fn test_failed_request_ends_the_wait() {
        let mut rig = Rig::new(1.0);
        rig.doors.set_fault(DoorId(5), DoorFault::Dead);
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(rig.run_until(100, |r| r.negotiator.is_waiting()));
        assert!(rig.run_until(15, |r| !r.negotiator.is_waiting()));
        assert!(rig.doors.is_closed(DoorId(5)));
    }

    #[test]
    fn test_excluded_and_open_doors_are_ignored() {
        let mut rig = Rig::new(1.0);
        rig.negotiator.set_excluded([DoorId(5)]);
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(!rig.run_until(100, |r| r.negotiator.is_waiting()));
        assert_eq!(rig.agent.state(), AgentState::Idle);

        let mut rig = Rig::new(1.0);
        rig.doors.force(DoorId(5), DoorCommand::Open).unwrap();
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(!rig.run_until(100, |r| r.negotiator.is_waiting()));
    }

    #[test]
    fn test_new_move_request_resets_detection() {
        let mut rig = Rig::new(0.5);
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        assert!(rig.run_until(150, |r| r.agent.state() == AgentState::Idle));
        rig.doors.force(DoorId(5), DoorCommand::Close).unwrap();

        // Walk back through the same door under a new request
        let now = rig.now;
        rig.agent.move_to(Vec3::ZERO, 0.5, now, &mut rig.nav);
        assert!(rig.run_until(100, |r| r.negotiator.waiting_for() == Some(DoorId(5))));
    }

    #[test]
    fn test_progress_stall_reissues_destination() {
        let mut rig = Rig::new(1.0);
        rig.doors.force(DoorId(5), DoorCommand::Open).unwrap();
        rig.agent.move_to(Vec3::new(12.0, 0.0, 0.0), 0.5, 0.0, &mut rig.nav);
        rig.step();
        rig.step();
        rig.nav.set_blocked(AgentId(1), true);
        assert!(rig.run_until(60, |r| r
            .events
            .contains(&DoorNavEvent::ProgressStalled { agent: AgentId(1) })));
    }
}
