//! Per-escort bookkeeping

use std::collections::{BTreeMap, HashSet};

use glam::Vec3;
use warden_core::{AgentId, DoorId, DoorOpId, MoveRequestId, SessionId, SubjectId};

use super::state::{EscortState, Station};
use crate::services::DoorCommand;

/// A door operation the session is waiting on
#[derive(Debug, Clone)]
pub struct PendingDoorOp {
    pub door: DoorId,
    pub command: DoorCommand,
    /// `None` while the door is leased to someone else and the request must
    /// be retried
    pub op: Option<DoorOpId>,
    pub fallback_used: bool,
}

/// One officer escorting one subject through intake
#[derive(Debug, Clone)]
pub struct EscortSession {
    pub id: SessionId,
    pub officer: AgentId,
    pub subject: SubjectId,
    pub holding_cell: u32,
    pub cell: Option<u32>,
    pub state: EscortState,
    pub state_entered_at: f64,
    pub fetch_at: f64,
    /// Stations already accepted in this session
    pub processed: HashSet<Station>,
    /// Move issued for the current movement state, and where it goes
    pub move_request: Option<MoveRequestId>,
    pub move_target: Option<Vec3>,
    pub move_started_at: f64,
    pub pending_door: Option<PendingDoorOp>,
    pub last_door_completed_at: Option<f64>,
    pub clearance_until: f64,
    /// Doors opened during the session, with whether each was locked before
    pub opened_doors: BTreeMap<DoorId, bool>,
    pub subject_clear_since: Option<f64>,
    pub aborted: bool,
    /// Every state entered, in order
    pub history: Vec<EscortState>,
}

impl EscortSession {
    pub fn new(
        officer: AgentId,
        subject: SubjectId,
        holding_cell: u32,
        now: f64,
        fetch_at: f64,
    ) -> Self {
        Self {
            id: SessionId::new(),
            officer,
            subject,
            holding_cell,
            cell: None,
            state: EscortState::Idle,
            state_entered_at: now,
            fetch_at,
            processed: HashSet::new(),
            move_request: None,
            move_target: None,
            move_started_at: now,
            pending_door: None,
            last_door_completed_at: None,
            clearance_until: now,
            opened_doors: BTreeMap::new(),
            subject_clear_since: None,
            aborted: false,
            history: vec![EscortState::Idle],
        }
    }

    /// Whether a door operation is in flight
    pub fn door_active(&self) -> bool {
        self.pending_door.is_some()
    }

    /// Remember a door opened during the session. The first sighting wins, so
    /// a door keeps the lock state it had before the session touched it.
    pub fn record_opened(&mut self, door: DoorId, was_locked: bool) {
        self.opened_doors.entry(door).or_insert(was_locked);
    }

    /// Reset per-state scratch data on a transition
    pub fn enter(&mut self, state: EscortState, now: f64) {
        self.state = state;
        self.state_entered_at = now;
        self.move_request = None;
        self.move_target = None;
        self.subject_clear_since = None;
        self.history.push(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_opened_keeps_first_lock_state() {
        let mut session = EscortSession::new(AgentId(1), SubjectId(1), 2, 0.0, 5.0);
        session.record_opened(DoorId(12), true);
        session.record_opened(DoorId(12), false);
        assert_eq!(session.opened_doors.get(&DoorId(12)), Some(&true));
    }

    #[test]
    fn test_enter_resets_scratch() {
        let mut session = EscortSession::new(AgentId(1), SubjectId(1), 2, 0.0, 5.0);
        session.move_request = Some(MoveRequestId(3));
        session.subject_clear_since = Some(1.0);
        session.enter(EscortState::DelayBeforeFetch, 2.0);
        assert!(session.move_request.is_none());
        assert!(session.subject_clear_since.is_none());
        assert_eq!(session.history, vec![EscortState::Idle, EscortState::DelayBeforeFetch]);
    }
}
