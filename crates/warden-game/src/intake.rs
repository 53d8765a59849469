//! Reference booking, housing, messaging and search backends

use std::collections::{HashMap, HashSet};

use tracing::info;
use warden_core::{AgentId, SubjectId};

use crate::services::{CellAssignment, IntakeSignals, IntakeStep, MessageSink, SearchProcedure};

/// Booking desk holding the per-subject completion flags
#[derive(Debug, Default)]
pub struct IntakeDesk {
    completed: HashSet<(SubjectId, IntakeStep)>,
}

impl IntakeDesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&mut self, subject: SubjectId, step: IntakeStep) {
        if self.completed.insert((subject, step)) {
            info!("{} completed {:?}", subject, step);
        }
    }

    /// Forget every flag for the subject
    pub fn reset(&mut self, subject: SubjectId) {
        self.completed.retain(|(s, _)| *s != subject);
    }
}

impl IntakeSignals for IntakeDesk {
    fn is_complete(&self, subject: SubjectId, step: IntakeStep) -> bool {
        self.completed.contains(&(subject, step))
    }
}

/// Hands out free housing cells in index order
#[derive(Debug, Default)]
pub struct CellRegistry {
    free: Vec<u32>,
    occupants: HashMap<SubjectId, u32>,
}

impl CellRegistry {
    pub fn new(cells: impl IntoIterator<Item = u32>) -> Self {
        let mut free: Vec<u32> = cells.into_iter().collect();
        free.sort_unstable();
        free.dedup();
        // Popped from the back
        free.reverse();
        Self {
            free,
            occupants: HashMap::new(),
        }
    }

    pub fn cell_of(&self, subject: SubjectId) -> Option<u32> {
        self.occupants.get(&subject).copied()
    }

    pub fn release(&mut self, subject: SubjectId) {
        if let Some(cell) = self.occupants.remove(&subject) {
            self.free.push(cell);
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

impl CellAssignment for CellRegistry {
    fn assign(&mut self, subject: SubjectId) -> Option<u32> {
        if let Some(cell) = self.occupants.get(&subject) {
            return Some(*cell);
        }
        let cell = self.free.pop()?;
        self.occupants.insert(subject, cell);
        Some(cell)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub agent: AgentId,
    pub text: String,
    pub duration: f32,
}

/// Records every message shown, in order
#[derive(Debug, Default)]
pub struct MessageLog {
    pub messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts_for(&self, agent: AgentId) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.agent == agent)
            .map(|m| m.text.as_str())
            .collect()
    }
}

impl MessageSink for MessageLog {
    fn show(&mut self, agent: AgentId, text: &str, duration: f32) {
        info!("[{}] \"{}\"", agent, text);
        self.messages.push(Message {
            agent,
            text: text.to_string(),
            duration,
        });
    }
}

/// Search procedure stand-in. Subjects are searchable only when marked
/// eligible; a search finishes when [`SearchDesk::finish`] is called.
#[derive(Debug, Default)]
pub struct SearchDesk {
    eligible: HashSet<SubjectId>,
    running: HashSet<(AgentId, SubjectId)>,
    finished: HashSet<(AgentId, SubjectId)>,
}

impl SearchDesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_eligible(&mut self, subject: SubjectId, eligible: bool) {
        if eligible {
            self.eligible.insert(subject);
        } else {
            self.eligible.remove(&subject);
        }
    }

    pub fn finish(&mut self, officer: AgentId, subject: SubjectId) {
        if self.running.remove(&(officer, subject)) {
            self.finished.insert((officer, subject));
        }
    }

    pub fn is_running(&self, officer: AgentId, subject: SubjectId) -> bool {
        self.running.contains(&(officer, subject))
    }
}

impl SearchProcedure for SearchDesk {
    fn is_eligible(&self, _officer: AgentId, subject: SubjectId) -> bool {
        self.eligible.contains(&subject)
    }

    fn begin(&mut self, officer: AgentId, subject: SubjectId) -> bool {
        if !self.eligible.remove(&subject) {
            return false;
        }
        self.finished.remove(&(officer, subject));
        self.running.insert((officer, subject))
    }

    fn is_finished(&self, officer: AgentId, subject: SubjectId) -> bool {
        self.finished.contains(&(officer, subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_flags() {
        let mut desk = IntakeDesk::new();
        let p = SubjectId(1);
        assert!(!desk.is_complete(p, IntakeStep::Mugshot));
        desk.complete(p, IntakeStep::Mugshot);
        assert!(desk.is_complete(p, IntakeStep::Mugshot));
        assert!(!desk.is_complete(SubjectId(2), IntakeStep::Mugshot));
        desk.reset(p);
        assert!(!desk.is_complete(p, IntakeStep::Mugshot));
    }

    #[test]
    fn test_cells_assigned_in_order() {
        let mut cells = CellRegistry::new([2, 1]);
        assert_eq!(cells.assign(SubjectId(1)), Some(1));
        assert_eq!(cells.assign(SubjectId(1)), Some(1), "assignment is stable");
        assert_eq!(cells.assign(SubjectId(2)), Some(2));
        assert_eq!(cells.assign(SubjectId(3)), None);
        cells.release(SubjectId(1));
        assert_eq!(cells.assign(SubjectId(3)), Some(1));
    }

    #[test]
    fn test_search_lifecycle() {
        let mut search = SearchDesk::new();
        let (o, s) = (AgentId(1), SubjectId(1));
        assert!(!search.begin(o, s));
        search.set_eligible(s, true);
        assert!(search.is_eligible(o, s));
        assert!(search.begin(o, s));
        assert!(!search.is_finished(o, s));
        search.finish(o, s);
        assert!(search.is_finished(o, s));
        assert!(!search.is_eligible(o, s), "one search per eligibility");
    }

    #[test]
    fn test_message_log() {
        let mut log = MessageLog::new();
        log.show(AgentId(1), "Follow me.", 3.0);
        log.show(AgentId(2), "Halt.", 2.0);
        assert_eq!(log.texts_for(AgentId(1)), vec!["Follow me."]);
    }
}
