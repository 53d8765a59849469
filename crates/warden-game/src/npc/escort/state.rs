//! Intake pipeline states

use serde::{Deserialize, Serialize};
use warden_world::StationKind;

use crate::services::{DoorCommand, IntakeStep};

/// One step of the intake escort pipeline. The pipeline is strictly linear;
/// the only other edge is an abort to [`EscortState::ReturningToPost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscortState {
    Idle,
    DelayBeforeFetch,
    EscortToHolding,
    OpeningHoldingDoor,
    WaitingForPlayerExit,
    ClosingHoldingDoor,
    EscortToMugshot,
    WaitingForMugshot,
    EscortToScanner,
    WaitingForScan,
    EscortToStorage,
    WaitingForStorage,
    EscortToCell,
    OpeningCellDoor,
    WaitingForCellEntry,
    ClosingCellDoor,
    ReturningToPost,
}

/// Every pipeline state in visiting order
pub const PIPELINE: [EscortState; 17] = [
    EscortState::Idle,
    EscortState::DelayBeforeFetch,
    EscortState::EscortToHolding,
    EscortState::OpeningHoldingDoor,
    EscortState::WaitingForPlayerExit,
    EscortState::ClosingHoldingDoor,
    EscortState::EscortToMugshot,
    EscortState::WaitingForMugshot,
    EscortState::EscortToScanner,
    EscortState::WaitingForScan,
    EscortState::EscortToStorage,
    EscortState::WaitingForStorage,
    EscortState::EscortToCell,
    EscortState::OpeningCellDoor,
    EscortState::WaitingForCellEntry,
    EscortState::ClosingCellDoor,
    EscortState::ReturningToPost,
];

/// Place the officer walks to during an escort movement state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Station {
    HoldingCell,
    Processing(StationKind),
    Cell,
    Post,
}

impl Station {
    pub fn name(&self) -> &'static str {
        match self {
            Station::HoldingCell => "holding cell",
            Station::Processing(kind) => kind.name(),
            Station::Cell => "cell",
            Station::Post => "post",
        }
    }
}

/// Which door a door state operates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorTarget {
    Holding,
    Cell,
}

impl EscortState {
    /// The successor on the linear pipeline
    pub fn next(self) -> EscortState {
        let index = self.index();
        PIPELINE[(index + 1) % PIPELINE.len()]
    }

    /// Position in [`PIPELINE`]
    pub fn index(self) -> usize {
        PIPELINE.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Whether `to` is a legal transition from this state
    pub fn can_transition_to(self, to: EscortState) -> bool {
        if to == self.next() {
            return true;
        }
        to == EscortState::ReturningToPost
            && !matches!(self, EscortState::Idle | EscortState::ReturningToPost)
    }

    /// Destination of a movement state
    pub fn station(self) -> Option<Station> {
        match self {
            EscortState::EscortToHolding => Some(Station::HoldingCell),
            EscortState::EscortToMugshot => Some(Station::Processing(StationKind::Mugshot)),
            EscortState::EscortToScanner => Some(Station::Processing(StationKind::Scanner)),
            EscortState::EscortToStorage => Some(Station::Processing(StationKind::Storage)),
            EscortState::EscortToCell => Some(Station::Cell),
            EscortState::ReturningToPost => Some(Station::Post),
            _ => None,
        }
    }

    pub fn is_movement(self) -> bool {
        self.station().is_some()
    }

    /// Door operation performed by a door state
    pub fn door_operation(self) -> Option<(DoorTarget, DoorCommand)> {
        match self {
            EscortState::OpeningHoldingDoor => Some((DoorTarget::Holding, DoorCommand::Open)),
            EscortState::ClosingHoldingDoor => Some((DoorTarget::Holding, DoorCommand::Close)),
            EscortState::OpeningCellDoor => Some((DoorTarget::Cell, DoorCommand::Open)),
            EscortState::ClosingCellDoor => Some((DoorTarget::Cell, DoorCommand::Close)),
            _ => None,
        }
    }

    /// Booking step a waiting state blocks on
    pub fn awaited_step(self) -> Option<IntakeStep> {
        match self {
            EscortState::WaitingForMugshot => Some(IntakeStep::Mugshot),
            EscortState::WaitingForScan => Some(IntakeStep::Fingerprint),
            EscortState::WaitingForStorage => Some(IntakeStep::GearPickup),
            _ => None,
        }
    }

    /// Movement states during which the subject walks with the officer
    pub fn subject_follows(self) -> bool {
        matches!(
            self,
            EscortState::EscortToMugshot
                | EscortState::EscortToScanner
                | EscortState::EscortToStorage
                | EscortState::EscortToCell
        )
    }

    /// Line shown when the officer sets off for a station
    pub fn announcement(self) -> Option<&'static str> {
        match self {
            EscortState::EscortToHolding => Some("Stand back from the door."),
            EscortState::EscortToMugshot => Some("Follow me. Photo first."),
            EscortState::EscortToScanner => Some("Fingerprints next. Keep up."),
            EscortState::EscortToStorage => Some("Pick up your gear at storage."),
            EscortState::EscortToCell => Some("This way to your cell."),
            _ => None,
        }
    }
}
