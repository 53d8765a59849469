use std::path::PathBuf;

use warden_core::AssignmentId;

/// Errors that can occur while loading or validating world data.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("failed to read {0:?}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse world data: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("route '{0}' has no waypoints")]
    EmptyRoute(String),

    #[error("duplicate route name '{0}'")]
    DuplicateRoute(String),

    #[error("{0} refers to unknown route '{1}'")]
    UnknownRoute(AssignmentId, String),

    #[error("cell {0} refers to unknown door {1}")]
    UnknownCellDoor(u32, u32),

    #[error("duplicate {0} index {1}")]
    DuplicateCell(&'static str, u32),
}
