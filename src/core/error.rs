use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coordination error for the whole crate.
///
/// Variants are plain data (no source chains) so that recorded call outcomes
/// can round-trip through workflow history as JSON.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordError {
    #[error("order has no remaining capacity for tracked items")]
    CapacityExceeded,

    #[error("{kind} '{id}' already has an assignment")]
    AlreadyAssigned { kind: String, id: String },

    #[error("single-assignment field on {kind} '{id}' was set twice with the same value")]
    DuplicateAssignment { kind: String, id: String },

    #[error("{kind} '{id}' already contains tracked item '{item}'")]
    DuplicateTrackedItem {
        kind: String,
        id: String,
        item: String,
    },

    #[error("no entity behavior registered for kind '{0}'")]
    UnknownEntityKind(String),

    #[error("entity '{entity}' has no operation '{operation}'")]
    UnknownOperation { entity: String, operation: String },

    #[error("no workflow registered under name '{0}'")]
    UnknownWorkflow(String),

    #[error("workflow instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("replay diverged from recorded history: {0}")]
    NondeterministicReplay(String),

    #[error("runtime failure: {0}")]
    Runtime(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("bad payload: {0}")]
    BadPayload(String),
}

pub type Result<T> = std::result::Result<T, CoordError>;

impl From<serde_json::Error> for CoordError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoordError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
