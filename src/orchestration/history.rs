use crate::core::{CoordError, EntityKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Position of a primitive within a workflow execution.
///
/// `branch` identifies one logical strand of the workflow (0 is the root;
/// forks allocate 1, 2, … in creation order) and `seq` counts the primitives
/// awaited on that strand. Keying history by `(branch, seq)` instead of one
/// global cursor keeps replay correct for concurrent strands: replayed awaits
/// complete immediately, so strands interleave differently on replay than
/// they did originally, but each strand's own sequence never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub branch: u64,
    pub seq: u64,
}

/// One recorded suspension point: the side effect that was issued and the
/// result the workflow observed. Never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// Entity operation call and its outcome (success or business fault).
    Call {
        id: EventId,
        key: EntityKey,
        operation: String,
        input: Value,
        result: std::result::Result<Value, CoordError>,
    },
    /// Multi-entity lock acquisition (keys stored in acquisition order).
    Lock { id: EventId, keys: Vec<EntityKey> },
    /// Replay-safe unique id issued to the workflow.
    Guid { id: EventId, value: Uuid },
}

impl HistoryEvent {
    pub fn id(&self) -> EventId {
        match self {
            Self::Call { id, .. } | Self::Lock { id, .. } | Self::Guid { id, .. } => *id,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Call { key, operation, .. } => format!("call {key}/{operation}"),
            Self::Lock { keys, .. } => {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                format!("lock [{}]", keys.join(", "))
            }
            Self::Guid { .. } => "new_guid".to_string(),
        }
    }
}
