//! Durable storage for entity state and workflow history.
//!
//! The runtime only requires write-then-acknowledge ordering per key: an
//! entity checkpoint or history append must be durable before the call
//! returns, and a reader of the same key must observe it afterwards.

pub mod file;
pub mod memory;

use crate::core::{EntityKey, InstanceId, Result};
use crate::entity::Signal;
use crate::orchestration::{HistoryEvent, InstanceStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use file::FileStore;
pub use memory::MemoryStore;

// ============================================================================
// Entity Checkpoint Record
// ============================================================================

/// Checkpoint of one entity: snapshot, operation sequence number, and the
/// outbox of signals committed together with the last mutation but possibly
/// not yet delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub seq: u64,
    pub state: serde_json::Value,
    #[serde(default)]
    pub outbox: Vec<Signal>,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence collaborator keyed by `(kind, id)` for entities and by
/// instance id for workflow history and status.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn save_entity(&self, key: &EntityKey, record: &EntityRecord) -> Result<()>;

    async fn load_entity(&self, key: &EntityKey) -> Result<Option<EntityRecord>>;

    /// Append one event to an instance's history. History is append-only;
    /// a recorded event is never rewritten.
    async fn append_event(&self, instance: &InstanceId, event: &HistoryEvent) -> Result<()>;

    async fn load_history(&self, instance: &InstanceId) -> Result<Vec<HistoryEvent>>;

    async fn save_status(&self, instance: &InstanceId, status: &InstanceStatus) -> Result<()>;

    async fn load_status(&self, instance: &InstanceId) -> Result<Option<InstanceStatus>>;
}
