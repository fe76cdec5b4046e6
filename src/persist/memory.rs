use super::{EntityRecord, Store};
use crate::core::{EntityKey, InstanceId, Result};
use crate::orchestration::{HistoryEvent, InstanceStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory store. Default for tests and for running the sample scenarios
/// without a data directory. Durability is process-lifetime only, but the
/// ordering contract (checkpoint visible before the call returns) holds.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<HashMap<EntityKey, EntityRecord>>,
    histories: RwLock<HashMap<InstanceId, Vec<HistoryEvent>>>,
    statuses: RwLock<HashMap<InstanceId, InstanceStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_entity(&self, key: &EntityKey, record: &EntityRecord) -> Result<()> {
        self.entities
            .write()
            .await
            .insert(key.clone(), record.clone());
        Ok(())
    }

    async fn load_entity(&self, key: &EntityKey) -> Result<Option<EntityRecord>> {
        Ok(self.entities.read().await.get(key).cloned())
    }

    async fn append_event(&self, instance: &InstanceId, event: &HistoryEvent) -> Result<()> {
        self.histories
            .write()
            .await
            .entry(instance.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn load_history(&self, instance: &InstanceId) -> Result<Vec<HistoryEvent>> {
        Ok(self
            .histories
            .read()
            .await
            .get(instance)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_status(&self, instance: &InstanceId, status: &InstanceStatus) -> Result<()> {
        self.statuses
            .write()
            .await
            .insert(instance.clone(), status.clone());
        Ok(())
    }

    async fn load_status(&self, instance: &InstanceId) -> Result<Option<InstanceStatus>> {
        Ok(self.statuses.read().await.get(instance).cloned())
    }
}
