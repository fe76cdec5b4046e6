// ============================================================================
// Coordinator Facade
// ============================================================================

use crate::core::{EntityKey, InstanceId, Result};
use crate::entity::{EntityRuntime, EntityState};
use crate::lock::LockManager;
use crate::orchestration::{InstanceStatus, OrchestrationContext, WorkflowRuntime};
use crate::persist::{MemoryStore, Store};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// One handle over the whole coordination engine: entity runtime, lock
/// manager, and workflow runtime wired to a shared store.
///
/// # Examples
///
/// ```no_run
/// use durentity::{Coordinator, EntityKey};
/// use serde_json::json;
///
/// # async fn demo() -> durentity::Result<()> {
/// let coord = Coordinator::in_memory();
/// durentity::tracking::register(&coord);
///
/// let instance = coord.start("scenario1").await?;
/// let status = coord.wait(&instance).await?;
/// println!("{status:?}");
///
/// coord.signal(
///     &EntityKey::new("tracker", "t-1"),
///     "set_current_location",
///     json!({ "latitude": 47.6, "longitude": -122.3, "timestamp": "2024-05-01T12:00:00Z" }),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    entities: EntityRuntime,
    workflows: WorkflowRuntime,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let locks = Arc::new(LockManager::new());
        let entities = EntityRuntime::new(Arc::clone(&store), Arc::clone(&locks));
        let workflows = WorkflowRuntime::new(entities.clone(), locks, store);
        Self {
            entities,
            workflows,
        }
    }

    /// Coordinator backed by the in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn register_entity<S: EntityState>(&self) {
        self.entities.register::<S>();
    }

    pub fn register_workflow<F, Fut>(&self, name: &str, workflow: F)
    where
        F: Fn(OrchestrationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.workflows.register(name, workflow);
    }

    /// Start a new workflow instance by name.
    pub async fn start(&self, name: &str) -> Result<InstanceId> {
        self.workflows.start(name).await
    }

    /// Re-execute an instance from its recorded history.
    pub async fn resume(&self, instance: &InstanceId) -> Result<()> {
        self.workflows.resume(instance).await
    }

    pub async fn status(&self, instance: &InstanceId) -> Result<InstanceStatus> {
        self.workflows.status(instance).await
    }

    /// Block until the instance reaches a terminal state.
    pub async fn wait(&self, instance: &InstanceId) -> Result<InstanceStatus> {
        self.workflows.wait(instance).await
    }

    /// Fire-and-forget signal into an entity's operation queue (external
    /// ingress path; entities signal each other through [`crate::entity::Effects`]).
    pub fn signal(&self, key: &EntityKey, operation: &str, payload: Value) {
        self.entities.signal(key, operation, payload);
    }

    /// Current state snapshot of an entity, ordered behind in-flight
    /// operations on the same key.
    pub async fn read_entity(&self, key: &EntityKey) -> Result<Value> {
        self.entities.read_state(key).await
    }

    pub fn entities(&self) -> &EntityRuntime {
        &self.entities
    }
}
