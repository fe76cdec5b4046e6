use super::context::OrchestrationContext;
use super::history::HistoryEvent;
use crate::core::{CoordError, InstanceId, Result};
use crate::entity::EntityRuntime;
use crate::lock::LockManager;
use crate::persist::Store;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info, warn};

// ============================================================================
// Instance Status
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceState {
    Running,
    Completed { output: Value },
    Failed { error: String },
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub workflow: String,
    #[serde(flatten)]
    pub state: InstanceState,
}

type WorkflowFn =
    Arc<dyn Fn(OrchestrationContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

// ============================================================================
// Workflow Runtime
// ============================================================================

/// Executes registered workflows as replayable instances. `start` runs a
/// fresh instance; `resume` re-executes one from its recorded history (the
/// crash/retry path). Terminal status is persisted and surfaced to whoever
/// queries it; an uncaught fault becomes the instance's terminal state.
#[derive(Clone)]
pub struct WorkflowRuntime {
    inner: Arc<WfInner>,
}

struct WfInner {
    workflows: Mutex<HashMap<String, WorkflowFn>>,
    entities: EntityRuntime,
    locks: Arc<LockManager>,
    store: Arc<dyn Store>,
    watchers: Mutex<HashMap<InstanceId, watch::Sender<InstanceStatus>>>,
}

impl WorkflowRuntime {
    pub fn new(entities: EntityRuntime, locks: Arc<LockManager>, store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(WfInner {
                workflows: Mutex::new(HashMap::new()),
                entities,
                locks,
                store,
                watchers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn register<F, Fut>(&self, name: &str, workflow: F)
    where
        F: Fn(OrchestrationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let wrapped: WorkflowFn = Arc::new(move |ctx| Box::pin(workflow(ctx)));
        self.inner
            .workflows
            .lock()
            .expect("workflow table poisoned")
            .insert(name.to_string(), wrapped);
    }

    fn lookup(&self, name: &str) -> Result<WorkflowFn> {
        self.inner
            .workflows
            .lock()
            .expect("workflow table poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| CoordError::UnknownWorkflow(name.to_string()))
    }

    /// Start a new instance of `name`. Returns once the instance is durably
    /// `Running`; execution proceeds in the background.
    pub async fn start(&self, name: &str) -> Result<InstanceId> {
        let workflow = self.lookup(name)?;
        let instance = InstanceId::new();
        let status = InstanceStatus {
            workflow: name.to_string(),
            state: InstanceState::Running,
        };
        self.inner.store.save_status(&instance, &status).await?;
        self.watch_sender(&instance, &status);
        info!(instance = %instance, workflow = name, "workflow instance started");
        tokio::spawn(run_instance(
            Arc::clone(&self.inner),
            instance.clone(),
            name.to_string(),
            workflow,
            Vec::new(),
        ));
        Ok(instance)
    }

    /// Re-execute an existing instance from the top against its recorded
    /// history. Recorded steps replay without side effects; execution
    /// continues with real side effects from wherever history runs out.
    pub async fn resume(&self, instance: &InstanceId) -> Result<()> {
        let status = self
            .inner
            .store
            .load_status(instance)
            .await?
            .ok_or_else(|| CoordError::InstanceNotFound(instance.to_string()))?;
        let workflow = self.lookup(&status.workflow)?;
        let history = self.inner.store.load_history(instance).await?;
        self.watch_sender(instance, &status);
        info!(
            instance = %instance,
            workflow = %status.workflow,
            recorded_events = history.len(),
            "resuming workflow instance"
        );
        tokio::spawn(run_instance(
            Arc::clone(&self.inner),
            instance.clone(),
            status.workflow,
            workflow,
            history,
        ));
        Ok(())
    }

    pub async fn status(&self, instance: &InstanceId) -> Result<InstanceStatus> {
        self.inner
            .store
            .load_status(instance)
            .await?
            .ok_or_else(|| CoordError::InstanceNotFound(instance.to_string()))
    }

    /// Wait until the instance reaches a terminal state.
    pub async fn wait(&self, instance: &InstanceId) -> Result<InstanceStatus> {
        let mut rx = {
            let watchers = self.inner.watchers.lock().expect("watcher table poisoned");
            match watchers.get(instance) {
                Some(sender) => sender.subscribe(),
                None => return self.status(instance).await,
            }
        };
        loop {
            {
                let status = rx.borrow();
                if status.state.is_terminal() {
                    return Ok(status.clone());
                }
            }
            if rx.changed().await.is_err() {
                // Runtime dropped mid-run; fall back to whatever was stored.
                return self.status(instance).await;
            }
        }
    }

    fn watch_sender(&self, instance: &InstanceId, status: &InstanceStatus) {
        let mut watchers = self.inner.watchers.lock().expect("watcher table poisoned");
        watchers
            .entry(instance.clone())
            .or_insert_with(|| watch::channel(status.clone()).0);
    }
}

async fn run_instance(
    inner: Arc<WfInner>,
    instance: InstanceId,
    name: String,
    workflow: WorkflowFn,
    history: Vec<HistoryEvent>,
) {
    let ctx = OrchestrationContext::from_history(
        instance.clone(),
        inner.entities.clone(),
        Arc::clone(&inner.locks),
        Arc::clone(&inner.store),
        history,
    );
    let state = match workflow(ctx).await {
        Ok(output) => {
            info!(instance = %instance, workflow = %name, "workflow completed");
            InstanceState::Completed { output }
        }
        Err(err) => {
            warn!(instance = %instance, workflow = %name, error = %err, "workflow failed");
            InstanceState::Failed {
                error: err.to_string(),
            }
        }
    };
    let status = InstanceStatus {
        workflow: name,
        state,
    };
    if let Err(err) = inner.store.save_status(&instance, &status).await {
        error!(instance = %instance, error = %err, "failed to persist terminal status");
    }
    let sender = inner
        .watchers
        .lock()
        .expect("watcher table poisoned")
        .remove(&instance);
    if let Some(sender) = sender {
        // send_replace stores the terminal value even with no receiver
        // subscribed yet; dropping the sender afterwards points late waiters
        // at the store instead of a stuck channel.
        sender.send_replace(status);
    }
}
