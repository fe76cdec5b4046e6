use super::history::{EventId, HistoryEvent};
use crate::core::{CoordError, EntityKey, InstanceId, Result};
use crate::entity::EntityRuntime;
use crate::lock::{LockManager, LockOwner, LockSet};
use crate::persist::Store;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Handle given to workflow code. Every suspension point goes through one of
/// its primitives, which is what makes the workflow a pure function of
/// (inputs, history): wall-clock time, randomness, and entity state are only
/// reachable through replay-recorded calls.
///
/// Concurrent strands (e.g. `join_all` fan-out) must each run on their own
/// [`fork`](Self::fork), created in deterministic code before the strands
/// start executing. Sequential workflow code just uses the root context.
#[derive(Clone)]
pub struct OrchestrationContext {
    inner: Arc<CtxInner>,
    branch: u64,
    seq: Arc<AtomicU64>,
    /// Lock identity of this strand. Branch-scoped so sibling forks exclude
    /// each other while scopes nested on one strand stay re-entrant.
    owner: LockOwner,
}

struct CtxInner {
    instance: InstanceId,
    entities: EntityRuntime,
    locks: Arc<LockManager>,
    store: Arc<dyn Store>,
    /// Recorded history of the current execution, keyed by event id.
    /// Immutable for the lifetime of the run; events recorded by this run
    /// go straight to the store.
    events: HashMap<EventId, HistoryEvent>,
    /// Highest recorded seq per branch; primitives at or below it replay.
    horizons: HashMap<u64, u64>,
    next_branch: AtomicU64,
}

impl OrchestrationContext {
    pub(crate) fn from_history(
        instance: InstanceId,
        entities: EntityRuntime,
        locks: Arc<LockManager>,
        store: Arc<dyn Store>,
        history: Vec<HistoryEvent>,
    ) -> Self {
        let mut events = HashMap::with_capacity(history.len());
        let mut horizons: HashMap<u64, u64> = HashMap::new();
        for event in history {
            let id = event.id();
            let horizon = horizons.entry(id.branch).or_default();
            *horizon = (*horizon).max(id.seq);
            events.insert(id, event);
        }
        let owner = LockOwner::root(instance.clone());
        Self {
            inner: Arc::new(CtxInner {
                instance,
                entities,
                locks,
                store,
                events,
                horizons,
                next_branch: AtomicU64::new(0),
            }),
            branch: 0,
            seq: Arc::new(AtomicU64::new(0)),
            owner,
        }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.inner.instance
    }

    /// True while this strand is re-executing recorded history. Used to
    /// suppress observational output that already happened on the pass that
    /// recorded the events.
    pub fn is_replaying(&self) -> bool {
        let horizon = self.inner.horizons.get(&self.branch).copied().unwrap_or(0);
        self.seq.load(Ordering::SeqCst) < horizon
    }

    /// Split off a child strand with its own event sequence. Branch numbers
    /// are allocated in creation order, so forks created in deterministic
    /// code line up with their recorded history on replay.
    pub fn fork(&self) -> Self {
        let branch = self.inner.next_branch.fetch_add(1, Ordering::SeqCst) + 1;
        Self {
            inner: Arc::clone(&self.inner),
            branch,
            seq: Arc::new(AtomicU64::new(0)),
            owner: LockOwner::new(self.inner.instance.clone(), branch),
        }
    }

    fn next_id(&self) -> EventId {
        EventId {
            branch: self.branch,
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    fn recorded(&self, id: EventId) -> Option<&HistoryEvent> {
        self.inner.events.get(&id)
    }

    async fn append(&self, event: HistoryEvent) -> Result<()> {
        self.inner
            .store
            .append_event(&self.inner.instance, &event)
            .await
    }

    fn diverged(expected: &HistoryEvent, actual: String) -> CoordError {
        CoordError::NondeterministicReplay(format!(
            "history recorded '{}' but re-execution issued '{}'",
            expected.describe(),
            actual
        ))
    }

    /// Call an entity operation and wait for its result.
    ///
    /// Replayed calls return the recorded outcome without touching the
    /// entity; a recorded event whose key, operation, or input differs from
    /// the re-executed call is a nondeterminism fault. A new call is
    /// dispatched under this strand's identity (so it passes the lock gate
    /// for entities this strand holds) and its outcome is appended to
    /// history before the workflow observes it.
    pub async fn call(&self, key: &EntityKey, operation: &str, input: Value) -> Result<Value> {
        let id = self.next_id();
        if let Some(event) = self.recorded(id) {
            return match event {
                HistoryEvent::Call {
                    key: recorded_key,
                    operation: recorded_op,
                    input: recorded_input,
                    result,
                    ..
                } if recorded_key == key
                    && recorded_op == operation
                    && *recorded_input == input =>
                {
                    result.clone()
                }
                other => Err(Self::diverged(
                    other,
                    format!("call {key}/{operation} with input {input}"),
                )),
            };
        }
        let result = self
            .inner
            .entities
            .dispatch(Some(&self.owner), key, operation, input.clone())
            .await;
        self.append(HistoryEvent::Call {
            id,
            key: key.clone(),
            operation: operation.to_string(),
            input,
            result: result.clone(),
        })
        .await?;
        result
    }

    /// Acquire exclusive access to `keys` as one scoped reservation,
    /// released when the returned scope drops on any path.
    ///
    /// The acquisition itself is re-performed on replay — an in-memory lock
    /// does not survive a crash, and the strand may run past its horizon
    /// while still inside the scope — but it is not re-recorded. Ordered
    /// acquisition keeps re-acquisition deadlock-free.
    pub async fn lock(&self, keys: &[EntityKey]) -> Result<LockSet> {
        let id = self.next_id();
        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        if let Some(event) = self.recorded(id) {
            match event {
                HistoryEvent::Lock {
                    keys: recorded_keys,
                    ..
                } if *recorded_keys == sorted => {}
                other => {
                    let keys: Vec<String> = sorted.iter().map(ToString::to_string).collect();
                    return Err(Self::diverged(other, format!("lock [{}]", keys.join(", "))));
                }
            }
            return Ok(self.inner.locks.acquire_all(&self.owner, &sorted).await);
        }
        let set = self.inner.locks.acquire_all(&self.owner, &sorted).await;
        self.append(HistoryEvent::Lock { id, keys: sorted }).await?;
        Ok(set)
    }

    /// Replay-safe unique id: generated once, recorded, and returned from
    /// history on every re-execution.
    pub async fn new_guid(&self) -> Result<Uuid> {
        let id = self.next_id();
        if let Some(event) = self.recorded(id) {
            return match event {
                HistoryEvent::Guid { value, .. } => Ok(*value),
                other => Err(Self::diverged(other, "new_guid".to_string())),
            };
        }
        let value = Uuid::new_v4();
        self.append(HistoryEvent::Guid { id, value }).await?;
        Ok(value)
    }
}
