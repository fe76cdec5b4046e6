use super::behavior::{Behavior, Effects, EntityState, Registry, Signal};
use crate::core::{CoordError, EntityKey, Result};
use crate::lock::{LockManager, LockOwner};
use crate::persist::{EntityRecord, Store};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum Envelope {
    Call {
        operation: String,
        input: Value,
        reply: oneshot::Sender<Result<Value>>,
    },
    Signal {
        operation: String,
        payload: Value,
    },
    Read {
        reply: oneshot::Sender<Result<Value>>,
    },
}

/// Entity runtime: owns one mailbox + worker task per live entity key.
///
/// Cloning is cheap; all clones share the same workers, store, and lock
/// table.
#[derive(Clone)]
pub struct EntityRuntime {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    store: Arc<dyn Store>,
    locks: Arc<LockManager>,
    mailboxes: Mutex<HashMap<EntityKey, mpsc::UnboundedSender<Envelope>>>,
}

impl EntityRuntime {
    pub fn new(store: Arc<dyn Store>, locks: Arc<LockManager>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Registry::default(),
                store,
                locks,
                mailboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn register<S: EntityState>(&self) {
        self.inner.registry.register::<S>();
    }

    /// Invoke an operation and wait for its result.
    ///
    /// A call from a workflow strand (`caller = Some(..)`) is admitted to
    /// the target's mailbox only while the entity is unlocked or locked by
    /// that same strand; otherwise the dispatch suspends until release.
    /// Strict FIFO once enqueued.
    pub async fn dispatch(
        &self,
        caller: Option<&LockOwner>,
        key: &EntityKey,
        operation: &str,
        input: Value,
    ) -> Result<Value> {
        let sender = self.inner.ensure_worker(key);
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut envelope = Some(Envelope::Call {
            operation: operation.to_string(),
            input,
            reply: reply_tx,
        });
        loop {
            let wait = self.inner.locks.admit_or_wait(caller, key, || {
                let _ = sender.send(envelope.take().expect("envelope delivered twice"));
            });
            match wait {
                None => break,
                Some(rx) => {
                    // Wake on lock release, then re-check.
                    let _ = rx.await;
                }
            }
        }
        reply_rx
            .await
            .map_err(|_| CoordError::Runtime(format!("entity worker for {key} went away")))?
    }

    /// Fire-and-forget: enqueue an operation with no reply channel. Signals
    /// bypass the lock gate; the sender needs no lock on the target.
    pub fn signal(&self, key: &EntityKey, operation: &str, payload: Value) {
        self.inner.deliver(Signal {
            target: key.clone(),
            operation: operation.to_string(),
            payload,
        });
    }

    /// Snapshot of an entity's current state, served through its mailbox and
    /// therefore ordered with respect to in-flight operations.
    pub async fn read_state(&self, key: &EntityKey) -> Result<Value> {
        let sender = self.inner.ensure_worker(key);
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Envelope::Read { reply: reply_tx })
            .map_err(|_| CoordError::Runtime(format!("entity worker for {key} went away")))?;
        reply_rx
            .await
            .map_err(|_| CoordError::Runtime(format!("entity worker for {key} went away")))?
    }
}

impl Inner {
    fn ensure_worker(self: &Arc<Self>, key: &EntityKey) -> mpsc::UnboundedSender<Envelope> {
        let mut mailboxes = self.mailboxes.lock().expect("mailbox table poisoned");
        if let Some(sender) = mailboxes.get(key) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        mailboxes.insert(key.clone(), tx.clone());
        tokio::spawn(worker_loop(key.clone(), Arc::downgrade(self), rx));
        tx
    }

    fn deliver(self: &Arc<Self>, signal: Signal) {
        let sender = self.ensure_worker(&signal.target);
        let _ = sender.send(Envelope::Signal {
            operation: signal.operation,
            payload: signal.payload,
        });
    }
}

// ============================================================================
// Worker Loop
// ============================================================================

struct Loaded {
    behavior: Box<dyn Behavior>,
    seq: u64,
}

/// Single-writer loop for one entity key. Lives until the runtime is dropped
/// (all mailbox senders gone).
async fn worker_loop(
    key: EntityKey,
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
) {
    let mut loaded: Option<Loaded> = None;
    while let Some(envelope) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if loaded.is_none() {
            match activate(&inner, &key).await {
                Ok(state) => loaded = Some(state),
                Err(err) => {
                    match envelope {
                        Envelope::Call { reply, .. } | Envelope::Read { reply } => {
                            let _ = reply.send(Err(err));
                        }
                        Envelope::Signal { ref operation, .. } => {
                            warn!(entity = %key, operation, error = %err, "dropping signal: activation failed");
                        }
                    }
                    continue;
                }
            }
        }
        let state = loaded.as_mut().expect("entity state just loaded");
        match envelope {
            Envelope::Call {
                operation,
                input,
                reply,
            } => {
                let result = execute(&inner, &key, state, &operation, input).await;
                let _ = reply.send(result);
            }
            Envelope::Signal { operation, payload } => {
                if let Err(err) = execute(&inner, &key, state, &operation, payload).await {
                    // Signals have no caller to report to.
                    warn!(entity = %key, operation, error = %err, "signal rejected by receiver");
                }
            }
            Envelope::Read { reply } => {
                let _ = reply.send(state.behavior.snapshot());
            }
        }
    }
    debug!(entity = %key, "entity worker stopped");
}

/// Load the checkpointed record (if any) and redeliver any signals that were
/// committed but not confirmed delivered before the last shutdown.
async fn activate(inner: &Arc<Inner>, key: &EntityKey) -> Result<Loaded> {
    let record = inner.store.load_entity(key).await?;
    let (snapshot, seq, outbox) = match record {
        Some(record) => (Some(record.state), record.seq, record.outbox),
        None => (None, 0, Vec::new()),
    };
    let behavior = inner.registry.make(&key.kind, snapshot.as_ref())?;
    if !outbox.is_empty() {
        debug!(entity = %key, pending = outbox.len(), "redelivering outbox signals");
        for signal in outbox {
            inner.deliver(signal);
        }
        let cleared = EntityRecord {
            seq,
            state: behavior.snapshot()?,
            outbox: Vec::new(),
        };
        inner.store.save_entity(key, &cleared).await?;
    }
    Ok(Loaded { behavior, seq })
}

/// Run one operation as an atomic transition: apply on a scratch copy,
/// checkpoint state + outgoing signals in one record, then deliver the
/// signals and clear the outbox. The checkpoint is durable before the result
/// is released to the caller.
async fn execute(
    inner: &Arc<Inner>,
    key: &EntityKey,
    state: &mut Loaded,
    operation: &str,
    input: Value,
) -> Result<Value> {
    let mut scratch = state.behavior.boxed_clone();
    let mut effects = Effects::default();
    let value = scratch.apply(key, operation, input, &mut effects)?;
    let signals = effects.into_signals();

    let record = EntityRecord {
        seq: state.seq + 1,
        state: scratch.snapshot()?,
        outbox: signals.clone(),
    };
    inner.store.save_entity(key, &record).await?;
    state.behavior = scratch;
    state.seq += 1;

    if !signals.is_empty() {
        for signal in signals {
            inner.deliver(signal);
        }
        let cleared = EntityRecord {
            seq: state.seq,
            state: state.behavior.snapshot()?,
            outbox: Vec::new(),
        };
        // Delivery already happened; a failed clear only means redelivery
        // on the next activation, which receivers must tolerate anyway.
        if let Err(err) = inner.store.save_entity(key, &cleared).await {
            warn!(entity = %key, error = %err, "failed to clear signal outbox");
        }
    }
    Ok(value)
}
