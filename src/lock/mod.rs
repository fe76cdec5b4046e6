//! Multi-entity lock manager.
//!
//! A workflow strand acquires an arbitrary set of entity keys as one scoped
//! reservation. Keys are always acquired in their global `(kind, id)` order
//! regardless of how the caller listed them, so two strands contending for
//! overlapping sets can never wait on each other in a cycle.
//!
//! The table lives behind a `std::sync::Mutex` (never held across an await)
//! so that `LockSet::drop` can release synchronously on every exit path,
//! including cancellation.

use crate::core::{EntityKey, InstanceId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::trace;

/// Identity that holds entity locks: one strand of one workflow instance.
///
/// Nested lock scopes on the same strand are re-entrant; sibling strands of
/// the same instance exclude each other exactly like distinct instances do,
/// since concurrent strands offer no mutual exclusion of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockOwner {
    pub instance: InstanceId,
    pub branch: u64,
}

impl LockOwner {
    pub fn new(instance: InstanceId, branch: u64) -> Self {
        Self { instance, branch }
    }

    /// Owner identity for the root strand of an instance.
    pub fn root(instance: InstanceId) -> Self {
        Self::new(instance, 0)
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.instance, self.branch)
    }
}

#[derive(Default)]
struct KeyLock {
    owner: Option<LockOwner>,
    /// Re-entrant acquisitions by the owning strand.
    depth: u32,
    /// Strands waiting to take ownership, in arrival order. Ownership is
    /// handed to the front waiter on release.
    acquirers: VecDeque<(LockOwner, oneshot::Sender<()>)>,
    /// Dispatches waiting for the key to become admissible for their caller.
    /// Notified on every release; each re-checks and re-registers if still
    /// blocked.
    admitters: Vec<oneshot::Sender<()>>,
}

impl KeyLock {
    fn is_idle(&self) -> bool {
        self.owner.is_none() && self.acquirers.is_empty() && self.admitters.is_empty()
    }
}

enum Claim {
    Claimed,
    Wait(oneshot::Receiver<()>),
}

#[derive(Default)]
pub struct LockManager {
    table: Mutex<HashMap<EntityKey, KeyLock>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key in `keys` for `owner`, in global key order,
    /// suspending per key until it is free. Keys already held by `owner`
    /// are counted re-entrantly instead of waited on.
    ///
    /// The returned scope releases everything on drop. Acquisition is
    /// incremental under the hood, but a partially built scope is released
    /// just the same if the future is dropped mid-way, so no strand is ever
    /// left holding a subset. A hand-off that lands in the instant before
    /// such a drop is given back by the wait guard.
    pub async fn acquire_all(self: &Arc<Self>, owner: &LockOwner, keys: &[EntityKey]) -> LockSet {
        let mut sorted: Vec<EntityKey> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut set = LockSet {
            mgr: Arc::clone(self),
            owner: owner.clone(),
            keys: Vec::with_capacity(sorted.len()),
        };
        for key in sorted {
            loop {
                match self.try_claim(owner, &key) {
                    Claim::Claimed => break,
                    Claim::Wait(rx) => {
                        let mut guard = WaitGuard {
                            mgr: self,
                            owner,
                            key: &key,
                            armed: true,
                        };
                        let granted = rx.await.is_ok();
                        guard.armed = false;
                        if granted {
                            // Ownership was transferred to us on release.
                            break;
                        }
                        // Waker was discarded; re-contend.
                    }
                }
            }
            trace!(owner = %owner, key = %key, "lock acquired");
            set.keys.push(key);
        }
        set
    }

    fn try_claim(&self, owner: &LockOwner, key: &EntityKey) -> Claim {
        let mut table = self.table.lock().expect("lock table poisoned");
        let kl = table.entry(key.clone()).or_default();
        match &kl.owner {
            None => {
                kl.owner = Some(owner.clone());
                kl.depth = 1;
                Claim::Claimed
            }
            Some(current) if current == owner => {
                kl.depth += 1;
                Claim::Claimed
            }
            Some(_) => {
                let (tx, rx) = oneshot::channel();
                kl.acquirers.push_back((owner.clone(), tx));
                Claim::Wait(rx)
            }
        }
    }

    /// Deliver a dispatch to an entity's mailbox if the key is unlocked or
    /// locked by `caller`; otherwise register a wakeup and return the
    /// receiver so the dispatcher can retry. Admission check and delivery
    /// happen under the table mutex, so a lock acquired after this call
    /// cannot cut in front of an already-admitted envelope.
    pub(crate) fn admit_or_wait<F: FnOnce()>(
        &self,
        caller: Option<&LockOwner>,
        key: &EntityKey,
        deliver: F,
    ) -> Option<oneshot::Receiver<()>> {
        let mut table = self.table.lock().expect("lock table poisoned");
        let admissible = match table.get(key).and_then(|kl| kl.owner.as_ref()) {
            None => true,
            Some(holder) => caller == Some(holder),
        };
        if admissible {
            deliver();
            if let Some(kl) = table.get(key) {
                if kl.is_idle() {
                    table.remove(key);
                }
            }
            None
        } else {
            let (tx, rx) = oneshot::channel();
            table
                .entry(key.clone())
                .or_default()
                .admitters
                .push(tx);
            Some(rx)
        }
    }

    fn release(&self, owner: &LockOwner, key: &EntityKey) {
        let mut table = self.table.lock().expect("lock table poisoned");
        let Some(kl) = table.get_mut(key) else {
            return;
        };
        if kl.owner.as_ref() != Some(owner) {
            // Released twice or never held; nothing to do.
            return;
        }
        kl.depth -= 1;
        if kl.depth > 0 {
            return;
        }
        kl.owner = None;
        Self::hand_off(kl);
        if kl.is_idle() {
            table.remove(key);
        }
        trace!(owner = %owner, key = %key, "lock released");
    }

    /// Under the table mutex: hand ownership to the next live acquirer in
    /// arrival order, then wake every pending admission so it can re-check
    /// against the (possibly new) owner.
    fn hand_off(kl: &mut KeyLock) {
        while let Some((next, tx)) = kl.acquirers.pop_front() {
            if tx.send(()).is_ok() {
                kl.owner = Some(next);
                kl.depth = 1;
                break;
            }
        }
        for tx in kl.admitters.drain(..) {
            let _ = tx.send(());
        }
    }

    #[cfg(test)]
    fn holder(&self, key: &EntityKey) -> Option<LockOwner> {
        self.table
            .lock()
            .unwrap()
            .get(key)
            .and_then(|kl| kl.owner.clone())
    }
}

/// Armed while a claim waits in the acquirer queue. If the waiting future is
/// dropped, the stale queue entry is removed and a hand-off that already
/// transferred ownership to this waiter is undone, so a cancelled wait can
/// never strand the key.
struct WaitGuard<'a> {
    mgr: &'a LockManager,
    owner: &'a LockOwner,
    key: &'a EntityKey,
    armed: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut table = self.mgr.table.lock().expect("lock table poisoned");
        let Some(kl) = table.get_mut(self.key) else {
            return;
        };
        kl.acquirers.retain(|(queued, _)| queued != self.owner);
        if kl.owner.as_ref() == Some(self.owner) {
            // Release raced with this drop and handed the key over; give it
            // straight to the next waiter instead.
            kl.owner = None;
            kl.depth = 0;
            LockManager::hand_off(kl);
        }
        if kl.is_idle() {
            table.remove(self.key);
        }
    }
}

// ============================================================================
// Lock Scope
// ============================================================================

/// Exclusive reservation over a set of entity keys, released on drop.
pub struct LockSet {
    mgr: Arc<LockManager>,
    owner: LockOwner,
    keys: Vec<EntityKey>,
}

impl LockSet {
    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        for key in self.keys.drain(..) {
            self.mgr.release(&self.owner, &key);
        }
    }
}
