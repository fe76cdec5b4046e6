// ============================================================================
// Durentity Library
// ============================================================================
//
// Exclusive, atomic pairings between single-writer entities, coordinated by
// replayable workflows:
//
// - every entity `(kind, id)` processes operations one at a time, in arrival
//   order, checkpointing durably before a result is released;
// - workflows acquire scoped locks over arbitrary entity sets, always in
//   global key order, so overlapping requests cannot deadlock;
// - every workflow suspension point is recorded in an append-only history,
//   and re-executing the workflow against that history reproduces its
//   decisions without duplicating side effects;
// - entities notify each other with fire-and-forget signals resolved at the
//   receiver (stale location pings are discarded, not errors).

pub mod core;
pub mod entity;
pub mod facade;
pub mod lock;
pub mod orchestration;
pub mod persist;
pub mod server;
pub mod tracking;

// Re-export main types for convenience
pub use crate::core::{CoordError, EntityKey, InstanceId, Result};
pub use entity::{Effects, EntityRuntime, EntityState, Signal};
pub use facade::Coordinator;
pub use lock::{LockManager, LockOwner, LockSet};
pub use orchestration::{
    HistoryEvent, InstanceState, InstanceStatus, OrchestrationContext, WorkflowRuntime,
};
pub use persist::{EntityRecord, FileStore, MemoryStore, Store};
