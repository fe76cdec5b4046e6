// ============================================================================
// Orchestration Scheduler
// ============================================================================
//
// Workflow code runs as an ordinary async function, but every runtime
// primitive it awaits (entity call, lock scope, guid) is recorded in an
// append-only history. Re-executing the function against that history
// reproduces the original decisions without re-issuing completed side
// effects.

pub mod context;
pub mod history;
pub mod runtime;

pub use context::OrchestrationContext;
pub use history::{EventId, HistoryEvent};
pub use runtime::{InstanceState, InstanceStatus, WorkflowRuntime};
