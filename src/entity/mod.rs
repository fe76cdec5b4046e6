// ============================================================================
// Entity Runtime
// ============================================================================
//
// Each entity key gets a dedicated worker task draining an unbounded mailbox,
// which is what makes entity execution single-writer: at most one operation
// runs at a time per key, in strict arrival order.

pub mod behavior;
pub mod runtime;

pub use behavior::{Effects, EntityState, Signal};
pub use runtime::EntityRuntime;
