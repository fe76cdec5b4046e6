// ============================================================================
// Core Types and Errors
// ============================================================================

pub mod error;
pub mod types;

pub use error::{CoordError, Result};
pub use types::{EntityKey, InstanceId};
