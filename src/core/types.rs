use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Entity Key
// ============================================================================

/// Address of a single-writer entity: `(kind, id)`.
///
/// The derived ordering (kind first, then id) is the global lock order used
/// by the lock manager; every multi-entity acquisition sorts by it, which is
/// what rules out circular waits between overlapping lock sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.id)
    }
}

// ============================================================================
// Workflow Instance Id
// ============================================================================

/// Identifier of one workflow instance. Keys the instance's history and
/// status in the store; together with a branch number it forms the lock
/// owner identity of each strand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for InstanceId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for InstanceId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_keys_order_by_kind_then_id() {
        let a = EntityKey::new("order", "zzz");
        let b = EntityKey::new("tracker", "aaa");
        let c = EntityKey::new("tracker", "bbb");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn entity_key_display_is_kind_at_id() {
        assert_eq!(EntityKey::new("tracker", "t-1").to_string(), "tracker@t-1");
    }
}
