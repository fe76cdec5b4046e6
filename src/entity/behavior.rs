use crate::core::{CoordError, EntityKey, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ============================================================================
// Signals and Effects
// ============================================================================

/// Fire-and-forget message from one entity to another. Committed together
/// with the emitting operation's state mutation, delivered afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub target: EntityKey,
    pub operation: String,
    pub payload: Value,
}

/// Side effects collected while an operation runs. The runtime commits the
/// state mutation and these signals in one checkpoint, so a crash cannot
/// apply one without the other.
#[derive(Default)]
pub struct Effects {
    signals: Vec<Signal>,
}

impl Effects {
    pub fn signal(&mut self, target: EntityKey, operation: impl Into<String>, payload: Value) {
        self.signals.push(Signal {
            target,
            operation: operation.into(),
            payload,
        });
    }

    pub(crate) fn into_signals(self) -> Vec<Signal> {
        self.signals
    }
}

// ============================================================================
// Entity State Trait
// ============================================================================

/// A typed entity behavior. State is a plain serde struct; every operation is
/// a pure transition over it. The runtime applies operations to a scratch
/// copy and commits only on success, so a failed operation leaves no partial
/// mutation behind.
pub trait EntityState: Serialize + DeserializeOwned + Default + Clone + Send + 'static {
    const KIND: &'static str;

    /// `key` is the entity's own address, for signal targets and error
    /// payloads that mention it.
    fn apply(
        &mut self,
        key: &EntityKey,
        operation: &str,
        input: Value,
        effects: &mut Effects,
    ) -> Result<Value>;
}

// ============================================================================
// Type-erased behavior + registry
// ============================================================================

pub(crate) trait Behavior: Send {
    fn snapshot(&self) -> Result<Value>;
    fn apply(
        &mut self,
        key: &EntityKey,
        operation: &str,
        input: Value,
        effects: &mut Effects,
    ) -> Result<Value>;
    fn boxed_clone(&self) -> Box<dyn Behavior>;
}

struct Typed<S: EntityState>(S);

impl<S: EntityState> Behavior for Typed<S> {
    fn snapshot(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.0)?)
    }

    fn apply(
        &mut self,
        key: &EntityKey,
        operation: &str,
        input: Value,
        effects: &mut Effects,
    ) -> Result<Value> {
        self.0.apply(key, operation, input, effects)
    }

    fn boxed_clone(&self) -> Box<dyn Behavior> {
        Box::new(Typed(self.0.clone()))
    }
}

type Factory = Arc<dyn Fn(Option<&Value>) -> Result<Box<dyn Behavior>> + Send + Sync>;

#[derive(Default)]
pub(crate) struct Registry {
    factories: Mutex<HashMap<String, Factory>>,
}

impl Registry {
    pub(crate) fn register<S: EntityState>(&self) {
        let factory: Factory = Arc::new(|snapshot| {
            let state = match snapshot {
                Some(value) => serde_json::from_value::<S>(value.clone())?,
                None => S::default(),
            };
            Ok(Box::new(Typed(state)) as Box<dyn Behavior>)
        });
        self.factories
            .lock()
            .expect("registry poisoned")
            .insert(S::KIND.to_string(), factory);
    }

    pub(crate) fn make(&self, kind: &str, snapshot: Option<&Value>) -> Result<Box<dyn Behavior>> {
        let factory = self
            .factories
            .lock()
            .expect("registry poisoned")
            .get(kind)
            .cloned()
            .ok_or_else(|| CoordError::UnknownEntityKind(kind.to_string()))?;
        factory(snapshot)
    }
}
