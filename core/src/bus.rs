//! Bus - Per-Execution Context Injection
//!
//! Long-lived collaborators (ledger gateway, reasoning client, policy) reach a
//! node through its `Resources`. The Bus carries what only exists for a single
//! node attempt: the [`ExecutionContext`] the engine writes before dispatch and
//! anything a node wants to hand to its decorators.
//!
//! Values are keyed by type. There are no string keys.

use chrono::{DateTime, Utc};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use uuid::Uuid;

/// Type-keyed value container for one node attempt.
#[derive(Default)]
pub struct Bus {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Bus {
    /// Create an empty Bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Bus pre-loaded with the execution context of a node attempt.
    pub fn for_attempt(context: ExecutionContext) -> Self {
        let mut bus = Self::new();
        bus.insert(context);
        bus
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    /// Remove a value, returning it if present.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// The context of the current node attempt, if the engine provided one.
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.get::<ExecutionContext>()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("value_count", &self.values.len())
            .finish()
    }
}

/// Identifies one attempt to run one node for one workflow instance.
///
/// `attempt_id` is fresh for every dispatch, so a retried node gets a new id
/// while `workflow_id` stays stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub attempt_id: Uuid,
    pub workflow: String,
    pub workflow_id: String,
    pub node: String,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(
        workflow: impl Into<String>,
        workflow_id: impl Into<String>,
        node: impl Into<String>,
    ) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            workflow: workflow.into(),
            workflow_id: workflow_id.into(),
            node: node.into(),
            started_at: Utc::now(),
        }
    }
}
