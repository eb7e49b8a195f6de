//! Checkpointable workflow state.
//!
//! The engine is generic over the state it drives. A state type carries its
//! own [`Cursor`] (the engine's bookkeeping) and exposes enough structure for
//! the engine to enforce the node contract: which fields changed, and whether a
//! single step kept the domain invariants.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Position name used before any node has completed.
pub const START: &str = "__start__";

/// Engine bookkeeping persisted with every checkpoint.
///
/// `current_node` is the last node that completed for this instance. The engine
/// derives the next node from it and the graph, so a checkpoint is resumable
/// without any in-memory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub current_node: String,
    pub pending_interrupt: bool,
    /// End label once the workflow reached a terminal edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<String>,
}

impl Cursor {
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn at_start(&self) -> bool {
        self.current_node == START
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            current_node: START.to_string(),
            pending_interrupt: false,
            terminal: None,
        }
    }
}

/// A state value the engine can checkpoint, diff and validate.
pub trait WorkflowState:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Identifier of a user-visible field, used in node write declarations.
    type Field: Copy + Eq + Debug + Display + Send + Sync + 'static;

    /// Stable identifier of this workflow instance (the checkpoint key).
    fn workflow_id(&self) -> &str;

    fn cursor(&self) -> &Cursor;

    fn cursor_mut(&mut self) -> &mut Cursor;

    /// Fields whose value differs between `before` and `self`.
    /// The cursor is not a field and must never be reported here.
    fn changed_fields(&self, before: &Self) -> Vec<Self::Field>;

    /// Invariants a fresh instance must satisfy before its first checkpoint.
    fn check_initial(&self) -> Result<(), String> {
        Ok(())
    }

    /// Invariants that must hold between the state a node received and the
    /// state it returned.
    fn check_step(&self, before: &Self) -> Result<(), String>;

    /// Invariants that must hold across an out-of-band patch.
    fn check_patch(&self, before: &Self) -> Result<(), String>;
}
