//! Escrowflow core - typed workflow primitives.
//!
//! This crate is protocol-agnostic: no storage, no networking. It defines the
//! node contract ([`Transition`]), the result of a node ([`Outcome`]), the
//! checkpointable state contract ([`WorkflowState`], [`Cursor`]) and the
//! static graph view ([`Schematic`]).

pub mod bus;
pub mod outcome;
pub mod schematic;
pub mod state;
pub mod synapse;
pub mod telemetry;
pub mod transition;

pub use bus::{Bus, ExecutionContext};
pub use outcome::Outcome;
pub use schematic::Schematic;
pub use state::{Cursor, START, WorkflowState};
pub use synapse::Synapse;
pub use telemetry::Traced;
pub use transition::Transition;

pub mod prelude {
    pub use crate::bus::{Bus, ExecutionContext};
    pub use crate::outcome::Outcome;
    pub use crate::schematic::{Edge, EdgeType, Node, NodeKind, Schematic};
    pub use crate::state::{Cursor, START, WorkflowState};
    pub use crate::synapse::Synapse;
    pub use crate::transition::Transition;
    pub use async_trait::async_trait;
}
