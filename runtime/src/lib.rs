//! Escrowflow runtime.
//!
//! * [`Workflow`]: validated node graph with halt points and routing.
//! * [`Engine`]: runs one node and enforces the node contract.
//! * [`CheckpointStore`]: persisted state, one document per instance.
//! * [`Driver`]: start/resume/patch loop with per-instance exclusion.

pub mod driver;
pub mod engine;
pub mod persistence;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use driver::{Driver, DriverError, RunReport, RunResult};
pub use engine::{Engine, EngineError, Step};
pub use persistence::{
    CheckpointError, CheckpointStore, InMemoryCheckpointStore, JsonFileCheckpointStore, Patch,
    apply_patch,
};
pub use workflow::{GraphError, Target, Workflow, WorkflowBuilder};

pub mod prelude {
    pub use crate::driver::{Driver, DriverError, RunReport, RunResult};
    pub use crate::engine::{Engine, EngineError, Step};
    pub use crate::persistence::{CheckpointStore, Patch};
    pub use crate::workflow::{Target, Workflow};
}
