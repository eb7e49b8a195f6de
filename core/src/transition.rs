use crate::bus::Bus;
use crate::outcome::Outcome;
use crate::state::WorkflowState;
use async_trait::async_trait;

/// The contract for one node of a workflow.
///
/// A `Transition` turns the state it receives into the next state, or faults.
/// It must only write the fields it lists in [`Transition::writes`]; the engine
/// compares the state before and after and rejects anything else.
#[async_trait]
pub trait Transition<S>: Send + Sync + 'static
where
    S: WorkflowState,
{
    /// Domain-specific error type (e.g., LedgerError, NodeError)
    type Error: std::error::Error + Send + Sync + 'static;

    /// Long-lived collaborators injected by whoever builds the workflow.
    type Resources: Send + Sync + 'static;

    /// Fields this node is allowed to change.
    fn writes(&self) -> &'static [S::Field];

    /// Human readable description for schematic export.
    fn description(&self) -> Option<String> {
        None
    }

    /// Execute the transition
    async fn run(
        &self,
        state: S,
        resources: &Self::Resources,
        bus: &mut Bus,
    ) -> Outcome<S, Self::Error>;
}
