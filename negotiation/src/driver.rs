//! Start/resume/patch facade over the generic runtime driver.

use escrowflow_compliance::ComplianceStatus;
use escrowflow_core::schematic::Schematic;
use escrowflow_runtime::{
    CheckpointStore, Driver, DriverError, Engine, GraphError, RunReport,
    RunResult as EngineResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::NodeError;
use crate::resources::NegotiationResources;
use crate::state::{InitialFacts, NegotiationPatch, NegotiationState};
use crate::workflow::build_workflow;

pub type NegotiationError = DriverError<NodeError>;

/// Why a driver call returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum RunResult {
    /// Waiting for an external `resume` after `at_node`.
    Halted { at_node: String },
    /// Finished through the `end` edge with `final_status`.
    Terminal {
        end: String,
        final_status: ComplianceStatus,
    },
}

/// A [`RunResult`] and the state just persisted for the transaction.
#[derive(Debug, Clone)]
pub struct Negotiation {
    pub result: RunResult,
    pub state: NegotiationState,
}

impl From<RunReport<NegotiationState>> for Negotiation {
    fn from(report: RunReport<NegotiationState>) -> Self {
        let result = match report.result {
            EngineResult::Halted { at_node } => RunResult::Halted { at_node },
            EngineResult::Terminal { end } => RunResult::Terminal {
                end,
                final_status: report.state.compliance_status,
            },
        };
        Self {
            result,
            state: report.state,
        }
    }
}

pub struct NegotiationDriver {
    inner: Driver<NegotiationState, NegotiationResources, NodeError>,
}

impl NegotiationDriver {
    pub fn new(
        resources: NegotiationResources,
        store: Arc<dyn CheckpointStore<NegotiationState>>,
    ) -> Result<Self, GraphError> {
        let engine = Engine::new(build_workflow()?, resources);
        Ok(Self {
            inner: Driver::new(engine, store),
        })
    }

    pub fn resources(&self) -> &NegotiationResources {
        self.inner.engine().resources()
    }

    pub fn schematic(&self) -> &Schematic {
        self.inner.engine().workflow().schematic()
    }

    /// Open a new transaction and run it to the first halt point or end.
    pub async fn start(
        &self,
        transaction_id: &str,
        facts: InitialFacts,
    ) -> Result<Negotiation, NegotiationError> {
        let initial = NegotiationState::new(transaction_id, facts);
        self.inner.start(initial).await.map(Negotiation::from)
    }

    /// Continue from the stored checkpoint.
    pub async fn resume(&self, transaction_id: &str) -> Result<Negotiation, NegotiationError> {
        self.inner.resume(transaction_id).await.map(Negotiation::from)
    }

    /// Merge out-of-band facts into a checkpoint halted at `as_of_node`.
    pub async fn patch(
        &self,
        transaction_id: &str,
        patch: &NegotiationPatch,
        as_of_node: &str,
    ) -> Result<NegotiationState, NegotiationError> {
        self.inner.patch(transaction_id, patch, as_of_node).await
    }

    pub async fn state(
        &self,
        transaction_id: &str,
    ) -> Result<Option<NegotiationState>, NegotiationError> {
        self.inner.state(transaction_id).await
    }

    pub async fn list(&self) -> Result<Vec<String>, NegotiationError> {
        Ok(self.inner.store().list().await?)
    }
}
