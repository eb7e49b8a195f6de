//! # Telemetry: Observability Decorators
//!
//! The workflow builder wraps every node in [`Traced`], so each attempt runs
//! inside a `Node` span carrying the workflow, node and instance id.

use crate::bus::Bus;
use crate::outcome::Outcome;
use crate::state::WorkflowState;
use crate::transition::Transition;
use async_trait::async_trait;

/// A wrapper Transition that adds tracing to any inner Transition.
#[derive(Clone)]
pub struct Traced<T> {
    inner: T,
    workflow: String,
    node: String,
}

impl<T> Traced<T> {
    pub fn new(inner: T, workflow: &str, node: &str) -> Self {
        Self {
            inner,
            workflow: workflow.to_string(),
            node: node.to_string(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T, S> Transition<S> for Traced<T>
where
    T: Transition<S>,
    S: WorkflowState,
{
    type Error = T::Error;
    type Resources = T::Resources;

    fn writes(&self) -> &'static [S::Field] {
        self.inner.writes()
    }

    fn description(&self) -> Option<String> {
        self.inner.description()
    }

    async fn run(
        &self,
        input: S,
        resources: &Self::Resources,
        bus: &mut Bus,
    ) -> Outcome<S, Self::Error> {
        use tracing::{Instrument, info_span};

        let attempt = bus
            .context()
            .map(|ctx| ctx.attempt_id.to_string())
            .unwrap_or_default();
        let span = info_span!(
            "Node",
            escrowflow.workflow = %self.workflow,
            escrowflow.node = %self.node,
            escrowflow.instance = %input.workflow_id(),
            escrowflow.attempt = %attempt,
        );

        async move {
            tracing::debug!(cursor = ?input.cursor(), "Entering node transition");
            let start = std::time::Instant::now();

            let result = self.inner.run(input, resources, bus).await;

            let duration = start.elapsed();
            match &result {
                Outcome::Next(_) => {
                    tracing::info!(?duration, "Transition completed: Next");
                }
                Outcome::Fault(e) => {
                    tracing::error!(error = %e, ?duration, "Transition failed: Fault");
                }
            }
            result
        }
        .instrument(span)
        .await
    }
}
