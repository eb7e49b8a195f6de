//! Driver - start, resume and patch resumable workflows.
//!
//! The driver owns the loop around [`Engine::step`]: persist after every node,
//! stop at halt points and terminal edges, and guarantee at most one active
//! call per workflow instance.

use escrowflow_core::state::WorkflowState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::engine::{Engine, EngineError, Step};
use crate::persistence::{CheckpointError, CheckpointStore, Patch};

/// Why a driver call returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum RunResult {
    /// Stopped after the halt point `at_node`; call `resume` to continue.
    Halted { at_node: String },
    /// Reached the terminal edge `end`.
    Terminal { end: String },
}

/// A [`RunResult`] together with the state that was just persisted.
#[derive(Debug, Clone)]
pub struct RunReport<S> {
    pub result: RunResult,
    pub state: S,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("Workflow `{0}` already started")]
    AlreadyStarted(String),

    #[error("Workflow `{id}` cannot start: {reason}")]
    InvalidStart { id: String, reason: String },

    #[error("Workflow `{0}` is busy with another call")]
    Busy(String),

    #[error("Workflow `{id}` cannot be resumed: {reason}")]
    InvalidResumeState { id: String, reason: String },

    #[error("Workflow `{transaction_id}` failed in `{node}`: {cause}")]
    NodeFailed {
        transaction_id: String,
        node: String,
        #[source]
        cause: E,
    },

    #[error(transparent)]
    Engine(EngineError<E>),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Ids with a call in progress.
#[derive(Default)]
struct InFlight {
    ids: Mutex<HashSet<String>>,
}

impl InFlight {
    fn try_acquire(&self, id: &str) -> Option<InFlightGuard<'_>> {
        if self.ids.lock().insert(id.to_string()) {
            Some(InFlightGuard {
                owner: self,
                id: id.to_string(),
            })
        } else {
            None
        }
    }
}

struct InFlightGuard<'a> {
    owner: &'a InFlight,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.ids.lock().remove(&self.id);
    }
}

pub struct Driver<S: WorkflowState, R, E> {
    engine: Engine<S, R, E>,
    store: Arc<dyn CheckpointStore<S>>,
    in_flight: InFlight,
}

impl<S, R, E> Driver<S, R, E>
where
    S: WorkflowState,
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(engine: Engine<S, R, E>, store: Arc<dyn CheckpointStore<S>>) -> Self {
        Self {
            engine,
            store,
            in_flight: InFlight::default(),
        }
    }

    pub fn engine(&self) -> &Engine<S, R, E> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore<S>> {
        &self.store
    }

    fn claim(&self, id: &str) -> Result<InFlightGuard<'_>, DriverError<E>> {
        self.in_flight.try_acquire(id).ok_or_else(|| {
            tracing::warn!(%id, "Rejected concurrent call");
            DriverError::Busy(id.to_string())
        })
    }

    /// Persist `initial` as a fresh checkpoint and run until the first halt
    /// point or terminal edge. An `initial` state that fails
    /// [`WorkflowState::check_initial`] is rejected without a checkpoint.
    pub async fn start(&self, mut initial: S) -> Result<RunReport<S>, DriverError<E>> {
        let id = initial.workflow_id().to_string();
        let _guard = self.claim(&id)?;

        if let Err(reason) = initial.check_initial() {
            tracing::warn!(%id, %reason, "Rejected invalid start");
            return Err(DriverError::InvalidStart { id, reason });
        }

        if self.store.contains(&id).await? {
            tracing::warn!(%id, "Rejected duplicate start");
            return Err(DriverError::AlreadyStarted(id));
        }

        *initial.cursor_mut() = Default::default();
        self.store.save(&id, &initial).await?;
        tracing::info!(%id, workflow = %self.engine.workflow().name(), "Workflow started");
        self.run(&id, initial).await
    }

    /// Continue from the persisted checkpoint. Also retries a node that failed
    /// on an earlier call, since its checkpoint still precedes it.
    pub async fn resume(&self, id: &str) -> Result<RunReport<S>, DriverError<E>> {
        let _guard = self.claim(id)?;

        let Some(state) = self.store.load(id).await? else {
            tracing::warn!(%id, "Resume without checkpoint");
            return Err(DriverError::InvalidResumeState {
                id: id.to_string(),
                reason: "no checkpoint".to_string(),
            });
        };
        if let Some(end) = &state.cursor().terminal {
            tracing::warn!(%id, %end, "Resume of finished workflow");
            return Err(DriverError::InvalidResumeState {
                id: id.to_string(),
                reason: format!("already finished ({end})"),
            });
        }

        tracing::info!(%id, from = %state.cursor().current_node, "Workflow resumed");
        self.run(id, state).await
    }

    /// Apply an out-of-band patch to a checkpoint sitting at `as_of_node`.
    /// Runs nothing.
    pub async fn patch(
        &self,
        id: &str,
        patch: &dyn Patch<S>,
        as_of_node: &str,
    ) -> Result<S, DriverError<E>> {
        let _guard = self.claim(id)?;
        let patched = self.store.patch(id, patch, as_of_node).await?;
        tracing::info!(%id, at = %as_of_node, "Checkpoint patched");
        Ok(patched)
    }

    /// The persisted state, if any. Never blocks on an active call.
    pub async fn state(&self, id: &str) -> Result<Option<S>, DriverError<E>> {
        Ok(self.store.load(id).await?)
    }

    async fn run(&self, id: &str, mut state: S) -> Result<RunReport<S>, DriverError<E>> {
        loop {
            let step = match self.engine.step(state).await {
                Ok(step) => step,
                Err(EngineError::Node { node, source }) => {
                    tracing::error!(%id, %node, error = %source, "Node failed; checkpoint kept");
                    return Err(DriverError::NodeFailed {
                        transaction_id: id.to_string(),
                        node,
                        cause: source,
                    });
                }
                Err(other) => {
                    tracing::error!(%id, error = %other, "Engine rejected step");
                    return Err(DriverError::Engine(other));
                }
            };

            self.store.save(id, step.state()).await?;

            match step {
                Step::Continue { state: next, .. } => state = next,
                Step::Halted { node, state } => {
                    tracing::info!(%id, at = %node, "Workflow halted");
                    return Ok(RunReport {
                        result: RunResult::Halted { at_node: node },
                        state,
                    });
                }
                Step::Finished { end, state, .. } => {
                    tracing::info!(%id, %end, "Workflow finished");
                    return Ok(RunReport {
                        result: RunResult::Terminal { end },
                        state,
                    });
                }
            }
        }
    }
}
