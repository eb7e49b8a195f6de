//! Engine - one node at a time.
//!
//! `Engine::step` picks the node after the cursor, runs it and checks the
//! result against the node contract before advancing the cursor. It never
//! persists anything; that is the driver's job.

use escrowflow_core::bus::{Bus, ExecutionContext};
use escrowflow_core::outcome::Outcome;
use escrowflow_core::state::WorkflowState;

use crate::workflow::{Target, Workflow};

/// Result of one successful step. Every variant carries the state with the
/// cursor already advanced past `node`.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<S> {
    /// The driver may run the next node right away.
    Continue { node: String, state: S },
    /// `node` is a halt point; control goes back to the caller.
    Halted { node: String, state: S },
    /// The workflow reached a terminal edge labelled `end`.
    Finished { node: String, end: String, state: S },
}

impl<S> Step<S> {
    pub fn node(&self) -> &str {
        match self {
            Step::Continue { node, .. }
            | Step::Halted { node, .. }
            | Step::Finished { node, .. } => node,
        }
    }

    pub fn state(&self) -> &S {
        match self {
            Step::Continue { state, .. }
            | Step::Halted { state, .. }
            | Step::Finished { state, .. } => state,
        }
    }

    pub fn into_state(self) -> S {
        match self {
            Step::Continue { state, .. }
            | Step::Halted { state, .. }
            | Step::Finished { state, .. } => state,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error("Node `{node}` failed: {source}")]
    Node {
        node: String,
        #[source]
        source: E,
    },

    #[error("Node `{node}` wrote undeclared fields: {}", .fields.join(", "))]
    UndeclaredMutation { node: String, fields: Vec<String> },

    #[error("Node `{node}` broke an invariant: {reason}")]
    InvariantViolation { node: String, reason: String },

    #[error("No route out of `{node}` for key `{key}`")]
    NoRoute { node: String, key: String },

    #[error("Checkpoint refers to unknown node `{0}`")]
    UnknownNode(String),

    #[error("Workflow already finished ({end})")]
    AlreadyTerminal { end: String },
}

/// Step executor over a validated [`Workflow`] and its shared resources.
pub struct Engine<S: WorkflowState, R, E> {
    workflow: Workflow<S, R, E>,
    resources: R,
}

impl<S, R, E> Engine<S, R, E>
where
    S: WorkflowState,
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(workflow: Workflow<S, R, E>, resources: R) -> Self {
        Self {
            workflow,
            resources,
        }
    }

    pub fn workflow(&self) -> &Workflow<S, R, E> {
        &self.workflow
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    /// The node that will run next for `state`, derived from the cursor and
    /// the graph only.
    pub fn next_node(&self, state: &S) -> Result<String, EngineError<E>> {
        let cursor = state.cursor();
        if let Some(end) = &cursor.terminal {
            return Err(EngineError::AlreadyTerminal { end: end.clone() });
        }
        if cursor.at_start() {
            return Ok(self.workflow.entry().to_string());
        }
        match self.target_after(&cursor.current_node, state)? {
            Target::Node(next) => Ok(next),
            Target::End(end) => Err(EngineError::AlreadyTerminal { end }),
        }
    }

    fn target_after(&self, node: &str, state: &S) -> Result<Target, EngineError<E>> {
        match self.workflow.resolve(node, state) {
            None => Err(EngineError::UnknownNode(node.to_string())),
            Some(Err(key)) => Err(EngineError::NoRoute {
                node: node.to_string(),
                key,
            }),
            Some(Ok(target)) => Ok(target),
        }
    }

    /// Run exactly one node.
    ///
    /// On any error the input state is dropped unchanged from the caller's
    /// point of view: nothing the node produced is returned.
    pub async fn step(&self, state: S) -> Result<Step<S>, EngineError<E>> {
        let node = self.next_node(&state)?;
        let spec = self
            .workflow
            .nodes
            .get(&node)
            .ok_or_else(|| EngineError::UnknownNode(node.clone()))?;

        let before = state.clone();
        let mut bus = Bus::for_attempt(ExecutionContext::new(
            self.workflow.name(),
            before.workflow_id(),
            node.as_str(),
        ));

        let mut after = match (spec.executor)(state, &self.resources, &mut bus).await {
            Outcome::Next(next) => next,
            Outcome::Fault(source) => return Err(EngineError::Node { node, source }),
        };

        if after.workflow_id() != before.workflow_id() || after.cursor() != before.cursor() {
            return Err(EngineError::InvariantViolation {
                node,
                reason: "node changed engine bookkeeping".to_string(),
            });
        }

        let undeclared: Vec<String> = after
            .changed_fields(&before)
            .into_iter()
            .filter(|field| !spec.writes.contains(field))
            .map(|field| field.to_string())
            .collect();
        if !undeclared.is_empty() {
            tracing::error!(%node, fields = ?undeclared, "Node wrote undeclared fields");
            return Err(EngineError::UndeclaredMutation {
                node,
                fields: undeclared,
            });
        }

        if let Err(reason) = after.check_step(&before) {
            tracing::error!(%node, %reason, "Node broke a state invariant");
            return Err(EngineError::InvariantViolation { node, reason });
        }

        let target = self.target_after(&node, &after)?;
        let cursor = after.cursor_mut();
        cursor.current_node = node.clone();
        cursor.pending_interrupt = false;

        Ok(match target {
            Target::End(end) => {
                cursor.terminal = Some(end.clone());
                Step::Finished {
                    node,
                    end,
                    state: after,
                }
            }
            Target::Node(_) if spec.halts_after => {
                cursor.pending_interrupt = true;
                Step::Halted { node, state: after }
            }
            Target::Node(_) => Step::Continue { node, state: after },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Bump, Mute, Probe, Scribble, Tally, TallyError};
    use escrowflow_core::state::START;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn engine(probe: Arc<Probe>) -> Engine<Tally, Arc<Probe>, TallyError> {
        let workflow = Workflow::builder("tally")
            .node("first", Bump)
            .interrupt_node("second", Bump)
            .node("third", Bump)
            .entry("first")
            .edge("first", Target::node("second"))
            .edge("second", Target::node("third"))
            .edge("third", Target::end("done"))
            .build()
            .unwrap();
        Engine::new(workflow, probe)
    }

    #[tokio::test]
    async fn walks_continue_halt_finish() {
        let engine = engine(Arc::new(Probe::default()));
        let state = Tally::new("t-1");
        assert_eq!(engine.next_node(&state).unwrap(), "first");

        let step = engine.step(state).await.unwrap();
        assert!(matches!(step, Step::Continue { ref node, .. } if node == "first"));
        assert_eq!(step.state().cursor.current_node, "first");

        let step = engine.step(step.into_state()).await.unwrap();
        assert!(matches!(step, Step::Halted { .. }));
        assert!(step.state().cursor.pending_interrupt);

        let step = engine.step(step.into_state()).await.unwrap();
        let Step::Finished { end, state, .. } = step else {
            panic!("expected finish");
        };
        assert_eq!(end, "done");
        assert_eq!(state.value, 3);
        assert!(!state.cursor.pending_interrupt);
        assert_eq!(state.cursor.terminal.as_deref(), Some("done"));

        assert!(matches!(
            engine.step(state).await,
            Err(EngineError::AlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn fault_names_the_node() {
        let probe = Arc::new(Probe::default());
        probe.fail.store(true, Ordering::SeqCst);
        let engine = engine(probe);

        let err = engine.step(Tally::new("t-1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Node { ref node, .. } if node == "first"));
    }

    #[tokio::test]
    async fn rejects_undeclared_writes() {
        let workflow = Workflow::builder("tally")
            .node("scribble", Scribble)
            .entry("scribble")
            .edge("scribble", Target::end("done"))
            .build()
            .unwrap();
        let engine = Engine::new(workflow, Arc::new(Probe::default()));

        let err = engine.step(Tally::new("t-1")).await.unwrap_err();
        match err {
            EngineError::UndeclaredMutation { node, fields } => {
                assert_eq!(node, "scribble");
                assert_eq!(fields, vec!["note".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_steps_without_a_log_entry() {
        let workflow = Workflow::builder("tally")
            .node("mute", Mute)
            .entry("mute")
            .edge("mute", Target::end("done"))
            .build()
            .unwrap();
        let engine = Engine::new(workflow, Arc::new(Probe::default()));

        assert!(matches!(
            engine.step(Tally::new("t-1")).await,
            Err(EngineError::InvariantViolation { .. })
        ));
    }

    #[tokio::test]
    async fn routes_on_state_and_reports_missing_arms() {
        let workflow = Workflow::builder("tally")
            .node("bump", Bump)
            .entry("bump")
            .route(
                "bump",
                |s: &Tally| s.value.to_string(),
                [("1", Target::end("one"))],
            )
            .build()
            .unwrap();
        let engine = Engine::new(workflow, Arc::new(Probe::default()));

        let step = engine.step(Tally::new("t-1")).await.unwrap();
        assert!(matches!(step, Step::Finished { ref end, .. } if end == "one"));

        let mut second = Tally::new("t-2");
        second.value = 5;
        assert!(matches!(
            engine.step(second).await,
            Err(EngineError::NoRoute { ref key, .. }) if key == "6"
        ));
    }

    #[tokio::test]
    async fn unknown_cursor_position() {
        let engine = engine(Arc::new(Probe::default()));
        let mut state = Tally::new("t-1");
        state.cursor.current_node = "retired".into();
        assert!(matches!(
            engine.next_node(&state),
            Err(EngineError::UnknownNode(ref n)) if n == "retired"
        ));
        state.cursor.current_node = START.into();
        assert_eq!(engine.next_node(&state).unwrap(), "first");
    }
}
