//! A tiny workflow state for exercising the runtime without a domain.

use escrowflow_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub id: String,
    pub value: i64,
    pub note: Option<String>,
    pub log: Vec<String>,
    #[serde(flatten)]
    pub cursor: Cursor,
}

impl Tally {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            value: 0,
            note: None,
            log: Vec::new(),
            cursor: Cursor::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyField {
    Value,
    Note,
    Log,
}

impl fmt::Display for TallyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TallyField::Value => "value",
            TallyField::Note => "note",
            TallyField::Log => "log",
        })
    }
}

impl WorkflowState for Tally {
    type Field = TallyField;

    fn workflow_id(&self) -> &str {
        &self.id
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn changed_fields(&self, before: &Self) -> Vec<TallyField> {
        let mut changed = Vec::new();
        if self.value != before.value {
            changed.push(TallyField::Value);
        }
        if self.note != before.note {
            changed.push(TallyField::Note);
        }
        if self.log != before.log {
            changed.push(TallyField::Log);
        }
        changed
    }

    fn check_initial(&self) -> Result<(), String> {
        if self.value < 0 {
            return Err(format!("negative start value {}", self.value));
        }
        Ok(())
    }

    fn check_step(&self, before: &Self) -> Result<(), String> {
        if self.log.len() != before.log.len() + 1 || !self.log.starts_with(&before.log) {
            return Err("log must grow by exactly one entry".into());
        }
        if self.value < before.value {
            return Err("value must not decrease".into());
        }
        Ok(())
    }

    fn check_patch(&self, before: &Self) -> Result<(), String> {
        if self.log != before.log {
            return Err("log is not patchable".into());
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("tally failed: {0}")]
pub struct TallyError(pub String);

/// Knobs shared by the test nodes.
#[derive(Default)]
pub struct Probe {
    pub runs: AtomicUsize,
    pub fail: AtomicBool,
    pub entered: Notify,
    pub gate: Option<Semaphore>,
}

impl Probe {
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        })
    }
}

/// Adds one to `value`.
#[derive(Clone, Copy)]
pub struct Bump;

#[async_trait]
impl Transition<Tally> for Bump {
    type Error = TallyError;
    type Resources = Arc<Probe>;

    fn writes(&self) -> &'static [TallyField] {
        &[TallyField::Value, TallyField::Log]
    }

    async fn run(
        &self,
        mut state: Tally,
        probe: &Arc<Probe>,
        _bus: &mut Bus,
    ) -> Outcome<Tally, TallyError> {
        probe.runs.fetch_add(1, Ordering::SeqCst);
        probe.entered.notify_one();
        if let Some(gate) = &probe.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if probe.fail.load(Ordering::SeqCst) {
            return Outcome::Fault(TallyError("probe asked to fail".into()));
        }
        state.value += 1;
        state.log.push(format!("bump to {}", state.value));
        Outcome::Next(state)
    }
}

/// Writes `note` without declaring it.
#[derive(Clone, Copy)]
pub struct Scribble;

#[async_trait]
impl Transition<Tally> for Scribble {
    type Error = TallyError;
    type Resources = Arc<Probe>;

    fn writes(&self) -> &'static [TallyField] {
        &[TallyField::Log]
    }

    async fn run(
        &self,
        mut state: Tally,
        _probe: &Arc<Probe>,
        _bus: &mut Bus,
    ) -> Outcome<Tally, TallyError> {
        state.note = Some("sneaky".into());
        state.log.push("scribble".into());
        Outcome::Next(state)
    }
}

/// Changes `value` but forgets to log.
#[derive(Clone, Copy)]
pub struct Mute;

#[async_trait]
impl Transition<Tally> for Mute {
    type Error = TallyError;
    type Resources = Arc<Probe>;

    fn writes(&self) -> &'static [TallyField] {
        &[TallyField::Value, TallyField::Log]
    }

    async fn run(
        &self,
        mut state: Tally,
        _probe: &Arc<Probe>,
        _bus: &mut Bus,
    ) -> Outcome<Tally, TallyError> {
        state.value += 10;
        Outcome::Next(state)
    }
}

/// Sets `note` through the checkpoint store.
pub struct SetNote(pub &'static str);

impl crate::persistence::Patch<Tally> for SetNote {
    fn apply(&self, state: &mut Tally) {
        state.note = Some(self.0.to_string());
    }
}

/// Tries to rewrite history.
pub struct RewriteLog;

impl crate::persistence::Patch<Tally> for RewriteLog {
    fn apply(&self, state: &mut Tally) {
        state.log.clear();
    }
}

/// Tries to move the cursor.
pub struct MoveCursor;

impl crate::persistence::Patch<Tally> for MoveCursor {
    fn apply(&self, state: &mut Tally) {
        state.cursor.current_node = "elsewhere".into();
    }
}
