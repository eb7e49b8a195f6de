use escrowflow_compliance::PolicyTable;
use escrowflow_ledger::LedgerGateway;
use std::sync::Arc;

use crate::reasoning::{Prompt, Reasoner};

/// Share of the amount paid to the seller before escrow, in basis points.
pub const DEFAULT_UPFRONT_BPS: u32 = 2000;

/// Shown as `lastThought` when the reasoner fails.
pub const FALLBACK_THOUGHT: &str = "(reasoning unavailable; proceeding on policy)";

/// Collaborators injected into every negotiation node.
pub struct NegotiationResources {
    pub ledger: Arc<dyn LedgerGateway>,
    pub reasoner: Arc<Reasoner>,
    pub policy: PolicyTable,
    pub upfront_bps: u32,
}

impl NegotiationResources {
    pub fn new(ledger: Arc<dyn LedgerGateway>, reasoner: Arc<Reasoner>) -> Self {
        Self {
            ledger,
            reasoner,
            policy: PolicyTable::default(),
            upfront_bps: DEFAULT_UPFRONT_BPS,
        }
    }

    pub fn with_policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_upfront_bps(mut self, bps: u32) -> Self {
        self.upfront_bps = bps;
        self
    }

    /// Ask the reasoner for prose. Never fails.
    pub async fn think(&self, prompt: Prompt) -> String {
        let agent = prompt.agent();
        match self.reasoner.call(prompt).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%agent, reasoner = %self.reasoner.name(), %error, "Reasoner failed, using fallback thought");
                FALLBACK_THOUGHT.to_string()
            }
        }
    }
}
