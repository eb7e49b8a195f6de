use async_trait::async_trait;
use escrowflow_core::bus::Bus;
use escrowflow_core::outcome::Outcome;
use escrowflow_core::transition::Transition;
use escrowflow_ledger::Money;

use crate::error::NodeError;
use crate::reasoning::{ExtractionFailure, Prompt, parse_intent};
use crate::resources::NegotiationResources;
use crate::state::{Agent, NegotiationState, PurchaseIntent, StateField};

/// Item name used when a free-text request cannot be understood.
pub const UNKNOWN_ITEM: &str = "Unknown";

/// Resolves the purchase intent into `requestedItem` and `amount`.
pub struct AnalyzeIntent;

#[async_trait]
impl Transition<NegotiationState> for AnalyzeIntent {
    type Error = NodeError;
    type Resources = NegotiationResources;

    fn writes(&self) -> &'static [StateField] {
        &[
            StateField::Amount,
            StateField::RequestedItem,
            StateField::ActiveAgent,
            StateField::LastThought,
            StateField::NegotiationLog,
        ]
    }

    fn description(&self) -> Option<String> {
        Some("Buyer agent resolves item and amount".into())
    }

    async fn run(
        &self,
        mut state: NegotiationState,
        resources: &NegotiationResources,
        _bus: &mut Bus,
    ) -> Outcome<NegotiationState, NodeError> {
        let (item, amount) = match state.intent.clone() {
            PurchaseIntent::Declared { item, amount } => (item, amount),
            PurchaseIntent::FreeText { request } => {
                extract(resources, &state.transaction_id, request).await
            }
        };

        let thought = resources
            .think(Prompt::AnalyzeIntent {
                item: item.clone(),
                amount,
                credentials: state.credentials.clone(),
            })
            .await;

        state
            .negotiation_log
            .push(format!("Buyer Agent: Initiating purchase for {item} (${amount})."));
        state.requested_item = item;
        state.amount = amount;
        state.active_agent = Agent::Buyer;
        state.last_thought = thought;
        Outcome::Next(state)
    }
}

async fn extract(
    resources: &NegotiationResources,
    transaction_id: &str,
    request: String,
) -> (String, Money) {
    let parsed = match resources
        .reasoner
        .call(Prompt::ExtractIntent { request })
        .await
    {
        Ok(text) => parse_intent(&text),
        Err(error) => Err(ExtractionFailure {
            reason: error.to_string(),
        }),
    };
    parsed.unwrap_or_else(|failure| {
        tracing::warn!(
            transaction = %transaction_id,
            reason = %failure.reason,
            "Could not extract purchase intent, continuing with an unknown item"
        );
        (UNKNOWN_ITEM.to_string(), Money::ZERO)
    })
}

/// Buyer accepts the escrow proposal. Runs only on resume after the
/// `propose_escrow` halt.
pub struct NegotiateAcceptance;

#[async_trait]
impl Transition<NegotiationState> for NegotiateAcceptance {
    type Error = NodeError;
    type Resources = NegotiationResources;

    fn writes(&self) -> &'static [StateField] {
        &[
            StateField::ActiveAgent,
            StateField::LastThought,
            StateField::NegotiationLog,
        ]
    }

    fn description(&self) -> Option<String> {
        Some("Buyer agent accepts the escrow split".into())
    }

    async fn run(
        &self,
        mut state: NegotiationState,
        resources: &NegotiationResources,
        _bus: &mut Bus,
    ) -> Outcome<NegotiationState, NodeError> {
        let Some(terms) = state.escrow_terms else {
            return Outcome::Fault(NodeError::MissingEscrowTerms);
        };
        state.last_thought = resources.think(Prompt::AcceptProposal { terms }).await;
        state.active_agent = Agent::Buyer;
        state
            .negotiation_log
            .push("Buyer Agent: Proposal Accepted. Proceeding to smart contract.".into());
        Outcome::Next(state)
    }
}
