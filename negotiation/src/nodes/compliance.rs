use async_trait::async_trait;
use escrowflow_compliance::ComplianceStatus;
use escrowflow_core::bus::Bus;
use escrowflow_core::outcome::Outcome;
use escrowflow_core::transition::Transition;
use escrowflow_ledger::Account;

use super::percent;
use super::settlement::{Leg, settle};
use crate::error::NodeError;
use crate::reasoning::Prompt;
use crate::resources::NegotiationResources;
use crate::state::{Agent, EscrowTerms, NegotiationState, StateField};

/// Applies the policy table and refreshes the ledger snapshot.
pub struct EvaluateCompliance;

#[async_trait]
impl Transition<NegotiationState> for EvaluateCompliance {
    type Error = NodeError;
    type Resources = NegotiationResources;

    fn writes(&self) -> &'static [StateField] {
        &[
            StateField::ComplianceStatus,
            StateField::LedgerSnapshot,
            StateField::ActiveAgent,
            StateField::LastThought,
            StateField::NegotiationLog,
        ]
    }

    fn description(&self) -> Option<String> {
        Some("Compliance agent applies the policy table".into())
    }

    async fn run(
        &self,
        mut state: NegotiationState,
        resources: &NegotiationResources,
        _bus: &mut Bus,
    ) -> Outcome<NegotiationState, NodeError> {
        let balances = match resources.ledger.balances().await {
            Ok(balances) => balances,
            Err(error) => return Outcome::Fault(error.into()),
        };
        let decision = resources.policy.decide(state.amount, &state.credentials);

        state.last_thought = resources
            .think(Prompt::EvaluateCompliance {
                amount: state.amount,
                credentials: state.credentials.clone(),
                status: decision.status,
            })
            .await;
        state.negotiation_log.push(format!(
            "Compliance Agent: Status {} for ${} ({}).",
            decision.status, state.amount, decision.rule
        ));
        state.compliance_status = decision.status;
        state.ledger_snapshot = balances;
        state.active_agent = Agent::Compliance;
        Outcome::Next(state)
    }
}

/// Splits the amount into an upfront tranche and an escrowed tranche.
pub struct ProposeEscrow;

#[async_trait]
impl Transition<NegotiationState> for ProposeEscrow {
    type Error = NodeError;
    type Resources = NegotiationResources;

    fn writes(&self) -> &'static [StateField] {
        &[
            StateField::EscrowTerms,
            StateField::ActiveAgent,
            StateField::LastThought,
            StateField::NegotiationLog,
        ]
    }

    fn description(&self) -> Option<String> {
        Some("Compliance agent proposes an escrow split".into())
    }

    async fn run(
        &self,
        mut state: NegotiationState,
        resources: &NegotiationResources,
        _bus: &mut Bus,
    ) -> Outcome<NegotiationState, NodeError> {
        let terms = EscrowTerms::split(state.amount, resources.upfront_bps);
        let escrow_bps = escrowflow_ledger::BPS_SCALE.saturating_sub(resources.upfront_bps);

        state.last_thought = resources
            .think(Prompt::ProposeEscrow {
                amount: state.amount,
                terms,
            })
            .await;
        state.negotiation_log.push(format!(
            "Compliance Agent: Escrow Proposal: Pay ${} ({}) directly, lock ${} ({}) in Escrow.",
            terms.upfront,
            percent(resources.upfront_bps),
            terms.escrowed,
            percent(escrow_bps),
        ));
        state.escrow_terms = Some(terms);
        state.active_agent = Agent::Compliance;
        Outcome::Next(state)
    }
}

/// Releases the escrowed tranche to the seller once source of funds is in.
pub struct FinalizeSettlement;

#[async_trait]
impl Transition<NegotiationState> for FinalizeSettlement {
    type Error = NodeError;
    type Resources = NegotiationResources;

    fn writes(&self) -> &'static [StateField] {
        &[
            StateField::LedgerSnapshot,
            StateField::ComplianceStatus,
            StateField::ActiveAgent,
            StateField::LastThought,
            StateField::NegotiationLog,
        ]
    }

    fn description(&self) -> Option<String> {
        Some("Compliance agent releases escrow to the seller".into())
    }

    async fn run(
        &self,
        mut state: NegotiationState,
        resources: &NegotiationResources,
        bus: &mut Bus,
    ) -> Outcome<NegotiationState, NodeError> {
        let Some(terms) = state.escrow_terms else {
            return Outcome::Fault(NodeError::MissingEscrowTerms);
        };
        let release = [Leg {
            name: "release",
            from: Account::Escrow,
            to: Account::Seller,
            amount: terms.escrowed,
        }];
        let snapshot = match settle(resources, &state.transaction_id, &release, bus).await {
            Ok(snapshot) => snapshot,
            Err(error) => return Outcome::Fault(error),
        };

        state.ledger_snapshot = snapshot;
        state.compliance_status = ComplianceStatus::Pass;
        state.active_agent = Agent::Compliance;
        state.last_thought = resources
            .think(Prompt::FinalizeSettlement {
                released: terms.escrowed,
            })
            .await;
        state
            .negotiation_log
            .push("Compliance Agent: Compliance Met. Funds Released.".into());
        tracing::info!(transaction = %state.transaction_id, released = %terms.escrowed, "Escrow released");
        Outcome::Next(state)
    }
}
