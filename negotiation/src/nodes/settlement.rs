use async_trait::async_trait;
use escrowflow_compliance::ComplianceStatus;
use escrowflow_core::bus::Bus;
use escrowflow_core::outcome::Outcome;
use escrowflow_core::transition::Transition;
use escrowflow_ledger::{Account, LedgerSnapshot, Money, TransferId, TransferOrder};

use crate::error::NodeError;
use crate::reasoning::Prompt;
use crate::resources::NegotiationResources;
use crate::state::{Agent, NegotiationState, StateField};

/// One transfer of a multi-leg settlement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Leg {
    pub name: &'static str,
    pub from: Account,
    pub to: Account,
    pub amount: Money,
}

/// Submit `legs` in order. Zero legs are skipped. Every leg carries the id
/// `<transaction>:<leg>`, so a retry replays already-settled legs as no-ops.
pub(crate) async fn settle(
    resources: &NegotiationResources,
    transaction_id: &str,
    legs: &[Leg],
    bus: &Bus,
) -> Result<LedgerSnapshot, NodeError> {
    let attempt = bus.context().map(|ctx| ctx.attempt_id.to_string());
    let mut settled = Vec::new();
    let mut snapshot = None;

    for leg in legs.iter().filter(|leg| !leg.amount.is_zero()) {
        let id = TransferId::new(transaction_id, leg.name);
        let order = TransferOrder::new(id.clone(), leg.from, leg.to, leg.amount);
        match resources.ledger.transfer(order).await {
            Ok(balances) => {
                tracing::debug!(transfer = %id, attempt = ?attempt, "Leg settled");
                settled.push(id);
                snapshot = Some(balances);
            }
            Err(source) if settled.is_empty() => return Err(NodeError::Ledger(source)),
            Err(source) => {
                tracing::warn!(transfer = %id, settled = settled.len(), %source, "Settlement stopped mid-way");
                return Err(NodeError::PartialSettlement { settled, source });
            }
        }
    }

    match snapshot {
        Some(balances) => Ok(balances),
        None => Ok(resources.ledger.balances().await?),
    }
}

/// Pays the upfront tranche to the seller and locks the rest in escrow.
/// Runs only on resume after the buyer accepted.
pub struct ExecuteEscrow;

#[async_trait]
impl Transition<NegotiationState> for ExecuteEscrow {
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
        Some("Ledger settles the upfront tranche and funds escrow".into())
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
        let legs = [
            Leg {
                name: "upfront",
                from: Account::Buyer,
                to: Account::Seller,
                amount: terms.upfront,
            },
            Leg {
                name: "escrow",
                from: Account::Buyer,
                to: Account::Escrow,
                amount: terms.escrowed,
            },
        ];
        let snapshot = match settle(resources, &state.transaction_id, &legs, bus).await {
            Ok(snapshot) => snapshot,
            Err(error) => return Outcome::Fault(error),
        };

        state.ledger_snapshot = snapshot;
        state.compliance_status = ComplianceStatus::EscrowActive;
        state.active_agent = Agent::Ledger;
        state.last_thought = resources.think(Prompt::ExecuteEscrow { terms }).await;
        state
            .negotiation_log
            .push("Ledger: Tx confirmed. Funds Locked.".into());
        tracing::info!(
            transaction = %state.transaction_id,
            upfront = %terms.upfront,
            escrowed = %terms.escrowed,
            "Escrow funded"
        );
        Outcome::Next(state)
    }
}
