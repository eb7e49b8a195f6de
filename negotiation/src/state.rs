//! Negotiation state: the transaction plus the engine cursor.

use escrowflow_compliance::{ComplianceStatus, Credentials, CredentialsPatch};
use escrowflow_core::state::{Cursor, WorkflowState};
use escrowflow_ledger::{LedgerSnapshot, Money};
use escrowflow_runtime::Patch;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who last acted on the transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Agent {
    #[default]
    System,
    #[serde(rename = "Buyer Agent")]
    Buyer,
    #[serde(rename = "Compliance Agent")]
    Compliance,
    Ledger,
}

impl Agent {
    pub fn as_str(self) -> &'static str {
        match self {
            Agent::System => "System",
            Agent::Buyer => "Buyer Agent",
            Agent::Compliance => "Compliance Agent",
            Agent::Ledger => "Ledger",
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the buyer asked for at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum PurchaseIntent {
    /// Item and amount already known.
    Declared { item: String, amount: Money },
    /// A natural-language request the reasoner has to extract from.
    FreeText { request: String },
}

/// Tranche split of `amount`. `upfront + escrowed == amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowTerms {
    pub upfront: Money,
    pub escrowed: Money,
}

impl EscrowTerms {
    /// `upfront_bps` basis points go to the seller now; the rest, including any
    /// rounding remainder, is escrowed.
    pub fn split(amount: Money, upfront_bps: u32) -> Self {
        let (upfront, escrowed) = amount.split_bps(upfront_bps);
        Self { upfront, escrowed }
    }

    pub fn total(&self) -> Option<Money> {
        self.upfront.checked_add(self.escrowed)
    }
}

/// Facts supplied by the caller of `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialFacts {
    pub intent: PurchaseIntent,
    #[serde(default)]
    pub credentials: Credentials,
}

impl InitialFacts {
    pub fn declared(item: impl Into<String>, amount: Money) -> Self {
        Self {
            intent: PurchaseIntent::Declared {
                item: item.into(),
                amount,
            },
            credentials: Credentials::default(),
        }
    }

    pub fn free_text(request: impl Into<String>) -> Self {
        Self {
            intent: PurchaseIntent::FreeText {
                request: request.into(),
            },
            credentials: Credentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// The full checkpointed state of one negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationState {
    pub transaction_id: String,
    pub intent: PurchaseIntent,
    pub amount: Money,
    pub requested_item: String,
    pub credentials: Credentials,
    pub compliance_status: ComplianceStatus,
    pub active_agent: Agent,
    pub negotiation_log: Vec<String>,
    pub ledger_snapshot: LedgerSnapshot,
    pub last_thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow_terms: Option<EscrowTerms>,
    #[serde(flatten)]
    pub cursor: Cursor,
}

impl NegotiationState {
    pub fn new(transaction_id: impl Into<String>, facts: InitialFacts) -> Self {
        let (requested_item, amount) = match &facts.intent {
            PurchaseIntent::Declared { item, amount } => (item.clone(), *amount),
            PurchaseIntent::FreeText { .. } => (String::new(), Money::ZERO),
        };
        Self {
            transaction_id: transaction_id.into(),
            intent: facts.intent,
            amount,
            requested_item,
            credentials: facts.credentials,
            compliance_status: ComplianceStatus::Init,
            active_agent: Agent::System,
            negotiation_log: Vec::new(),
            ledger_snapshot: LedgerSnapshot::default(),
            last_thought: String::new(),
            escrow_terms: None,
            cursor: Cursor::default(),
        }
    }
}

/// User-visible fields a node can declare as writable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    Intent,
    Amount,
    RequestedItem,
    Credentials,
    ComplianceStatus,
    ActiveAgent,
    NegotiationLog,
    LedgerSnapshot,
    LastThought,
    EscrowTerms,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateField::Intent => "intent",
            StateField::Amount => "amount",
            StateField::RequestedItem => "requestedItem",
            StateField::Credentials => "credentials",
            StateField::ComplianceStatus => "complianceStatus",
            StateField::ActiveAgent => "activeAgent",
            StateField::NegotiationLog => "negotiationLog",
            StateField::LedgerSnapshot => "ledgerSnapshot",
            StateField::LastThought => "lastThought",
            StateField::EscrowTerms => "escrowTerms",
        })
    }
}

impl WorkflowState for NegotiationState {
    type Field = StateField;

    fn workflow_id(&self) -> &str {
        &self.transaction_id
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn changed_fields(&self, before: &Self) -> Vec<StateField> {
        let checks = [
            (StateField::Intent, self.intent != before.intent),
            (StateField::Amount, self.amount != before.amount),
            (
                StateField::RequestedItem,
                self.requested_item != before.requested_item,
            ),
            (StateField::Credentials, self.credentials != before.credentials),
            (
                StateField::ComplianceStatus,
                self.compliance_status != before.compliance_status,
            ),
            (StateField::ActiveAgent, self.active_agent != before.active_agent),
            (
                StateField::NegotiationLog,
                self.negotiation_log != before.negotiation_log,
            ),
            (
                StateField::LedgerSnapshot,
                self.ledger_snapshot != before.ledger_snapshot,
            ),
            (StateField::LastThought, self.last_thought != before.last_thought),
            (StateField::EscrowTerms, self.escrow_terms != before.escrow_terms),
        ];
        checks
            .into_iter()
            .filter_map(|(field, changed)| changed.then_some(field))
            .collect()
    }

    fn check_initial(&self) -> Result<(), String> {
        if self.amount.is_negative() {
            return Err(format!("negative amount {}", self.amount));
        }
        Ok(())
    }

    fn check_step(&self, before: &Self) -> Result<(), String> {
        if !self.negotiation_log.starts_with(&before.negotiation_log)
            || self.negotiation_log.len() != before.negotiation_log.len() + 1
        {
            return Err("negotiation log must grow by exactly one entry".to_string());
        }
        if !before
            .compliance_status
            .can_transition_to(self.compliance_status)
        {
            return Err(format!(
                "illegal compliance transition {} -> {}",
                before.compliance_status, self.compliance_status
            ));
        }
        if self.amount.is_negative() {
            return Err(format!("negative amount {}", self.amount));
        }
        if let Some(terms) = &self.escrow_terms {
            if terms.total() != Some(self.amount) {
                return Err(format!(
                    "escrow terms {} + {} do not add up to {}",
                    terms.upfront, terms.escrowed, self.amount
                ));
            }
        }
        Ok(())
    }

    fn check_patch(&self, before: &Self) -> Result<(), String> {
        if self.negotiation_log != before.negotiation_log {
            return Err("negotiation log is append-only".to_string());
        }
        if self.compliance_status != before.compliance_status {
            return Err("compliance status only changes through nodes".to_string());
        }
        if self.ledger_snapshot != before.ledger_snapshot {
            return Err("ledger snapshot only changes through nodes".to_string());
        }
        Ok(())
    }
}

/// Out-of-band facts injected between an interrupt and a resume, typically
/// the source-of-funds proof.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationPatch {
    #[serde(default)]
    pub credentials: CredentialsPatch,
}

impl NegotiationPatch {
    /// Mark source of funds verified, optionally recording the proof.
    pub fn source_of_funds(proof_reference: Option<String>) -> Self {
        Self {
            credentials: CredentialsPatch {
                source_of_funds_verified: Some(true),
                proof_reference,
                ..Default::default()
            },
        }
    }
}

impl Patch<NegotiationState> for NegotiationPatch {
    fn apply(&self, state: &mut NegotiationState) {
        self.credentials.apply_to(&mut state.credentials);
    }
}
