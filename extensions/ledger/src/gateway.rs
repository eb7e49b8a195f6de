//! The ledger gateway contract.
//!
//! Signing and broadcast of value transfers live behind [`LedgerGateway`];
//! the workflow only ever sees balances and transfer results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::Account;
use crate::money::Money;
use crate::snapshot::LedgerSnapshot;

/// Idempotency key of a single transfer, `<transaction id>:<leg>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    pub fn new(transaction_id: &str, leg: &str) -> Self {
        Self(format!("{transaction_id}:{leg}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One atomic movement of value between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub id: TransferId,
    pub from: Account,
    pub to: Account,
    pub amount: Money,
}

impl TransferOrder {
    pub fn new(id: TransferId, from: Account, to: Account, amount: Money) -> Self {
        Self {
            id,
            from,
            to,
            amount,
        }
    }
}

/// Ledger-related errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: Account,
        required: Money,
        available: Money,
    },

    #[error("Unknown account `{0}`")]
    UnknownAccount(String),

    #[error("Transfer amount must be positive, got {0}")]
    InvalidAmount(Money),

    #[error("Transfer source and destination are both {0}")]
    SameAccount(Account),

    #[error("Ledger gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

/// Access to the three-account ledger.
///
/// `transfer` is all-or-nothing and linearizable with respect to every other
/// call on the same gateway. Re-submitting an order whose id was already
/// applied is a no-op that returns the current balances.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn balances(&self) -> Result<LedgerSnapshot, LedgerError>;

    async fn balance_of(&self, account: Account) -> Result<Money, LedgerError> {
        Ok(self.balances().await?.get(account))
    }

    async fn transfer(&self, order: TransferOrder) -> Result<LedgerSnapshot, LedgerError>;
}
