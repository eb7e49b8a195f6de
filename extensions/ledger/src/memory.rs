use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::account::Account;
use crate::gateway::{LedgerError, LedgerGateway, TransferId, TransferOrder};
use crate::money::Money;
use crate::snapshot::LedgerSnapshot;

/// Everything the in-memory ledger knows, in a serializable form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    pub balances: LedgerSnapshot,
    #[serde(default)]
    pub applied: BTreeSet<TransferId>,
}

/// Process-local ledger. A single mutex linearizes every transfer.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    book: Mutex<LedgerState>,
    offline: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: LedgerSnapshot) -> Self {
        Self::from_state(LedgerState {
            balances,
            applied: BTreeSet::new(),
        })
    }

    pub fn from_state(state: LedgerState) -> Self {
        Self {
            book: Mutex::new(state),
            offline: AtomicBool::new(false),
        }
    }

    /// Credit an account from outside the ledger. This is the only operation
    /// that changes the total.
    pub fn fund(&self, account: Account, amount: Money) -> Result<LedgerSnapshot, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut book = self.book.lock();
        let slot = book.balances.slot(account);
        *slot = slot
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount(amount))?;
        tracing::info!(%account, %amount, "Ledger funded");
        Ok(book.balances)
    }

    /// Simulate a gateway outage. While offline every call fails with
    /// [`LedgerError::GatewayUnavailable`].
    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn export(&self) -> LedgerState {
        self.book.lock().clone()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.book.lock().balances
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::GatewayUnavailable(
                "in-memory ledger is offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn balances(&self) -> Result<LedgerSnapshot, LedgerError> {
        self.ensure_online()?;
        Ok(self.snapshot())
    }

    async fn transfer(&self, order: TransferOrder) -> Result<LedgerSnapshot, LedgerError> {
        self.ensure_online()?;
        if !order.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(order.amount));
        }
        if order.from == order.to {
            return Err(LedgerError::SameAccount(order.from));
        }

        let mut book = self.book.lock();
        if book.applied.contains(&order.id) {
            tracing::debug!(transfer = %order.id, "Transfer already applied, skipping");
            return Ok(book.balances);
        }

        let available = book.balances.get(order.from);
        let debited = available
            .checked_sub(order.amount)
            .filter(|rest| !rest.is_negative())
            .ok_or(LedgerError::InsufficientFunds {
                account: order.from,
                required: order.amount,
                available,
            })?;
        let credited = book
            .balances
            .get(order.to)
            .checked_add(order.amount)
            .ok_or(LedgerError::InvalidAmount(order.amount))?;

        *book.balances.slot(order.from) = debited;
        *book.balances.slot(order.to) = credited;
        book.applied.insert(order.id.clone());

        tracing::info!(
            transfer = %order.id,
            from = %order.from,
            to = %order.to,
            amount = %order.amount,
            "Transfer applied"
        );
        Ok(book.balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> InMemoryLedger {
        InMemoryLedger::with_balances(LedgerSnapshot::new(
            Money::from_major(10_000),
            Money::ZERO,
            Money::ZERO,
        ))
    }

    fn order(leg: &str, from: Account, to: Account, major: i64) -> TransferOrder {
        TransferOrder::new(TransferId::new("tx-1", leg), from, to, Money::from_major(major))
    }

    #[tokio::test]
    async fn transfer_moves_value_and_conserves_total() {
        let ledger = funded();
        let before = ledger.balances().await.unwrap();

        let after = ledger
            .transfer(order("upfront", Account::Buyer, Account::Seller, 300))
            .await
            .unwrap();

        assert_eq!(after.buyer, Money::from_major(9_700));
        assert_eq!(after.seller, Money::from_major(300));
        assert_eq!(after.total(), before.total());
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_balances_untouched() {
        let ledger = funded();
        let err = ledger
            .transfer(order("escrow", Account::Escrow, Account::Seller, 1))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: Account::Escrow,
                required: Money::from_major(1),
                available: Money::ZERO,
            }
        );
        assert_eq!(ledger.snapshot(), funded().snapshot());
        assert!(ledger.export().applied.is_empty());
    }

    #[tokio::test]
    async fn duplicate_transfer_id_is_a_no_op() {
        let ledger = funded();
        let first = ledger
            .transfer(order("escrow", Account::Buyer, Account::Escrow, 1_200))
            .await
            .unwrap();
        let second = ledger
            .transfer(order("escrow", Account::Buyer, Account::Escrow, 1_200))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.escrow, Money::from_major(1_200));
    }

    #[tokio::test]
    async fn rejects_degenerate_orders() {
        let ledger = funded();
        assert_eq!(
            ledger
                .transfer(order("zero", Account::Buyer, Account::Seller, 0))
                .await,
            Err(LedgerError::InvalidAmount(Money::ZERO))
        );
        assert_eq!(
            ledger
                .transfer(order("self", Account::Buyer, Account::Buyer, 5))
                .await,
            Err(LedgerError::SameAccount(Account::Buyer))
        );
    }

    #[tokio::test]
    async fn offline_gateway_fails_every_call() {
        let ledger = funded();
        ledger.set_online(false);

        assert!(matches!(
            ledger.balances().await,
            Err(LedgerError::GatewayUnavailable(_))
        ));
        assert!(matches!(
            ledger
                .transfer(order("upfront", Account::Buyer, Account::Seller, 1))
                .await,
            Err(LedgerError::GatewayUnavailable(_))
        ));

        ledger.set_online(true);
        assert_eq!(
            ledger.balance_of(Account::Buyer).await.unwrap(),
            Money::from_major(10_000)
        );
    }

    #[test]
    fn fund_changes_total_and_state_round_trips() {
        let ledger = InMemoryLedger::new();
        ledger.fund(Account::Buyer, Money::from_major(50)).unwrap();
        assert!(ledger.fund(Account::Buyer, Money::ZERO).is_err());

        let json = serde_json::to_string(&ledger.export()).unwrap();
        let restored = InMemoryLedger::from_state(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.snapshot().total(), Money::from_major(50));
    }
}
