#![allow(dead_code)]

use async_trait::async_trait;
use escrowflow_ledger::{
    Account, InMemoryLedger, LedgerError, LedgerGateway, LedgerSnapshot, Money, TransferOrder,
};
use escrowflow_negotiation::prelude::*;
use escrowflow_negotiation::{NegotiationState, Reasoner};
use escrowflow_runtime::{CheckpointStore, InMemoryCheckpointStore};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

pub fn ledger_with_buyer(major: i64) -> Arc<InMemoryLedger> {
    Arc::new(InMemoryLedger::with_balances(LedgerSnapshot::new(
        Money::from_major(major),
        Money::ZERO,
        Money::ZERO,
    )))
}

pub fn resources(ledger: Arc<dyn LedgerGateway>) -> NegotiationResources {
    NegotiationResources::new(ledger, Arc::new(TemplateReasoner::new()))
}

pub fn driver_over(
    resources: NegotiationResources,
    store: Arc<dyn CheckpointStore<NegotiationState>>,
) -> NegotiationDriver {
    NegotiationDriver::new(resources, store).expect("negotiation graph is valid")
}

pub fn memory_driver(ledger: Arc<dyn LedgerGateway>) -> NegotiationDriver {
    driver_over(resources(ledger), Arc::new(InMemoryCheckpointStore::new()))
}

pub fn reasoned_driver(
    ledger: Arc<dyn LedgerGateway>,
    reasoner: Arc<Reasoner>,
) -> NegotiationDriver {
    driver_over(
        NegotiationResources::new(ledger, reasoner),
        Arc::new(InMemoryCheckpointStore::new()),
    )
}

pub fn usd(major: i64) -> Money {
    Money::from_major(major)
}

pub fn balances(ledger: &InMemoryLedger) -> (Money, Money, Money) {
    let snapshot = ledger.snapshot();
    (
        snapshot.get(Account::Buyer),
        snapshot.get(Account::Seller),
        snapshot.get(Account::Escrow),
    )
}

/// Ledger whose `balances` call parks until the test opens the gate.
pub struct GatedLedger {
    pub inner: Arc<InMemoryLedger>,
    pub entered: Notify,
    pub gate: Semaphore,
}

impl GatedLedger {
    pub fn new(inner: Arc<InMemoryLedger>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        })
    }

    pub fn open(&self) {
        self.gate.add_permits(8);
    }
}

#[async_trait]
impl LedgerGateway for GatedLedger {
    async fn balances(&self) -> Result<LedgerSnapshot, LedgerError> {
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| LedgerError::GatewayUnavailable("gate closed".into()))?;
        self.inner.balances().await
    }

    async fn transfer(&self, order: TransferOrder) -> Result<LedgerSnapshot, LedgerError> {
        self.inner.transfer(order).await
    }
}
