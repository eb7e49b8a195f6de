//! Escrowflow ledger accessor.
//!
//! Three accounts (buyer, seller, escrow) and one operation that matters:
//! an atomic, idempotent [`LedgerGateway::transfer`]. Amounts are exact
//! fixed-point [`Money`].

pub mod account;
pub mod gateway;
pub mod memory;
pub mod money;
pub mod snapshot;

pub use account::Account;
pub use gateway::{LedgerError, LedgerGateway, TransferId, TransferOrder};
pub use memory::{InMemoryLedger, LedgerState};
pub use money::{BPS_SCALE, Money, MoneyParseError};
pub use snapshot::LedgerSnapshot;
