use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::money::Money;

/// Point-in-time balances of the three accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub buyer: Money,
    pub seller: Money,
    pub escrow: Money,
}

impl LedgerSnapshot {
    pub fn new(buyer: Money, seller: Money, escrow: Money) -> Self {
        Self {
            buyer,
            seller,
            escrow,
        }
    }

    pub fn get(&self, account: Account) -> Money {
        match account {
            Account::Buyer => self.buyer,
            Account::Seller => self.seller,
            Account::Escrow => self.escrow,
        }
    }

    pub(crate) fn slot(&mut self, account: Account) -> &mut Money {
        match account {
            Account::Buyer => &mut self.buyer,
            Account::Seller => &mut self.seller,
            Account::Escrow => &mut self.escrow,
        }
    }

    /// Sum of all three balances. Transfers never change it.
    pub fn total(&self) -> Money {
        Money::from_minor(self.buyer.minor() + self.seller.minor() + self.escrow.minor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_and_lookup() {
        let snap = LedgerSnapshot::new(
            Money::from_major(8500),
            Money::from_major(300),
            Money::from_major(1200),
        );
        assert_eq!(snap.total(), Money::from_major(10_000));
        assert_eq!(snap.get(Account::Escrow), Money::from_major(1200));
    }

    #[test]
    fn serializes_balances_as_strings() {
        let json = serde_json::to_value(LedgerSnapshot::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"buyer": "0.00", "seller": "0.00", "escrow": "0.00"})
        );
    }
}
