use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::gateway::LedgerError;

/// The three accounts a negotiation moves value between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Account {
    Buyer,
    Seller,
    Escrow,
}

impl Account {
    pub const ALL: [Account; 3] = [Account::Buyer, Account::Seller, Account::Escrow];

    pub fn as_str(self) -> &'static str {
        match self {
            Account::Buyer => "buyer",
            Account::Seller => "seller",
            Account::Escrow => "escrow",
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Account {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Account::Buyer),
            "seller" => Ok(Account::Seller),
            "escrow" => Ok(Account::Escrow),
            _ => Err(LedgerError::UnknownAccount(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!("buyer".parse::<Account>().unwrap(), Account::Buyer);
        assert_eq!(" Escrow ".parse::<Account>().unwrap(), Account::Escrow);
        for account in Account::ALL {
            assert_eq!(account.as_str().parse::<Account>().unwrap(), account);
        }
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "treasury".parse::<Account>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownAccount(name) if name == "treasury"));
    }
}
