//! Ordered compliance policy.
//!
//! A [`PolicyTable`] is a list of rules evaluated top to bottom; the first
//! rule whose condition holds decides the verdict. The table always ends in a
//! catch-all, so evaluation is total.

use escrowflow_ledger::Money;
use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::status::ComplianceStatus;

/// Threshold above which an unverified transaction needs escrow.
pub const DEFAULT_THRESHOLD: Money = Money::from_major(1000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "when", content = "value")]
pub enum Condition {
    SourceOfFundsVerified,
    SanctionsVerified,
    /// Strictly greater than the given amount.
    AmountAbove(Money),
}

impl Condition {
    fn holds(&self, amount: Money, credentials: &Credentials) -> bool {
        match self {
            Condition::SourceOfFundsVerified => credentials.source_of_funds_verified,
            Condition::SanctionsVerified => credentials.sanctions_verified,
            Condition::AmountAbove(limit) => amount > *limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub condition: Condition,
    pub verdict: ComplianceStatus,
}

/// Verdict plus the name of the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: ComplianceStatus,
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    rules: Vec<Rule>,
    otherwise: ComplianceStatus,
}

impl PolicyTable {
    /// A table with no rules; everything falls through to `otherwise`.
    pub fn new(otherwise: ComplianceStatus) -> Self {
        Self {
            rules: Vec::new(),
            otherwise,
        }
    }

    pub fn rule(
        mut self,
        name: impl Into<String>,
        condition: Condition,
        verdict: ComplianceStatus,
    ) -> Self {
        self.rules.push(Rule {
            name: name.into(),
            condition,
            verdict,
        });
        self
    }

    /// Verified funds pass, large unverified amounts wait for escrow,
    /// everything else passes.
    pub fn standard(threshold: Money) -> Self {
        Self::new(ComplianceStatus::Pass)
            .rule(
                "source_of_funds_verified",
                Condition::SourceOfFundsVerified,
                ComplianceStatus::Pass,
            )
            .rule(
                "amount_above_threshold",
                Condition::AmountAbove(threshold),
                ComplianceStatus::Pending,
            )
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn decide(&self, amount: Money, credentials: &Credentials) -> Decision {
        let decision = self
            .rules
            .iter()
            .find(|rule| rule.condition.holds(amount, credentials))
            .map(|rule| Decision {
                status: rule.verdict,
                rule: rule.name.clone(),
            })
            .unwrap_or_else(|| Decision {
                status: self.otherwise,
                rule: "otherwise".to_string(),
            });
        tracing::debug!(%amount, status = %decision.status, rule = %decision.rule, "Compliance evaluated");
        decision
    }

    pub fn evaluate(&self, amount: Money, credentials: &Credentials) -> ComplianceStatus {
        self.decide(amount, credentials).status
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unverified() -> Credentials {
        Credentials::default()
    }

    #[test]
    fn threshold_is_exclusive() {
        let table = PolicyTable::default();
        assert_eq!(
            table.evaluate(Money::from_major(1000), &unverified()),
            ComplianceStatus::Pass
        );
        assert_eq!(
            table.evaluate(Money::from_major(1001), &unverified()),
            ComplianceStatus::Pending
        );
        assert_eq!(
            table.evaluate(Money::from_minor(100_001), &unverified()),
            ComplianceStatus::Pending
        );
    }

    #[test]
    fn verified_funds_pass_any_amount() {
        let creds = Credentials {
            source_of_funds_verified: true,
            ..Default::default()
        };
        let decision = PolicyTable::default().decide(Money::from_major(5000), &creds);
        assert_eq!(decision.status, ComplianceStatus::Pass);
        assert_eq!(decision.rule, "source_of_funds_verified");
    }

    #[test]
    fn small_amount_falls_through() {
        let decision = PolicyTable::default().decide(Money::from_major(500), &unverified());
        assert_eq!(decision.status, ComplianceStatus::Pass);
        assert_eq!(decision.rule, "otherwise");
    }

    #[test]
    fn custom_table_can_reject() {
        let table = PolicyTable::new(ComplianceStatus::Fail).rule(
            "sanctions_cleared",
            Condition::SanctionsVerified,
            ComplianceStatus::Pass,
        );
        assert_eq!(
            table.evaluate(Money::from_major(1), &unverified()),
            ComplianceStatus::Fail
        );
    }
}
