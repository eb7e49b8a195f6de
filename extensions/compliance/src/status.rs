use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a transaction stands with the compliance authority.
///
/// ```text
/// INIT -> PENDING | PASS | FAIL
/// PENDING -> ESCROW_ACTIVE -> PASS
/// ```
///
/// `PASS` and `FAIL` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    #[default]
    Init,
    Pending,
    Pass,
    EscrowActive,
    Fail,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Init => "INIT",
            ComplianceStatus::Pending => "PENDING",
            ComplianceStatus::Pass => "PASS",
            ComplianceStatus::EscrowActive => "ESCROW_ACTIVE",
            ComplianceStatus::Fail => "FAIL",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ComplianceStatus::Pass | ComplianceStatus::Fail)
    }

    /// Whether `self -> next` is a legal edge. Staying put always is.
    pub fn can_transition_to(self, next: ComplianceStatus) -> bool {
        use ComplianceStatus::*;
        self == next
            || matches!(
                (self, next),
                (Init, Pending)
                    | (Init, Pass)
                    | (Init, Fail)
                    | (Pending, EscrowActive)
                    | (EscrowActive, Pass)
            )
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ComplianceStatus::*;
    use super::*;

    #[test]
    fn legal_edges() {
        assert!(Init.can_transition_to(Pending));
        assert!(Init.can_transition_to(Pass));
        assert!(Init.can_transition_to(Fail));
        assert!(Pending.can_transition_to(EscrowActive));
        assert!(EscrowActive.can_transition_to(Pass));
        assert!(Pending.can_transition_to(Pending));
    }

    #[test]
    fn illegal_edges() {
        assert!(!Pending.can_transition_to(Pass));
        assert!(!Pending.can_transition_to(Fail));
        assert!(!Pass.can_transition_to(Pending));
        assert!(!Fail.can_transition_to(Init));
        assert!(!EscrowActive.can_transition_to(Init));
        assert!(!Init.can_transition_to(EscrowActive));
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&EscrowActive).unwrap(),
            "\"ESCROW_ACTIVE\""
        );
        assert_eq!(EscrowActive.to_string(), "ESCROW_ACTIVE");
        assert!(Pass.is_terminal() && Fail.is_terminal() && !Pending.is_terminal());
    }
}
