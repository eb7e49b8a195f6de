use escrowflow_ledger::{LedgerError, TransferId};

/// Why a negotiation node faulted. The checkpoint still holds the state from
/// before the node, so every variant is retryable with `resume`.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A later leg failed after earlier legs settled. The settled legs are
    /// idempotent and will be skipped on retry.
    #[error("settlement incomplete after {}: {source}", display_legs(.settled))]
    PartialSettlement {
        settled: Vec<TransferId>,
        #[source]
        source: LedgerError,
    },

    #[error("escrow terms missing; propose_escrow has not run")]
    MissingEscrowTerms,
}

fn display_legs(legs: &[TransferId]) -> String {
    legs.iter()
        .map(TransferId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
