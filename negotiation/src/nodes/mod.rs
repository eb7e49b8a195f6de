//! The six negotiation nodes.
//!
//! Every node appends exactly one `negotiationLog` entry and declares the
//! fields it writes; the engine holds them to both.

mod buyer;
mod compliance;
mod settlement;

pub use buyer::{AnalyzeIntent, NegotiateAcceptance};
pub use compliance::{EvaluateCompliance, FinalizeSettlement, ProposeEscrow};
pub use settlement::ExecuteEscrow;

/// `2000` -> `"20%"`, `1250` -> `"12.5%"`.
pub(crate) fn percent(bps: u32) -> String {
    let whole = bps / 100;
    let frac = bps % 100;
    if frac == 0 {
        format!("{whole}%")
    } else {
        format!("{}%", format!("{whole}.{frac:02}").trim_end_matches('0'))
    }
}
