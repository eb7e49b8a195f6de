//! Escrowflow compliance evaluator.
//!
//! Pure and total: a verdict depends only on the amount and the caller's
//! credential flags, never on negotiation prose.

pub mod credentials;
pub mod policy;
pub mod status;

pub use credentials::{Credentials, CredentialsPatch};
pub use policy::{Condition, DEFAULT_THRESHOLD, Decision, PolicyTable, Rule};
pub use status::ComplianceStatus;
