//! Escrow negotiation workflow.
//!
//! A buyer agent and a compliance agent negotiate a purchase. Small or fully
//! documented purchases settle directly; large undocumented ones are split
//! into an upfront tranche and an escrowed tranche that is released once a
//! source-of-funds proof is patched into the checkpoint.
//!
//! ```no_run
//! use escrowflow_ledger::{InMemoryLedger, Money};
//! use escrowflow_negotiation::prelude::*;
//! use escrowflow_runtime::InMemoryCheckpointStore;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let resources = NegotiationResources::new(
//!     Arc::new(InMemoryLedger::new()),
//!     Arc::new(TemplateReasoner::new()),
//! );
//! let driver = NegotiationDriver::new(resources, Arc::new(InMemoryCheckpointStore::new()))?;
//! let run = driver
//!     .start("tx-1", InitialFacts::declared("Vintage Rolex", Money::from_major(1500)))
//!     .await?;
//! println!("{:?}", run.result);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod nodes;
pub mod reasoning;
pub mod resources;
pub mod state;
pub mod workflow;

pub use config::{ConfigError, EscrowConfig, ReasonerKind};
pub use driver::{Negotiation, NegotiationDriver, NegotiationError, RunResult};
pub use error::NodeError;
pub use reasoning::{
    ExtractionFailure, OllamaReasoner, Prompt, Reasoner, ReasoningError, ScriptedReasoner,
    TemplateReasoner, parse_intent,
};
pub use resources::{DEFAULT_UPFRONT_BPS, FALLBACK_THOUGHT, NegotiationResources};
pub use state::{
    Agent, EscrowTerms, InitialFacts, NegotiationPatch, NegotiationState, PurchaseIntent,
    StateField,
};
pub use workflow::{NegotiationWorkflow, build_workflow};

pub mod prelude {
    pub use crate::driver::{Negotiation, NegotiationDriver, RunResult};
    pub use crate::reasoning::TemplateReasoner;
    pub use crate::resources::NegotiationResources;
    pub use crate::state::{InitialFacts, NegotiationPatch, NegotiationState};
    pub use crate::workflow::*;
}
