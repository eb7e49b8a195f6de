//! The negotiation graph.
//!
//! ```text
//! analyze_intent -> evaluate_compliance --PASS----> end(direct)
//!                                       --FAIL----> end(rejected)
//!                                       --PENDING-> propose_escrow*
//! propose_escrow* -> negotiate_acceptance -> execute_escrow* -> finalize_settlement -> end(settled)
//! ```
//! `*` marks halt points.

use escrowflow_compliance::ComplianceStatus;
use escrowflow_runtime::{GraphError, Target, Workflow};

use crate::error::NodeError;
use crate::nodes::{
    AnalyzeIntent, EvaluateCompliance, ExecuteEscrow, FinalizeSettlement, NegotiateAcceptance,
    ProposeEscrow,
};
use crate::resources::NegotiationResources;
use crate::state::NegotiationState;

pub const WORKFLOW_NAME: &str = "escrow_negotiation";

pub const ANALYZE_INTENT: &str = "analyze_intent";
pub const EVALUATE_COMPLIANCE: &str = "evaluate_compliance";
pub const PROPOSE_ESCROW: &str = "propose_escrow";
pub const NEGOTIATE_ACCEPTANCE: &str = "negotiate_acceptance";
pub const EXECUTE_ESCROW: &str = "execute_escrow";
pub const FINALIZE_SETTLEMENT: &str = "finalize_settlement";

pub const END_DIRECT: &str = "direct";
pub const END_REJECTED: &str = "rejected";
pub const END_SETTLED: &str = "settled";

pub type NegotiationWorkflow = Workflow<NegotiationState, NegotiationResources, NodeError>;

pub fn build_workflow() -> Result<NegotiationWorkflow, GraphError> {
    Workflow::builder(WORKFLOW_NAME)
        .node(ANALYZE_INTENT, AnalyzeIntent)
        .node(EVALUATE_COMPLIANCE, EvaluateCompliance)
        .interrupt_node(PROPOSE_ESCROW, ProposeEscrow)
        .node(NEGOTIATE_ACCEPTANCE, NegotiateAcceptance)
        .interrupt_node(EXECUTE_ESCROW, ExecuteEscrow)
        .node(FINALIZE_SETTLEMENT, FinalizeSettlement)
        .entry(ANALYZE_INTENT)
        .edge(ANALYZE_INTENT, Target::node(EVALUATE_COMPLIANCE))
        .route(
            EVALUATE_COMPLIANCE,
            |state: &NegotiationState| state.compliance_status.as_str().to_string(),
            [
                (
                    ComplianceStatus::Pending.as_str(),
                    Target::node(PROPOSE_ESCROW),
                ),
                (ComplianceStatus::Pass.as_str(), Target::end(END_DIRECT)),
                (ComplianceStatus::Fail.as_str(), Target::end(END_REJECTED)),
            ],
        )
        .edge(PROPOSE_ESCROW, Target::node(NEGOTIATE_ACCEPTANCE))
        .edge(NEGOTIATE_ACCEPTANCE, Target::node(EXECUTE_ESCROW))
        .edge(EXECUTE_ESCROW, Target::node(FINALIZE_SETTLEMENT))
        .edge(FINALIZE_SETTLEMENT, Target::end(END_SETTLED))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_builds_with_two_halt_points() {
        let workflow = build_workflow().unwrap();
        assert_eq!(workflow.entry(), ANALYZE_INTENT);
        assert!(workflow.halts_after(PROPOSE_ESCROW));
        assert!(workflow.halts_after(EXECUTE_ESCROW));
        assert!(!workflow.halts_after(EVALUATE_COMPLIANCE));
        assert!(!workflow.halts_after(FINALIZE_SETTLEMENT));
    }

    #[test]
    fn schematic_lists_routes_and_ends() {
        let workflow = build_workflow().unwrap();
        let schematic = workflow.schematic();
        assert_eq!(schematic.nodes.len(), 9);

        assert_eq!(schematic.outgoing(EVALUATE_COMPLIANCE).count(), 3);

        let mermaid = schematic.to_mermaid(Some(EXECUTE_ESCROW));
        assert!(mermaid.contains("PENDING"), "{mermaid}");
        assert!(mermaid.contains("end_settled"), "{mermaid}");
    }
}
