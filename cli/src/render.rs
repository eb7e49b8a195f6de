//! Human-readable output.

use escrowflow_negotiation::{Negotiation, NegotiationState, RunResult};

pub fn print_run(run: &Negotiation) {
    match &run.result {
        RunResult::Halted { at_node } => println!(
            "{}: halted after {at_node} (run `escrowflow resume {}` to continue)",
            run.state.transaction_id, run.state.transaction_id
        ),
        RunResult::Terminal { end, final_status } => println!(
            "{}: finished ({end}) with status {final_status}",
            run.state.transaction_id
        ),
    }
    print_state(&run.state);
}

pub fn print_state(state: &NegotiationState) {
    let item = if state.requested_item.is_empty() {
        "-"
    } else {
        state.requested_item.as_str()
    };
    let position = match &state.cursor.terminal {
        Some(end) => format!("finished ({end})"),
        None if state.cursor.pending_interrupt => {
            format!("halted after {}", state.cursor.current_node)
        }
        None => format!("at {}", state.cursor.current_node),
    };

    println!("  position  {position}");
    println!("  status    {}", state.compliance_status);
    println!("  purchase  {item} for ${}", state.amount);
    if let Some(terms) = &state.escrow_terms {
        println!(
            "  terms     ${} upfront, ${} escrowed",
            terms.upfront, terms.escrowed
        );
    }
    let ledger = &state.ledger_snapshot;
    println!(
        "  ledger    buyer ${} | seller ${} | escrow ${}",
        ledger.buyer, ledger.seller, ledger.escrow
    );
    println!(
        "  sof       {}",
        if state.credentials.source_of_funds_verified {
            "verified"
        } else {
            "missing"
        }
    );
    if !state.last_thought.is_empty() {
        println!("  thought   [{}] {}", state.active_agent, state.last_thought);
    }
    println!("  log");
    for (i, entry) in state.negotiation_log.iter().enumerate() {
        println!("    {:>2}. {entry}", i + 1);
    }
}
