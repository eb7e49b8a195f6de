//! `escrowflow demo`: both negotiation paths against an in-memory ledger.
//! Nothing under the data dir is touched.

use anyhow::{Context, Result};
use escrowflow_ledger::{InMemoryLedger, Money};
use escrowflow_negotiation::workflow::EXECUTE_ESCROW;
use escrowflow_negotiation::{
    EscrowConfig, InitialFacts, NegotiationDriver, NegotiationPatch, NegotiationResources,
};
use escrowflow_runtime::InMemoryCheckpointStore;
use std::sync::Arc;

use crate::render::print_run;

pub async fn run(config: &EscrowConfig) -> Result<()> {
    let ledger = Arc::new(InMemoryLedger::with_balances(config.opening_balances()));
    let resources = NegotiationResources::new(ledger.clone(), config.reasoner()?)
        .with_policy(config.policy())
        .with_upfront_bps(config.escrow.upfront_bps);
    let driver = NegotiationDriver::new(resources, Arc::new(InMemoryCheckpointStore::new()))
        .context("Negotiation graph is invalid")?;

    let large = config
        .compliance
        .threshold
        .checked_add(Money::from_major(500))
        .context("threshold too large for the demo")?;

    println!("== Escrow path: Vintage Rolex for ${large}, no source-of-funds proof ==\n");
    let id = "demo-escrow";
    print_run(
        &driver
            .start(id, InitialFacts::declared("Vintage Rolex", large))
            .await?,
    );
    println!("\n-- buyer resumes --");
    print_run(&driver.resume(id).await?);
    println!("\n-- proof uploaded: patching source of funds --");
    driver
        .patch(
            id,
            &NegotiationPatch::source_of_funds(Some("demo-bank-statement.pdf".into())),
            EXECUTE_ESCROW,
        )
        .await?;
    print_run(&driver.resume(id).await?);

    println!("\n== Direct path: Book for $500.00 ==\n");
    print_run(
        &driver
            .start("demo-direct", InitialFacts::declared("Book", Money::from_major(500)))
            .await?,
    );

    let snapshot = ledger.snapshot();
    println!(
        "\nFinal ledger: buyer ${} | seller ${} | escrow ${} (total ${})",
        snapshot.buyer,
        snapshot.seller,
        snapshot.escrow,
        snapshot.total()
    );
    Ok(())
}
