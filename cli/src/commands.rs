use anyhow::{Context, Result, bail};
use escrowflow_compliance::{Credentials, CredentialsPatch};
use escrowflow_ledger::Money;
use escrowflow_negotiation::{InitialFacts, Negotiation, NegotiationPatch};
use serde_json::json;

use crate::GraphFormat;
use crate::app::App;
use crate::render::{print_run, print_state};

pub struct StartArgs {
    pub id: String,
    pub item: Option<String>,
    pub amount: Option<Money>,
    pub request: Option<String>,
    pub sanctions_verified: bool,
    pub sof_verified: bool,
    pub proof: Option<String>,
}

impl StartArgs {
    fn facts(self) -> Result<InitialFacts> {
        let facts = match (self.request, self.item, self.amount) {
            (Some(request), None, None) => InitialFacts::free_text(request),
            (None, Some(item), Some(amount)) => {
                if amount.is_negative() {
                    bail!("amount must not be negative");
                }
                InitialFacts::declared(item, amount)
            }
            _ => bail!("pass either --request or both --item and --amount"),
        };
        Ok(facts.with_credentials(Credentials {
            sanctions_verified: self.sanctions_verified,
            source_of_funds_verified: self.sof_verified,
            proof_reference: self.proof,
        }))
    }
}

fn emit(run: &Negotiation, as_json: bool) -> Result<()> {
    if as_json {
        let body = json!({ "result": run.result, "state": run.state });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print_run(run);
    }
    Ok(())
}

pub async fn start(app: &App, args: StartArgs, as_json: bool) -> Result<()> {
    let id = args.id.clone();
    let facts = args.facts()?;
    let outcome = app.driver.start(&id, facts).await;
    app.save_ledger().await?;
    let run = outcome.with_context(|| format!("Failed to start `{id}`"))?;
    emit(&run, as_json)
}

pub async fn resume(app: &App, id: &str, as_json: bool) -> Result<()> {
    let outcome = app.driver.resume(id).await;
    app.save_ledger().await?;
    let run = outcome.with_context(|| format!("Failed to resume `{id}`"))?;
    emit(&run, as_json)
}

pub async fn patch(
    app: &App,
    id: &str,
    as_of: &str,
    proof: Option<String>,
    sanctions_verified: bool,
) -> Result<()> {
    let mut patch = NegotiationPatch::source_of_funds(proof);
    if sanctions_verified {
        patch.credentials = CredentialsPatch {
            sanctions_verified: Some(true),
            ..patch.credentials
        };
    }
    let state = app
        .driver
        .patch(id, &patch, as_of)
        .await
        .with_context(|| format!("Failed to patch `{id}` at {as_of}"))?;
    println!("{id}: source of funds recorded at {as_of}");
    print_state(&state);
    Ok(())
}

pub async fn show(app: &App, id: &str, as_json: bool) -> Result<()> {
    let Some(state) = app.driver.state(id).await? else {
        bail!("no transaction `{id}`");
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        println!("{id}");
        print_state(&state);
    }
    Ok(())
}

pub async fn list(app: &App) -> Result<()> {
    let ids = app.driver.list().await?;
    if ids.is_empty() {
        println!("No transactions in {}", app.config.storage.data_dir.display());
        return Ok(());
    }
    for id in ids {
        match app.driver.state(&id).await? {
            Some(state) => println!(
                "{id:<24} {:<14} {:>12} {}",
                state.compliance_status.as_str(),
                format!("${}", state.amount),
                state
                    .cursor
                    .terminal
                    .as_deref()
                    .map(|end| format!("finished ({end})"))
                    .unwrap_or_else(|| format!("after {}", state.cursor.current_node)),
            ),
            None => println!("{id:<24} (removed)"),
        }
    }
    let ledger = app.ledger.snapshot();
    println!(
        "\nLedger: buyer ${} | seller ${} | escrow ${}",
        ledger.buyer, ledger.seller, ledger.escrow
    );
    Ok(())
}

pub async fn graph(app: &App, format: GraphFormat, id: Option<&str>) -> Result<()> {
    let schematic = app.driver.schematic();
    match format {
        GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&schematic.to_json())?),
        GraphFormat::Mermaid => {
            let highlight = match id {
                Some(id) => {
                    let state = app
                        .driver
                        .state(id)
                        .await?
                        .with_context(|| format!("no transaction `{id}`"))?;
                    Some(state.cursor.current_node)
                }
                None => None,
            };
            print!("{}", schematic.to_mermaid(highlight.as_deref()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> StartArgs {
        StartArgs {
            id: "tx-1".into(),
            item: None,
            amount: None,
            request: None,
            sanctions_verified: true,
            sof_verified: false,
            proof: None,
        }
    }

    #[test]
    fn facts_need_request_or_item_and_amount() {
        assert!(args().facts().is_err());

        let only_item = StartArgs {
            item: Some("Watch".into()),
            ..args()
        };
        assert!(only_item.facts().is_err());

        let declared = StartArgs {
            item: Some("Watch".into()),
            amount: Some(Money::from_major(1500)),
            ..args()
        }
        .facts()
        .unwrap();
        assert!(declared.credentials.sanctions_verified);
        assert!(!declared.credentials.source_of_funds_verified);

        let both = StartArgs {
            request: Some("buy 5 pens".into()),
            item: Some("Watch".into()),
            amount: Some(Money::from_major(1500)),
            ..args()
        };
        assert!(both.facts().is_err());
    }
}
