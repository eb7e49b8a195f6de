//! Escrowflow CLI
//!
//! # Commands
//! - `escrowflow start --id <id> --item <item> --amount <amount>`: open a negotiation
//! - `escrowflow resume <id>`: continue after a halt point (or retry a failed node)
//! - `escrowflow patch <id> --proof <ref>`: record the source-of-funds proof
//! - `escrowflow show <id>` / `escrowflow list`: inspect checkpoints
//! - `escrowflow graph`: export the workflow as Mermaid or JSON
//! - `escrowflow demo`: run both paths in memory

mod app;
mod commands;
mod demo;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use escrowflow_ledger::Money;
use escrowflow_negotiation::EscrowConfig;
use escrowflow_negotiation::workflow::EXECUTE_ESCROW;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::app::App;
use crate::commands::StartArgs;

#[derive(Parser)]
#[command(name = "escrowflow")]
#[command(author, version, about = "Resumable escrow negotiations")]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true, env = "ESCROWFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum GraphFormat {
    Mermaid,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a negotiation and run it to the first halt point
    Start {
        /// Transaction id
        #[arg(long)]
        id: String,

        /// Item being bought
        #[arg(long, requires = "amount", conflicts_with = "request")]
        item: Option<String>,

        /// Purchase amount, e.g. 1500 or 1500.00
        #[arg(long, requires = "item")]
        amount: Option<Money>,

        /// Free-text request; item and amount are extracted by the reasoner
        #[arg(long)]
        request: Option<String>,

        #[arg(long)]
        sanctions_verified: bool,

        /// Source of funds already verified
        #[arg(long)]
        sof_verified: bool,

        /// Reference to the source-of-funds document
        #[arg(long)]
        proof: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Continue a halted negotiation, or retry a failed node
    Resume {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Record the source-of-funds proof on a halted negotiation
    Patch {
        id: String,

        /// Node the checkpoint must currently sit at
        #[arg(long, default_value = EXECUTE_ESCROW)]
        as_of: String,

        /// Reference to the uploaded document
        #[arg(long)]
        proof: Option<String>,

        /// Also mark sanctions screening as verified
        #[arg(long)]
        sanctions_verified: bool,
    },

    /// Print the stored state of a negotiation
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// List stored negotiations and the ledger
    List,

    /// Export the workflow graph
    Graph {
        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,

        /// Highlight where this transaction's checkpoint sits
        #[arg(long)]
        id: Option<String>,
    },

    /// Run the escrow path and the direct path in memory
    Demo,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("ESCROWFLOW_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = EscrowConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "Configuration loaded");

    let command = match cli.command {
        Commands::Demo => return demo::run(&config).await,
        command => command,
    };

    let app = App::open(config).await?;
    match command {
        Commands::Start {
            id,
            item,
            amount,
            request,
            sanctions_verified,
            sof_verified,
            proof,
            json,
        } => {
            let args = StartArgs {
                id,
                item,
                amount,
                request,
                sanctions_verified,
                sof_verified,
                proof,
            };
            commands::start(&app, args, json).await
        }
        Commands::Resume { id, json } => commands::resume(&app, &id, json).await,
        Commands::Patch {
            id,
            as_of,
            proof,
            sanctions_verified,
        } => commands::patch(&app, &id, &as_of, proof, sanctions_verified).await,
        Commands::Show { id, json } => commands::show(&app, &id, json).await,
        Commands::List => commands::list(&app).await,
        Commands::Graph { format, id } => commands::graph(&app, format, id.as_deref()).await,
        Commands::Demo => demo::run(&app.config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn start_parses_amounts_as_money() {
        let cli = Cli::try_parse_from([
            "escrowflow",
            "start",
            "--id",
            "tx-1",
            "--item",
            "Vintage Rolex",
            "--amount",
            "1500",
        ])
        .unwrap();
        match cli.command {
            Commands::Start { amount, .. } => assert_eq!(amount, Some(Money::from_major(1500))),
            _ => panic!("expected start"),
        }

        assert!(
            Cli::try_parse_from([
                "escrowflow",
                "start",
                "--id",
                "tx-1",
                "--request",
                "buy a watch",
                "--item",
                "Watch",
                "--amount",
                "5",
            ])
            .is_err()
        );
    }

    #[test]
    fn patch_defaults_to_the_escrow_halt() {
        let cli =
            Cli::try_parse_from(["escrowflow", "patch", "tx-1", "--proof", "doc.pdf"]).unwrap();
        match cli.command {
            Commands::Patch { as_of, proof, .. } => {
                assert_eq!(as_of, EXECUTE_ESCROW);
                assert_eq!(proof.as_deref(), Some("doc.pdf"));
            }
            _ => panic!("expected patch"),
        }
    }
}
