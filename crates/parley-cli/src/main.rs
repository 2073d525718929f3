//! Parley CLI: entry point.
//!
//! # Commands
//!
//! - `parley run PROMPT [-m a,b]`: one prompt, many models, results side by side
//! - `parley repl`: interactive session with cancel/retry
//! - `parley vault ...`: encrypted API key storage
//! - `parley rules ...`: routing rules and dry-run simulation
//! - `parley providers ...`: provider catalog and key checks
//! - `parley status`: show configuration and state

mod helpers;
mod providers_cmd;
mod repl;
mod rules_cmd;
mod run_cmd;
mod status;
mod vault_cmd;

use anyhow::Result;
use clap::{Parser, Subcommand};

use parley_core::config::load_config;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Parley: ask several LLMs at once and compare their answers
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt to several models concurrently
    Run {
        /// Prompt text, or "-" to read stdin
        prompt: String,

        /// Models to ask (comma-separated). Routing rules decide when omitted.
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Routing preset for this prompt
        #[arg(short, long)]
        preset: Option<String>,

        /// Print responses and task states as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Interactive session
    Repl {
        /// Routing preset for the session
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Manage the encrypted credential vault
    Vault {
        #[command(subcommand)]
        action: vault_cmd::VaultCommands,
    },

    /// Manage routing rules
    Rules {
        #[command(subcommand)]
        action: rules_cmd::RulesCommands,
    },

    /// Inspect and test providers
    Providers {
        #[command(subcommand)]
        action: providers_cmd::ProvidersCommands,
    },

    /// Show configuration and state
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    match cli.command {
        Commands::Run {
            prompt,
            models,
            preset,
            json,
        } => {
            run_cmd::run(run_cmd::RunArgs {
                prompt,
                models,
                preset,
                json,
            })
            .await
        }
        Commands::Repl { preset } => repl::run(load_config(None), preset).await,
        Commands::Vault { action } => vault_cmd::dispatch(action).await,
        Commands::Rules { action } => rules_cmd::dispatch(action),
        Commands::Providers { action } => providers_cmd::dispatch(action).await,
        Commands::Status => status::run(),
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(
            "parley=debug,parley_core=debug,parley_providers=debug,\
             parley_vault=debug,parley_orchestrator=debug,info",
        )
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
