//! `parley run`: send one prompt to several models and stream the results.
//!
//! - `parley run "PROMPT" [-m a,b] [--preset NAME] [--json]`
//! - Prompt `-` reads it from stdin.
//! - Ctrl-C cancels every model still in flight; finished ones are kept.

use std::future::Future;
use std::io::Read;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use parley_core::config::load_config;
use parley_core::types::NormalizedResponse;
use parley_orchestrator::{Orchestrator, OrchestratorEvent};

use crate::helpers;

pub struct RunArgs {
    pub prompt: String,
    pub models: Vec<String>,
    pub preset: Option<String>,
    pub json: bool,
}

/// Run the `run` command.
pub async fn run(args: RunArgs) -> Result<()> {
    let config = load_config(None);
    let prompt = read_prompt(&args.prompt)?;

    let rules = helpers::routable_rules(&config).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unreadable routing rules");
        Vec::new()
    });
    let selection =
        helpers::choose_models(&config, &rules, &args.models, args.preset.as_deref(), &prompt);
    if selection.models.is_empty() {
        bail!("no models selected; pass -m or set defaults.models in the config");
    }

    let vault = helpers::open_vault(&config)?;
    helpers::unlock_if_present(&vault).await?;
    let orchestrator = helpers::build_orchestrator(&config, vault.clone());

    info!(models = ?selection.models, "Dispatching prompt");
    let responses = if args.json {
        with_ctrl_c(&orchestrator, orchestrator.run(&prompt, &selection.models)).await
    } else {
        helpers::print_selection(&selection);
        let events = orchestrator.subscribe();
        let responses = stream_run(
            &orchestrator,
            events,
            orchestrator.run(&prompt, &selection.models),
        )
        .await;
        print_summary(&orchestrator);
        responses
    };

    if args.json {
        let out = serde_json::json!({
            "responses": responses,
            "tasks": orchestrator.statuses(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }

    vault.session().end();
    Ok(())
}

/// `-` means stdin.
fn read_prompt(arg: &str) -> Result<String> {
    let prompt = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read prompt from stdin")?;
        buf
    } else {
        arg.to_string()
    };
    if prompt.trim().is_empty() {
        bail!("prompt is empty");
    }
    Ok(prompt)
}

/// Drive `work` to completion, cancelling every task on Ctrl-C.
async fn with_ctrl_c<T>(orchestrator: &Orchestrator, work: impl Future<Output = T>) -> T {
    tokio::pin!(work);
    loop {
        tokio::select! {
            out = &mut work => return out,
            _ = tokio::signal::ctrl_c() => {
                if orchestrator.cancel(None) {
                    eprintln!("{}", "Cancelled in-flight models.".yellow());
                }
            }
        }
    }
}

/// Like [`with_ctrl_c`], printing status events as they arrive.
async fn stream_run(
    orchestrator: &Orchestrator,
    mut events: broadcast::Receiver<OrchestratorEvent>,
    work: impl Future<Output = Vec<NormalizedResponse>>,
) -> Vec<NormalizedResponse> {
    tokio::pin!(work);
    let responses = loop {
        tokio::select! {
            responses = &mut work => break responses,
            event = events.recv() => match event {
                Ok(event) => helpers::render_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                if orchestrator.cancel(None) {
                    eprintln!("{}", "Cancelled in-flight models.".yellow());
                }
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        helpers::render_event(&event);
    }
    responses
}

fn print_summary(orchestrator: &Orchestrator) {
    let tasks = orchestrator.statuses();
    let succeeded = tasks
        .iter()
        .filter(|t| t.status.response().is_some())
        .count();
    let line = format!("{}/{} succeeded", succeeded, tasks.len());
    if succeeded == tasks.len() {
        println!("{}", line.green());
    } else {
        println!("{}", line.yellow());
    }
}
