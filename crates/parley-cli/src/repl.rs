//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! Runs go to the background, so `/cancel` and `/retry` work while other
//! models are still answering. The vault stays unlocked for the whole
//! session through its cached passphrase, until `/lock`.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tokio::task::JoinHandle;
use tracing::debug;

use parley_core::config::{parse_model_list, Config};
use parley_core::routing::RoutingRule;
use parley_core::utils::get_data_path;
use parley_orchestrator::Orchestrator;
use parley_vault::Vault;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

const HELP: &str = "\
/models [a,b | auto]   pin models for the next prompts, or go back to routing
/preset [NAME | none]  set the routing preset
/status                show the current run's tasks
/cancel [MODEL]        cancel one model, or all in flight
/retry MODEL           re-run one model with the last prompt
/reset                 cancel everything and clear the run
/lock                  lock the vault (next prompt asks again)
exit                   quit";

/// A parsed REPL line.
#[derive(Debug, PartialEq)]
enum Command {
    Prompt(String),
    Models(Option<Vec<String>>),
    ShowModels,
    Preset(Option<String>),
    ShowPreset,
    Status,
    Cancel(Option<String>),
    Retry(String),
    Reset,
    Lock,
    Help,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    if !line.starts_with('/') {
        return Command::Prompt(line.to_string());
    }
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|a| !a.is_empty())),
        None => (line, None),
    };

    match (name, arg) {
        ("/models", None) => Command::ShowModels,
        ("/models", Some("auto")) => Command::Models(None),
        ("/models", Some(list)) => Command::Models(Some(parse_model_list(list))),
        ("/preset", None) => Command::ShowPreset,
        ("/preset", Some("none")) => Command::Preset(None),
        ("/preset", Some(name)) => Command::Preset(Some(name.to_string())),
        ("/status", _) => Command::Status,
        ("/cancel", model) => Command::Cancel(model.map(String::from)),
        ("/retry", Some(model)) => Command::Retry(model.to_string()),
        ("/reset", _) => Command::Reset,
        ("/lock", _) => Command::Lock,
        ("/help", _) => Command::Help,
        _ => Command::Unknown(line.to_string()),
    }
}

struct Session {
    config: Config,
    rules: Vec<RoutingRule>,
    vault: Arc<Vault>,
    orchestrator: Orchestrator,
    pinned: Option<Vec<String>>,
    preset: Option<String>,
    current: Option<JoinHandle<()>>,
}

impl Session {
    fn run_in_flight(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn start_run(&mut self, prompt: String) -> Result<()> {
        helpers::unlock_if_present(&self.vault).await?;

        let explicit = self.pinned.clone().unwrap_or_default();
        let selection = helpers::choose_models(
            &self.config,
            &self.rules,
            &explicit,
            self.preset.as_deref(),
            &prompt,
        );
        if selection.models.is_empty() {
            println!("{}", "No models selected; use /models a,b".yellow());
            return Ok(());
        }
        if self.run_in_flight() {
            println!("{}", "Replacing the previous run.".dimmed());
        }
        helpers::print_selection(&selection);

        let orchestrator = self.orchestrator.clone();
        self.current = Some(tokio::spawn(async move {
            let responses = orchestrator.run(&prompt, &selection.models).await;
            debug!(succeeded = responses.len(), "Background run finished");
        }));
        Ok(())
    }

    async fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Prompt(prompt) => self.start_run(prompt).await?,
            Command::Models(models) => {
                self.pinned = models;
                match &self.pinned {
                    Some(models) => println!("Pinned: {}", models.join(", ")),
                    None => println!("Models follow routing rules again."),
                }
            }
            Command::ShowModels => match &self.pinned {
                Some(models) => println!("Pinned: {}", models.join(", ")),
                None => println!("Routing rules decide (defaults: {})", self.config.defaults.models.join(", ")),
            },
            Command::Preset(preset) => {
                self.preset = preset;
                println!("Preset: {}", self.preset.as_deref().unwrap_or("none"));
            }
            Command::ShowPreset => {
                println!("Preset: {}", self.preset.as_deref().unwrap_or("none"));
            }
            Command::Status => {
                let tasks = self.orchestrator.statuses();
                if tasks.is_empty() {
                    println!("{}", "No run yet.".dimmed());
                }
                for task in tasks {
                    println!(
                        "  {:<36} {} {}",
                        task.model_id,
                        task.status.label(),
                        format!("#{}", task.attempt).dimmed()
                    );
                }
            }
            Command::Cancel(model) => {
                if !self.orchestrator.cancel(model.as_deref()) {
                    println!("{}", "Nothing in flight to cancel.".dimmed());
                }
            }
            Command::Retry(model) => {
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(async move {
                    if let Err(e) = orchestrator.retry_last(&model).await {
                        eprintln!("{} {}", "✗".red(), e);
                    }
                });
            }
            Command::Reset => {
                self.orchestrator.reset();
                println!("{}", "Run cleared.".dimmed());
            }
            Command::Lock => {
                self.vault.lock();
                println!("{}", "Vault locked.".dimmed());
            }
            Command::Help => println!("{}", HELP),
            Command::Unknown(line) => {
                println!("{} {} (try /help)", "Unknown command:".yellow(), line);
            }
        }
        Ok(())
    }
}

/// Run the interactive REPL loop.
pub async fn run(config: Config, preset: Option<String>) -> Result<()> {
    let rules = helpers::routable_rules(&config).unwrap_or_else(|e| {
        eprintln!("{} {}", "Ignoring routing rules:".yellow(), e);
        Vec::new()
    });
    let vault = helpers::open_vault(&config)?;
    let orchestrator = helpers::build_orchestrator(&config, vault.clone());
    let printer = tokio::spawn(helpers::print_events(orchestrator.subscribe()));

    helpers::print_banner();
    helpers::unlock_if_present(&vault).await?;

    let mut session = Session {
        preset: preset.or_else(|| config.defaults.preset.clone()),
        config,
        rules,
        vault,
        orchestrator,
        pinned: None,
        current: None,
    };
    let mut editor = create_editor()?;

    loop {
        // readline blocks; keep background runs moving on other workers.
        let input = match tokio::task::block_in_place(|| editor.readline("> ")) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C cancels a run in flight, otherwise exits.
                if session.orchestrator.cancel(None) {
                    println!("{}", "Cancelled in-flight models.".yellow());
                    continue;
                }
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }

        let _ = editor.add_history_entry(&input);
        if let Err(e) = session.handle(parse_command(trimmed)).await {
            eprintln!("{} {e}", "✗".red());
        }
    }

    session.orchestrator.reset();
    printer.abort();
    session.vault.session().end();
    save_history(&mut editor);

    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    get_data_path().join("history").join("repl_history")
}

/// Check if input is an exit command.
fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("EXIT"));
        assert!(is_exit_command("/quit"));
        assert!(is_exit_command(":q"));
        assert!(!is_exit_command("hello"));
        assert!(!is_exit_command(""));
    }

    #[test]
    fn history_path_under_data_dir() {
        let path = history_path();
        assert!(path.to_string_lossy().contains(".parley"));
        assert!(path.to_string_lossy().contains("repl_history"));
    }

    #[test]
    fn plain_text_is_a_prompt() {
        assert_eq!(
            parse_command("explain lifetimes"),
            Command::Prompt("explain lifetimes".into())
        );
    }

    #[test]
    fn model_commands() {
        assert_eq!(parse_command("/models"), Command::ShowModels);
        assert_eq!(parse_command("/models auto"), Command::Models(None));
        assert_eq!(
            parse_command("/models gpt-4o, gemini-1.5-pro"),
            Command::Models(Some(vec!["gpt-4o".into(), "gemini-1.5-pro".into()]))
        );
    }

    #[test]
    fn task_commands() {
        assert_eq!(parse_command("/cancel"), Command::Cancel(None));
        assert_eq!(parse_command("/cancel gpt-4o"), Command::Cancel(Some("gpt-4o".into())));
        assert_eq!(parse_command("/retry gpt-4o"), Command::Retry("gpt-4o".into()));
        assert_eq!(parse_command("/retry"), Command::Unknown("/retry".into()));
        assert_eq!(parse_command("/preset none"), Command::Preset(None));
        assert_eq!(parse_command("/lock"), Command::Lock);
        assert_eq!(parse_command("/frobnicate"), Command::Unknown("/frobnicate".into()));
    }
}
