//! Shared CLI helpers: vault unlocking, model selection, output rendering.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tokio::sync::broadcast;

use parley_core::config::Config;
use parley_core::routing::{
    evaluate, RoutingContext, RoutingDecision, RoutingRule, RuleStore, RuleStoreError,
};
use parley_core::types::{NormalizedResponse, TaskStatus};
use parley_core::utils::expand_home;
use parley_orchestrator::{Orchestrator, OrchestratorEvent, OrchestratorOptions};
use parley_providers::registry::known_model_ids;
use parley_providers::ProviderSet;
use parley_vault::{SessionContext, Vault};

/// Env var consulted before prompting for the vault passphrase.
pub const PASSPHRASE_ENV: &str = "PARLEY_PASSPHRASE";

// ─────────────────────────────────────────────
// Vault
// ─────────────────────────────────────────────

/// Open the configured vault with a fresh session.
pub fn open_vault(config: &Config) -> Result<Arc<Vault>> {
    let vault = Vault::from_config(&config.vault, Arc::new(SessionContext::new()))
        .context("invalid vault configuration")?;
    Ok(Arc::new(vault))
}

/// Read a passphrase from `PARLEY_PASSPHRASE` or an interactive hidden prompt.
pub fn read_passphrase(prompt: &str, confirm: bool) -> Result<String> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        if !passphrase.is_empty() {
            return Ok(passphrase);
        }
    }

    let mut input = dialoguer::Password::new().with_prompt(prompt);
    if confirm {
        input = input.with_confirmation("Repeat passphrase", "Passphrases do not match");
    }
    input.interact().context("failed to read passphrase")
}

/// Prompt for a replacement passphrase. `PARLEY_PASSPHRASE` holds the current
/// one and is never consulted here.
pub fn read_new_passphrase(interactive: bool) -> Result<String> {
    if !interactive {
        bail!("a new passphrase must be entered at an interactive terminal");
    }
    dialoguer::Password::new()
        .with_prompt("New vault passphrase")
        .with_confirmation("Repeat passphrase", "Passphrases do not match")
        .interact()
        .context("failed to read passphrase")
}

/// Reject an empty replacement, or one equal to the passphrase in use.
pub fn check_new_passphrase(current: Option<&str>, new: &str) -> Result<()> {
    if new.is_empty() {
        bail!("passphrase must not be empty");
    }
    if current == Some(new) {
        bail!("new passphrase is the same as the current one");
    }
    Ok(())
}

/// Whether hidden prompts can be shown.
pub fn is_interactive() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

/// Unlock an existing vault, reusing the session's cached passphrase if any.
pub async fn unlock_vault(vault: &Vault) -> Result<()> {
    if vault.resume().await {
        return Ok(());
    }
    if !vault.exists()? {
        bail!("no vault found; create one with `parley vault init`");
    }
    let passphrase = read_passphrase("Vault passphrase", false)?;
    if !vault.unlock(&passphrase).await {
        bail!("incorrect passphrase");
    }
    Ok(())
}

/// Unlock the vault if one exists. Returns whether credentials are available.
pub async fn unlock_if_present(vault: &Vault) -> Result<bool> {
    if vault.is_unlocked() {
        return Ok(true);
    }
    if !vault.exists()? {
        eprintln!(
            "{}",
            "No vault found; every model will report a missing credential. \
             Run `parley vault init` first."
                .yellow()
        );
        return Ok(false);
    }
    unlock_vault(vault).await?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Rules and model selection
// ─────────────────────────────────────────────

pub fn rule_store(config: &Config) -> RuleStore {
    RuleStore::new(config.routing.rules_path.as_deref().map(expand_home))
}

/// Rules that take part in model selection; invalid ones are skipped.
pub fn routable_rules(config: &Config) -> Result<Vec<RoutingRule>, RuleStoreError> {
    rule_store(config).load_routable(&known_model_ids())
}

/// Where the models of a run came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Explicit,
    Rule { id: String, name: String },
    Defaults,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub models: Vec<String>,
    pub source: ModelSource,
}

/// Pick the models for `prompt`: explicit list, else the first matching
/// routing rule (when auto-routing), else the configured defaults.
pub fn choose_models(
    config: &Config,
    rules: &[RoutingRule],
    explicit: &[String],
    preset: Option<&str>,
    prompt: &str,
) -> Selection {
    if !explicit.is_empty() {
        return Selection {
            models: explicit.to_vec(),
            source: ModelSource::Explicit,
        };
    }

    if config.routing.auto_route {
        let preset = preset.or(config.defaults.preset.as_deref());
        let ctx = RoutingContext::from_prompt(prompt, preset);
        if let RoutingDecision::Matched {
            rule_id,
            rule_name,
            models,
        } = evaluate(rules, &ctx)
        {
            return Selection {
                models,
                source: ModelSource::Rule {
                    id: rule_id,
                    name: rule_name,
                },
            };
        }
    }

    Selection {
        models: config.defaults.models.clone(),
        source: ModelSource::Defaults,
    }
}

pub fn print_selection(selection: &Selection) {
    let source = match &selection.source {
        ModelSource::Explicit => "explicit".to_string(),
        ModelSource::Rule { id, name } => format!("rule '{}' ({})", name, id),
        ModelSource::Defaults => "defaults".to_string(),
    };
    println!(
        "{} {}  {}",
        "Models:".bold(),
        selection.models.join(", "),
        format!("[{}]", source).dimmed()
    );
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

pub fn build_orchestrator(config: &Config, vault: Arc<Vault>) -> Orchestrator {
    Orchestrator::new(
        ProviderSet::from_config(&config.providers),
        vault,
        OrchestratorOptions::from_config(config),
    )
}

/// Print one orchestrator event. Pending updates are silent.
pub fn render_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::RunStarted { model_ids } => {
            println!(
                "{}",
                format!("Running {} model(s)…", model_ids.len()).dimmed()
            );
        }
        OrchestratorEvent::TaskUpdated {
            model_id, status, ..
        } => match status {
            TaskStatus::Pending => {}
            TaskStatus::Running => {
                println!("  {} {}", "⠿".dimmed(), model_id.dimmed());
            }
            TaskStatus::Success { response } => print_response(response),
            TaskStatus::Error { message, can_retry } => {
                let hint = if *can_retry { " (retryable)" } else { "" };
                println!(
                    "  {} {}: {}{}",
                    "✗".red(),
                    model_id.bold(),
                    message.red(),
                    hint.dimmed()
                );
            }
            TaskStatus::Cancelled => {
                println!("  {} {} cancelled", "·".yellow(), model_id.bold());
            }
        },
        OrchestratorEvent::Reset => {}
    }
}

/// Print events until the orchestrator goes away.
pub async fn print_events(mut events: broadcast::Receiver<OrchestratorEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => render_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Status printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Print a model's response with a one-line stats footer.
pub fn print_response(response: &NormalizedResponse) {
    println!();
    println!(
        "{} {}",
        format!("── {}", response.model).cyan().bold(),
        format!("({})", response.provider).dimmed()
    );
    if response.content.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", response.content);
    }
    println!("{}", format_stats(response).dimmed());
    println!();
}

/// `tokens: 42 (est.) · 812 ms · $0.000120`
pub fn format_stats(response: &NormalizedResponse) -> String {
    let mut parts = vec![format!(
        "tokens: {}{}",
        response.usage.total_tokens,
        if response.usage.estimated { " (est.)" } else { "" }
    )];
    if let Some(latency) = response.latency_ms {
        parts.push(format!("{} ms", latency));
    }
    if let Some(cost) = response.estimated_cost {
        parts.push(format!("${:.6}", cost));
    }
    parts.join(" · ")
}

/// Print the banner shown at REPL start.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Parley".cyan().bold(), version.dimmed());
    println!(
        "{}",
        "Type a prompt, /help for commands, or \"exit\" to quit.".dimmed()
    );
    println!();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::routing::{ContentLength, RuleCondition};
    use parley_core::types::Usage;

    fn rule(id: &str, condition: RuleCondition, models: &[&str]) -> RoutingRule {
        RoutingRule {
            id: id.to_string(),
            name: format!("rule {}", id),
            condition,
            preferred_models: models.iter().map(|m| m.to_string()).collect(),
            enabled: true,
        }
    }

    #[test]
    fn new_passphrase_ignores_env_var() {
        std::env::set_var(PASSPHRASE_ENV, "p1");
        let result = read_new_passphrase(false);
        std::env::remove_var(PASSPHRASE_ENV);

        let err = result.unwrap_err().to_string();
        assert!(err.contains("interactive"));
    }

    #[test]
    fn new_passphrase_must_differ() {
        assert!(check_new_passphrase(Some("p1"), "p1").is_err());
        assert!(check_new_passphrase(Some("p1"), "").is_err());
        assert!(check_new_passphrase(Some("p1"), "p2").is_ok());
        assert!(check_new_passphrase(None, "p2").is_ok());
    }

    #[test]
    fn explicit_models_win() {
        let config = Config::default();
        let rules = vec![rule("any", RuleCondition::default(), &["gpt-4o"])];
        let explicit = vec!["gemini-1.5-pro".to_string()];

        let selection = choose_models(&config, &rules, &explicit, None, "hi");
        assert_eq!(selection.models, explicit);
        assert_eq!(selection.source, ModelSource::Explicit);
    }

    #[test]
    fn matching_rule_is_used() {
        let config = Config::default();
        let rules = vec![
            rule(
                "long",
                RuleCondition {
                    content_length: Some(ContentLength::Long),
                    ..Default::default()
                },
                &["gpt-4o"],
            ),
            rule(
                "code",
                RuleCondition {
                    has_code: Some(true),
                    ..Default::default()
                },
                &["codestral-latest"],
            ),
        ];
        let prompt = "```rust\nfn main() {}\n```";

        let selection = choose_models(&config, &rules, &[], None, prompt);
        assert_eq!(selection.models, vec!["codestral-latest".to_string()]);
        assert_eq!(
            selection.source,
            ModelSource::Rule {
                id: "code".into(),
                name: "rule code".into()
            }
        );
    }

    #[test]
    fn preset_falls_back_to_config() {
        let mut config = Config::default();
        config.defaults.preset = Some("review".into());
        let rules = vec![rule(
            "review",
            RuleCondition {
                preset: Some("review".into()),
                ..Default::default()
            },
            &["claude-3-opus-20240229"],
        )];

        let selection = choose_models(&config, &rules, &[], None, "hi");
        assert_eq!(selection.models, vec!["claude-3-opus-20240229".to_string()]);

        let selection = choose_models(&config, &rules, &[], Some("chat"), "hi");
        assert_eq!(selection.source, ModelSource::Defaults);
    }

    #[test]
    fn no_match_or_auto_route_off_uses_defaults() {
        let mut config = Config::default();
        let rules = vec![rule("any", RuleCondition::default(), &["gpt-4o"])];

        config.routing.auto_route = false;
        let selection = choose_models(&config, &rules, &[], None, "hi");
        assert_eq!(selection.models, config.defaults.models);
        assert_eq!(selection.source, ModelSource::Defaults);

        config.routing.auto_route = true;
        let selection = choose_models(&config, &[], &[], None, "hi");
        assert_eq!(selection.source, ModelSource::Defaults);
    }

    #[test]
    fn modelless_hand_edited_rule_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"id": "any", "name": "Any", "preferredModels": []}]"#,
        )
        .unwrap();
        let mut config = Config::default();
        config.routing.rules_path = Some(path.to_string_lossy().into_owned());

        let rules = routable_rules(&config).unwrap();
        assert!(rules.is_empty());

        let selection = choose_models(&config, &rules, &[], None, "hi");
        assert_eq!(selection.models, config.defaults.models);
        assert_eq!(selection.source, ModelSource::Defaults);
    }

    #[test]
    fn stats_line() {
        let response = NormalizedResponse {
            content: "ok".into(),
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 2,
                total_tokens: 12,
                estimated: true,
            },
            provider: "openai".into(),
            model: "gpt-4o".into(),
            latency_ms: Some(812),
            estimated_cost: Some(0.00012),
            is_mock: None,
        };
        assert_eq!(format_stats(&response), "tokens: 12 (est.) · 812 ms · $0.000120");
    }
}
