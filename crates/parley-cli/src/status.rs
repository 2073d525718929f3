//! `parley status`: show configuration, vault and routing state.

use anyhow::Result;
use colored::Colorize;

use parley_core::config::{get_config_path, load_config};
use parley_core::utils::expand_home;
use parley_vault::get_vault_path;

use crate::helpers;

fn found(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "Parley Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        found(config_path.exists())
    );

    // Defaults
    let defaults = &config.defaults;
    println!("  {:<18} {}", "Default models:".bold(), defaults.models.join(", "));
    println!(
        "  {:<18} {} | max_tokens: {}",
        "Parameters:".bold(),
        format!("temp: {}", defaults.temperature).dimmed(),
        format!("{}", defaults.max_tokens).dimmed(),
    );
    if let Some(preset) = &defaults.preset {
        println!("  {:<18} {}", "Preset:".bold(), preset);
    }
    let timeout = match config.orchestrator.task_timeout() {
        Some(limit) => format!("{}s", limit.as_secs()),
        None => "none".to_string(),
    };
    println!("  {:<18} {}", "Task timeout:".bold(), timeout);

    // Vault
    let vault_path = config
        .vault
        .path
        .as_deref()
        .map(expand_home)
        .unwrap_or_else(get_vault_path);
    println!(
        "  {:<18} {} {}",
        "Vault:".bold(),
        vault_path.display(),
        found(vault_path.exists())
    );

    // Routing
    let store = helpers::rule_store(&config);
    let rules = match store.load() {
        Ok(rules) => {
            let enabled = rules.iter().filter(|r| r.enabled).count();
            format!("{} ({} enabled)", rules.len(), enabled)
        }
        Err(e) => format!("{}", format!("unreadable: {}", e).red()),
    };
    println!(
        "  {:<18} {} {}",
        "Rules:".bold(),
        store.path().display(),
        rules.dimmed()
    );
    println!(
        "  {:<18} {}",
        "Auto-route:".bold(),
        if config.routing.auto_route { "on" } else { "off" }
    );

    // Provider overrides
    let overrides: Vec<String> = parley_providers::PROVIDERS
        .iter()
        .filter_map(|spec| {
            let base = config.providers.get_by_name(spec.name)?.api_base.as_deref()?;
            Some(format!("{} → {}", spec.name, base))
        })
        .collect();
    if !overrides.is_empty() {
        println!();
        println!("  {}", "API base overrides:".bold());
        for line in overrides {
            println!("    {}", line);
        }
    }

    println!();
    Ok(())
}
