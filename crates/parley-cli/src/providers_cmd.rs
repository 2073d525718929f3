//! `parley providers`: the provider catalog and connectivity checks.
//!
//! - `parley providers list [--models]`
//! - `parley providers test [PROVIDER]`: check every stored key, or one

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;

use parley_core::config::load_config;
use parley_providers::registry::{find_by_name, WireFormat, PROVIDERS};
use parley_providers::ProviderSet;

use crate::helpers;

/// Providers subcommands.
#[derive(Subcommand)]
pub enum ProvidersCommands {
    /// List supported providers
    List {
        /// Also list catalog models with prices
        #[arg(short, long, default_value_t = false)]
        models: bool,
    },

    /// Check stored keys against the providers
    Test {
        /// Only test this provider
        provider: Option<String>,
    },
}

/// Dispatch a providers subcommand.
pub async fn dispatch(cmd: ProvidersCommands) -> Result<()> {
    match cmd {
        ProvidersCommands::List { models } => {
            list(models);
            Ok(())
        }
        ProvidersCommands::Test { provider } => test(provider.as_deref()).await,
    }
}

fn wire_label(wire: WireFormat) -> &'static str {
    match wire {
        WireFormat::OpenAiCompatible => "openai-compatible",
        WireFormat::Anthropic => "anthropic",
        WireFormat::Gemini => "gemini",
    }
}

fn list(show_models: bool) {
    let config = load_config(None);

    println!();
    for spec in PROVIDERS {
        let base = config
            .providers
            .get_by_name(spec.name)
            .and_then(|p| p.api_base.as_deref())
            .unwrap_or(spec.default_api_base);
        println!(
            "  {:<12} {:<18} {}",
            spec.name.bold(),
            spec.display_name,
            format!("{} · {}", wire_label(spec.wire), base).dimmed()
        );
        if show_models {
            for model in spec.models {
                println!(
                    "      {:<36} {}",
                    model.id,
                    format!(
                        "${:.2} in / ${:.2} out per 1M tokens",
                        model.input_price, model.output_price
                    )
                    .dimmed()
                );
            }
        }
    }
    println!();
}

async fn test(only: Option<&str>) -> Result<()> {
    if let Some(name) = only {
        if find_by_name(name).is_none() {
            bail!("unknown provider '{}'", name);
        }
    }

    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    helpers::unlock_vault(&vault).await?;
    let credentials = vault.credentials().unwrap_or_default();
    let adapters = ProviderSet::from_config(&config.providers);

    println!();
    let mut tested = 0;
    for spec in PROVIDERS {
        if only.is_some_and(|name| name != spec.name) {
            continue;
        }
        let Some(key) = credentials.get(spec.name) else {
            if only.is_some() {
                println!("  {:<12} {}", spec.name.bold(), "· no key stored".dimmed());
            }
            continue;
        };
        let Some(adapter) = adapters.get(spec.name) else {
            continue;
        };

        tested += 1;
        if adapter.test_connection(key).await {
            println!("  {:<12} {}", spec.name.bold(), "✓ ok".green());
        } else {
            println!("  {:<12} {}", spec.name.bold(), "✗ failed".red());
        }
    }
    if tested == 0 && only.is_none() {
        println!("  {}", "No keys stored. Add one with `parley vault set`.".dimmed());
    }
    println!();

    vault.session().end();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_wire_format_has_a_label() {
        for spec in PROVIDERS {
            assert!(!wire_label(spec.wire).is_empty());
        }
        assert_eq!(wire_label(WireFormat::Gemini), "gemini");
    }
}
