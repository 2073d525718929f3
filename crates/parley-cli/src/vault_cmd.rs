//! `parley vault`: manage the encrypted credential vault.
//!
//! - `parley vault init`: create an empty vault under a new passphrase
//! - `parley vault set <PROVIDER> [--key KEY]`: store an API key
//! - `parley vault remove <PROVIDER>`: delete an API key
//! - `parley vault list`: show stored providers with masked keys
//! - `parley vault passwd`: re-encrypt under a new, interactively entered passphrase
//! - `parley vault clear [--yes]`: delete the vault file
//! - `parley vault status`: show vault location and state
//!
//! Every command unlocks for its own process only and ends the session on
//! exit. Locking a long-lived session is the REPL's `/lock`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;

use parley_core::config::load_config;
use parley_core::types::CredentialSet;
use parley_core::utils::{expand_home, mask_secret};
use parley_providers::registry::{find_by_name, key_format_ok, PROVIDERS};
use parley_vault::get_vault_path;

use crate::helpers;

// ─────────────────────────────────────────────
// Subcommand enum
// ─────────────────────────────────────────────

/// Vault subcommands.
#[derive(Subcommand)]
pub enum VaultCommands {
    /// Create an empty vault
    Init,

    /// Store (or replace) the API key for a provider
    Set {
        /// Provider name, e.g. "openai"
        provider: String,

        /// API key. Prompted for when omitted.
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Remove the API key for a provider
    Remove {
        /// Provider name
        provider: String,
    },

    /// List stored providers (keys masked)
    List,

    /// Change the vault passphrase
    Passwd,

    /// Delete the vault file
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },

    /// Show vault location and state
    Status,
}

// ─────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────

/// Dispatch a vault subcommand.
pub async fn dispatch(cmd: VaultCommands) -> Result<()> {
    match cmd {
        VaultCommands::Init => init().await,
        VaultCommands::Set { provider, key } => set(&provider, key).await,
        VaultCommands::Remove { provider } => remove(&provider).await,
        VaultCommands::List => list().await,
        VaultCommands::Passwd => passwd().await,
        VaultCommands::Clear { yes } => clear(yes),
        VaultCommands::Status => status(),
    }
}

/// Canonical provider name, or an error listing the valid ones.
fn check_provider(name: &str) -> Result<&'static str> {
    let lower = name.to_lowercase();
    match find_by_name(&lower) {
        Some(spec) => Ok(spec.name),
        None => {
            let names: Vec<&str> = PROVIDERS.iter().map(|p| p.name).collect();
            bail!("unknown provider '{}'; expected one of: {}", name, names.join(", "))
        }
    }
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

async fn init() -> Result<()> {
    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    if vault.exists()? {
        bail!("a vault already exists; use `parley vault passwd` to change its passphrase");
    }

    let passphrase = helpers::read_passphrase("New vault passphrase", true)?;
    if passphrase.is_empty() {
        bail!("passphrase must not be empty");
    }
    vault
        .save(CredentialSet::new(), &passphrase)
        .await
        .context("failed to create vault")?;

    println!("  {} vault created", "✓".green());
    println!(
        "  Add keys with {}",
        "parley vault set <provider>".cyan()
    );
    vault.session().end();
    Ok(())
}

async fn set(provider: &str, key: Option<String>) -> Result<()> {
    let name = check_provider(provider)?;
    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    helpers::unlock_vault(&vault).await?;

    let key = match key {
        Some(key) => key,
        None => dialoguer::Password::new()
            .with_prompt(format!("API key for {}", name))
            .interact()
            .context("failed to read API key")?,
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("API key must not be empty");
    }
    if let Some(spec) = find_by_name(name) {
        if !key_format_ok(spec, key) {
            eprintln!(
                "  {} key does not look like a {} key; storing it anyway",
                "!".yellow(),
                spec.display_name
            );
        }
    }

    vault.set_credential(name, key).await?;
    println!("  {} stored key for {} ({})", "✓".green(), name, mask_secret(key));
    vault.session().end();
    Ok(())
}

async fn remove(provider: &str) -> Result<()> {
    let name = check_provider(provider)?;
    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    helpers::unlock_vault(&vault).await?;

    if vault.remove_credential(name).await? {
        println!("  {} removed key for {}", "✓".green(), name);
    } else {
        println!("  {} no key stored for {}", "·".dimmed(), name);
    }
    vault.session().end();
    Ok(())
}

async fn list() -> Result<()> {
    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    helpers::unlock_vault(&vault).await?;

    let credentials = vault.credentials().unwrap_or_default();
    println!();
    if credentials.is_empty() {
        println!("  {}", "No keys stored.".dimmed());
    }
    for spec in PROVIDERS {
        match credentials.get(spec.name) {
            Some(secret) => println!(
                "  {:<14} {} {}",
                spec.name.bold(),
                "✓".green(),
                mask_secret(secret).dimmed()
            ),
            None => println!("  {:<14} {}", spec.name, "· not set".dimmed()),
        }
    }
    // Keys stored under names no longer in the registry.
    for name in credentials.providers() {
        if find_by_name(name).is_none() {
            println!("  {:<14} {}", name, "(unknown provider)".yellow());
        }
    }
    println!();
    vault.session().end();
    Ok(())
}

async fn passwd() -> Result<()> {
    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    helpers::unlock_vault(&vault).await?;

    let credentials = vault.credentials().unwrap_or_default();
    let passphrase = helpers::read_new_passphrase(helpers::is_interactive())?;
    helpers::check_new_passphrase(vault.session().cached().as_deref(), &passphrase)?;
    vault.save(credentials, &passphrase).await?;
    println!("  {} passphrase changed", "✓".green());
    vault.session().end();
    Ok(())
}

fn clear(yes: bool) -> Result<()> {
    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    if !vault.exists()? {
        println!("  {}", "No vault to clear.".dimmed());
        return Ok(());
    }

    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Delete the vault and every stored key?")
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            println!("  {}", "Aborted.".dimmed());
            return Ok(());
        }
    }

    vault.clear()?;
    println!("  {} vault deleted", "✓".green());
    Ok(())
}

fn status() -> Result<()> {
    let config = load_config(None);
    let vault = helpers::open_vault(&config)?;
    let path = config
        .vault
        .path
        .as_deref()
        .map(expand_home)
        .unwrap_or_else(get_vault_path);

    println!();
    println!(
        "  {:<14} {} {}",
        "Vault:".bold(),
        path.display(),
        if vault.exists()? {
            "✓".green().to_string()
        } else {
            "(not created)".red().to_string()
        }
    );
    println!(
        "  {:<14} PBKDF2-HMAC-SHA256, {} iterations",
        "KDF:".bold(),
        parley_vault::crypto::DEFAULT_ITERATIONS
    );
    println!("  {:<14} AES-256-GCM", "Cipher:".bold());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(clap::Parser)]
    struct VaultCli {
        #[command(subcommand)]
        command: VaultCommands,
    }

    #[test]
    fn lock_is_not_a_vault_subcommand() {
        use clap::Parser;
        let err = VaultCli::try_parse_from(["vault", "lock"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
        assert!(VaultCli::try_parse_from(["vault", "status"]).is_ok());
    }

    #[test]
    fn provider_names_are_normalized() {
        assert_eq!(check_provider("OpenAI").unwrap(), "openai");
        assert_eq!(check_provider("gemini").unwrap(), "gemini");
    }

    #[test]
    fn unknown_provider_lists_choices() {
        let err = check_provider("acme").unwrap_err().to_string();
        assert!(err.contains("acme"));
        assert!(err.contains("anthropic"));
    }
}
