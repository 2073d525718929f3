//! `parley rules`: edit and test routing rules.
//!
//! - `parley rules list`: rules in evaluation order
//! - `parley rules add --name NAME --models a,b [--preset P] [--length L] [--code BOOL] [--at N]`
//! - `parley rules remove <ID>` / `enable <ID>` / `disable <ID>`
//! - `parley rules simulate (--prompt TEXT | --length L [--code BOOL]) [--preset P]`
//! - `parley rules import <FILE>` / `export [FILE]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;

use parley_core::config::load_config;
use parley_core::routing::{
    parse_rules_json, simulate, ContentLength, Mismatch, RoutingContext, RoutingDecision,
    RoutingRule, RuleCondition, RuleStore,
};
use parley_core::utils::expand_home;
use parley_providers::registry::known_model_ids;

use crate::helpers;

// ─────────────────────────────────────────────
// Subcommand enum
// ─────────────────────────────────────────────

/// Rules subcommands.
#[derive(Subcommand)]
pub enum RulesCommands {
    /// List rules in evaluation order
    List,

    /// Add a rule
    Add {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Preferred models, most preferred first (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        models: Vec<String>,

        /// Rule id. Derived from the name when omitted.
        #[arg(long)]
        id: Option<String>,

        /// Match only this preset
        #[arg(short, long)]
        preset: Option<String>,

        /// Match only this prompt length: short, medium or long
        #[arg(short, long)]
        length: Option<ContentLength>,

        /// Match only prompts with (true) or without (false) code
        #[arg(short, long)]
        code: Option<bool>,

        /// Insert at this position (0 = evaluated first). Appends by default.
        #[arg(long)]
        at: Option<usize>,

        /// Store the rule disabled
        #[arg(long, default_value_t = false)]
        disabled: bool,
    },

    /// Remove a rule by id
    Remove { id: String },

    /// Enable a rule
    Enable { id: String },

    /// Disable a rule
    Disable { id: String },

    /// Show which rule would fire for an input, without running anything
    Simulate {
        /// Prompt text to classify. Length and code are taken from it.
        #[arg(long, conflicts_with_all = ["length", "code"])]
        prompt: Option<String>,

        /// Hypothetical prompt length: short, medium or long
        #[arg(short, long)]
        length: Option<ContentLength>,

        /// Hypothetical code flag
        #[arg(short, long, default_value_t = false)]
        code: bool,

        /// Preset in effect
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Replace all rules with the contents of a JSON file
    Import { file: String },

    /// Write rules as JSON to a file, or stdout
    Export { file: Option<String> },
}

// ─────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────

/// Dispatch a rules subcommand.
pub fn dispatch(cmd: RulesCommands) -> Result<()> {
    let config = load_config(None);
    let store = helpers::rule_store(&config);

    match cmd {
        RulesCommands::List => list(&store),
        RulesCommands::Add {
            name,
            models,
            id,
            preset,
            length,
            code,
            at,
            disabled,
        } => {
            let rule = RoutingRule {
                id: id.unwrap_or_else(|| slugify(&name)),
                name,
                condition: RuleCondition {
                    preset,
                    content_length: length,
                    has_code: code,
                },
                preferred_models: models,
                enabled: !disabled,
            };
            add(&store, rule, at)
        }
        RulesCommands::Remove { id } => remove(&store, &id),
        RulesCommands::Enable { id } => set_enabled(&store, &id, true),
        RulesCommands::Disable { id } => set_enabled(&store, &id, false),
        RulesCommands::Simulate {
            prompt,
            length,
            code,
            preset,
        } => {
            let ctx = match prompt {
                Some(prompt) => RoutingContext::from_prompt(&prompt, preset.as_deref()),
                None => RoutingContext {
                    preset,
                    content_length: length.unwrap_or(ContentLength::Short),
                    has_code: code,
                },
            };
            simulate_rules(&store, &ctx)
        }
        RulesCommands::Import { file } => import(&store, expand_home(&file)),
        RulesCommands::Export { file } => export(&store, file.as_deref().map(expand_home)),
    }
}

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

/// Lowercase, alphanumerics kept, everything else collapsed to `-`.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn describe_condition(condition: &RuleCondition) -> String {
    if condition.is_wildcard() {
        return "any input".to_string();
    }
    let mut parts = Vec::new();
    if let Some(preset) = &condition.preset {
        parts.push(format!("preset={}", preset));
    }
    if let Some(length) = condition.content_length {
        parts.push(format!("length={}", length));
    }
    if let Some(code) = condition.has_code {
        parts.push(format!("code={}", code));
    }
    parts.join(" ")
}

fn save(store: &RuleStore, rules: &[RoutingRule]) -> Result<()> {
    store
        .save(rules, &known_model_ids())
        .with_context(|| format!("rules not saved to {}", store.path().display()))
}

/// Insert `rule` at `at` (clamped), or append.
fn insert_rule(rules: &mut Vec<RoutingRule>, rule: RoutingRule, at: Option<usize>) {
    match at {
        Some(index) => rules.insert(index.min(rules.len()), rule),
        None => rules.push(rule),
    }
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

fn list(store: &RuleStore) -> Result<()> {
    let rules = store.load()?;
    if rules.is_empty() {
        println!("{}", "No routing rules. Add one with `parley rules add`.".dimmed());
        return Ok(());
    }

    println!();
    for (i, rule) in rules.iter().enumerate() {
        let state = if rule.enabled {
            "●".green().to_string()
        } else {
            "○".dimmed().to_string()
        };
        println!(
            "  {:>2}. {} {} {}",
            i,
            state,
            rule.name.bold(),
            format!("[{}]", rule.id).dimmed()
        );
        println!(
            "        when {}  →  {}",
            describe_condition(&rule.condition).cyan(),
            rule.preferred_models.join(", ")
        );
    }
    println!();
    Ok(())
}

fn add(store: &RuleStore, rule: RoutingRule, at: Option<usize>) -> Result<()> {
    if rule.id.is_empty() {
        bail!("could not derive an id from the name; pass --id");
    }
    let mut rules = store.load()?;
    let id = rule.id.clone();
    insert_rule(&mut rules, rule, at);
    save(store, &rules)?;
    println!("  {} added rule {}", "✓".green(), id.bold());
    Ok(())
}

fn remove(store: &RuleStore, id: &str) -> Result<()> {
    let mut rules = store.load()?;
    let before = rules.len();
    rules.retain(|r| r.id != id);
    if rules.len() == before {
        bail!("no rule with id '{}'", id);
    }
    save(store, &rules)?;
    println!("  {} removed rule {}", "✓".green(), id.bold());
    Ok(())
}

fn set_enabled(store: &RuleStore, id: &str, enabled: bool) -> Result<()> {
    let mut rules = store.load()?;
    let rule = rules
        .iter_mut()
        .find(|r| r.id == id)
        .with_context(|| format!("no rule with id '{}'", id))?;
    rule.enabled = enabled;
    save(store, &rules)?;
    println!(
        "  {} rule {} {}",
        "✓".green(),
        id.bold(),
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn simulate_rules(store: &RuleStore, ctx: &RoutingContext) -> Result<()> {
    let rules = store.load_routable(&known_model_ids())?;
    let result = simulate(&rules, ctx);

    println!();
    println!(
        "  {} preset={} length={} code={}",
        "Input:".bold(),
        ctx.preset.as_deref().unwrap_or("-"),
        ctx.content_length,
        ctx.has_code
    );
    println!();
    for (rule, trace) in rules.iter().zip(&result.trace) {
        let verdict = if trace.selected {
            "✓ selected".green().bold().to_string()
        } else if !trace.enabled {
            "· disabled".dimmed().to_string()
        } else if trace.mismatches.is_empty() {
            "· matches (shadowed)".yellow().to_string()
        } else {
            let fields: Vec<&str> = trace
                .mismatches
                .iter()
                .map(|m| match m {
                    Mismatch::Preset => "preset",
                    Mismatch::ContentLength => "length",
                    Mismatch::HasCode => "code",
                })
                .collect();
            format!("✗ {}", fields.join(", ")).red().to_string()
        };
        println!("  {:<24} {}", rule.name, verdict);
    }
    println!();

    match &result.decision {
        RoutingDecision::Matched { models, .. } => {
            println!("  {} {}", "Models:".bold(), models.join(", "));
        }
        RoutingDecision::NoMatch => {
            println!("  {}", "No rule matches; configured defaults would run.".dimmed());
        }
    }
    println!();
    Ok(())
}

fn import(store: &RuleStore, path: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let rules = parse_rules_json(&raw, &known_model_ids())
        .with_context(|| format!("invalid rules in {}", path.display()))?;
    save(store, &rules)?;
    println!("  {} imported {} rule(s)", "✓".green(), rules.len());
    Ok(())
}

fn export(store: &RuleStore, path: Option<PathBuf>) -> Result<()> {
    let rules = store.load()?;
    let json = serde_json::to_string_pretty(&rules)?;
    match path {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("  {} exported {} rule(s) to {}", "✓".green(), rules.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rule(id: &str, models: &[&str]) -> RoutingRule {
        RoutingRule {
            id: id.to_string(),
            name: id.to_uppercase(),
            condition: RuleCondition::default(),
            preferred_models: models.iter().map(|m| m.to_string()).collect(),
            enabled: true,
        }
    }

    #[derive(clap::Parser)]
    struct RulesCli {
        #[command(subcommand)]
        command: RulesCommands,
    }

    fn parse(args: &[&str]) -> Result<RulesCommands, clap::Error> {
        use clap::Parser;
        RulesCli::try_parse_from(std::iter::once("rules").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn simulate_prompt_excludes_hypothetical_flags() {
        let err = parse(&["simulate", "--prompt", "fn main() {}", "--code"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        assert!(parse(&["simulate", "--prompt", "hi", "--length", "long"]).is_err());

        assert!(matches!(
            parse(&["simulate", "--length", "long", "--code"]).unwrap(),
            RulesCommands::Simulate { code: true, prompt: None, .. }
        ));
        assert!(matches!(
            parse(&["simulate", "--prompt", "hi", "--preset", "chat"]).unwrap(),
            RulesCommands::Simulate { code: false, .. }
        ));
    }

    #[test]
    fn slugify_names() {
        assert_eq!(slugify("Code review"), "code-review");
        assert_eq!(slugify("  Long / docs!! "), "long-docs");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn describe_conditions() {
        assert_eq!(describe_condition(&RuleCondition::default()), "any input");
        let condition = RuleCondition {
            preset: Some("review".into()),
            content_length: Some(ContentLength::Long),
            has_code: Some(true),
        };
        assert_eq!(describe_condition(&condition), "preset=review length=long code=true");
    }

    #[test]
    fn insert_respects_position() {
        let mut rules = vec![rule("a", &["gpt-4o"]), rule("b", &["gpt-4o"])];
        insert_rule(&mut rules, rule("c", &["gpt-4o"]), Some(0));
        insert_rule(&mut rules, rule("d", &["gpt-4o"]), Some(99));
        insert_rule(&mut rules, rule("e", &["gpt-4o"]), None);
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b", "d", "e"]);
    }

    #[test]
    fn add_rejects_unknown_model_and_keeps_file() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::new(Some(dir.path().join("rules.json")));

        add(&store, rule("good", &["gpt-4o"]), None).unwrap();
        assert!(add(&store, rule("bad", &["gpt-9000"]), None).is_err());

        let rules = store.load().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "good");
    }

    #[test]
    fn enable_disable_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::new(Some(dir.path().join("rules.json")));
        add(&store, rule("a", &["gpt-4o"]), None).unwrap();

        set_enabled(&store, "a", false).unwrap();
        assert!(!store.load().unwrap()[0].enabled);
        assert!(set_enabled(&store, "missing", true).is_err());

        remove(&store, "a").unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(remove(&store, "a").is_err());
    }

    #[test]
    fn import_then_export_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::new(Some(dir.path().join("rules.json")));
        let source = dir.path().join("in.json");
        std::fs::write(
            &source,
            r#"[{"id":"long","name":"Long","condition":{"contentLength":"long"},"preferredModels":["gpt-4o"],"enabled":true}]"#,
        )
        .unwrap();

        import(&store, source).unwrap();
        let target = dir.path().join("out.json");
        export(&store, Some(target.clone())).unwrap();

        let exported: Vec<RoutingRule> =
            serde_json::from_str(&std::fs::read_to_string(target).unwrap()).unwrap();
        assert_eq!(exported, store.load().unwrap());
        assert_eq!(exported[0].condition.content_length, Some(ContentLength::Long));
    }

    #[test]
    fn import_rejects_invalid_json_rules() {
        let dir = TempDir::new().unwrap();
        let store = RuleStore::new(Some(dir.path().join("rules.json")));
        let source = dir.path().join("in.json");
        std::fs::write(
            &source,
            r#"[{"id":"x","name":"","preferredModels":["gpt-4o"]}]"#,
        )
        .unwrap();

        assert!(import(&store, source).is_err());
        assert!(!store.path().exists());
    }
}
