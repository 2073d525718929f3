//! Rule persistence: an ordered JSON array at `~/.parley/rules.json`.
//!
//! Unlike the config loader, a broken rules file is an error, never a
//! silent fallback to an empty set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::rule::RoutingRule;
use super::validate::{validate_rule, validate_rules, RuleValidationError};

/// Errors from loading, parsing or saving a rule set.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("failed to access rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rules JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] RuleValidationError),
}

/// Default rules file path.
pub fn get_rules_path() -> PathBuf {
    crate::utils::get_data_path().join("rules.json")
}

/// Parse a raw JSON rule set (the editor's alternate edit path) and validate it
/// with the same checks as a structured save.
pub fn parse_rules_json<S: AsRef<str>>(
    raw: &str,
    known_models: &[S],
) -> Result<Vec<RoutingRule>, RuleStoreError> {
    let rules: Vec<RoutingRule> = serde_json::from_str(raw)?;
    validate_rules(&rules, known_models)?;
    Ok(rules)
}

/// File-backed rule set.
#[derive(Clone, Debug)]
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    /// `path` defaults to `~/.parley/rules.json` if `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        RuleStore {
            path: path.unwrap_or_else(get_rules_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load rules in stored order. A missing file is an empty rule set.
    pub fn load(&self) -> Result<Vec<RoutingRule>, RuleStoreError> {
        if !self.path.exists() {
            debug!("No rules file at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| RuleStoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let rules: Vec<RoutingRule> = serde_json::from_str(&content)?;
        debug!(count = rules.len(), "Loaded routing rules");
        Ok(rules)
    }

    /// Load the rules that may take part in routing.
    ///
    /// A hand-edited file can hold rules `save` would reject. Those are
    /// skipped with a warning, as is any repeat of an earlier rule's id.
    pub fn load_routable<S: AsRef<str>>(
        &self,
        known_models: &[S],
    ) -> Result<Vec<RoutingRule>, RuleStoreError> {
        let mut seen = HashSet::new();
        let rules = self
            .load()?
            .into_iter()
            .filter(|rule| {
                if let Err(e) = validate_rule(rule, known_models) {
                    warn!(rule = %rule.id, error = %e, "Skipping invalid routing rule");
                    return false;
                }
                if !seen.insert(rule.id.clone()) {
                    warn!(rule = %rule.id, "Skipping routing rule with a duplicate id");
                    return false;
                }
                true
            })
            .collect();
        Ok(rules)
    }

    /// Validate and persist `rules`. Nothing is written if validation fails.
    pub fn save<S: AsRef<str>>(
        &self,
        rules: &[RoutingRule],
        known_models: &[S],
    ) -> Result<(), RuleStoreError> {
        validate_rules(rules, known_models)?;

        let io_err = |source| RuleStoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(rules)?;
        std::fs::write(&self.path, json).map_err(io_err)?;
        debug!(count = rules.len(), path = %self.path.display(), "Saved routing rules");
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
