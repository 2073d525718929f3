//! Static rule validation. Rejects, never repairs.

use std::collections::HashSet;

use thiserror::Error;

use super::rule::RoutingRule;

/// A rule that cannot be saved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleValidationError {
    #[error("rule '{id}' has an empty name")]
    EmptyName { id: String },

    #[error("rule has an empty id")]
    EmptyId,

    #[error("rule '{id}' has no preferred models")]
    NoModels { id: String },

    #[error("rule '{id}' references unknown model '{model}'")]
    UnknownModel { id: String, model: String },

    #[error("duplicate rule id '{id}'")]
    DuplicateId { id: String },
}

/// Validate a single rule against the set of known model ids.
pub fn validate_rule<S: AsRef<str>>(
    rule: &RoutingRule,
    known_models: &[S],
) -> Result<(), RuleValidationError> {
    if rule.id.trim().is_empty() {
        return Err(RuleValidationError::EmptyId);
    }
    if rule.name.trim().is_empty() {
        return Err(RuleValidationError::EmptyName {
            id: rule.id.clone(),
        });
    }
    if rule.preferred_models.is_empty() {
        return Err(RuleValidationError::NoModels {
            id: rule.id.clone(),
        });
    }
    if let Some(unknown) = rule
        .preferred_models
        .iter()
        .find(|m| !known_models.iter().any(|k| k.as_ref() == m.as_str()))
    {
        return Err(RuleValidationError::UnknownModel {
            id: rule.id.clone(),
            model: unknown.clone(),
        });
    }
    Ok(())
}

/// Validate a whole rule set: every rule, plus unique ids.
pub fn validate_rules<S: AsRef<str>>(
    rules: &[RoutingRule],
    known_models: &[S],
) -> Result<(), RuleValidationError> {
    let mut seen = HashSet::new();
    for rule in rules {
        validate_rule(rule, known_models)?;
        if !seen.insert(rule.id.as_str()) {
            return Err(RuleValidationError::DuplicateId {
                id: rule.id.clone(),
            });
        }
    }
    Ok(())
}
