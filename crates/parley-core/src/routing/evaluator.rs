//! Rule evaluation: pure, deterministic, first enabled match wins.
//!
//! Order decides, not specificity: a broad rule stored before a narrow one
//! shadows it. The rule editor uses [`simulate`] to show exactly that.

use serde::Serialize;

use super::rule::{RoutingContext, RoutingRule};

/// Outcome of evaluating a rule set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RoutingDecision {
    #[serde(rename_all = "camelCase")]
    Matched {
        rule_id: String,
        rule_name: String,
        models: Vec<String>,
    },
    NoMatch,
}

impl RoutingDecision {
    /// Selected models, empty on no match.
    pub fn models(&self) -> &[String] {
        match self {
            RoutingDecision::Matched { models, .. } => models,
            RoutingDecision::NoMatch => &[],
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, RoutingDecision::Matched { .. })
    }
}

/// Why a single condition field did not match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mismatch {
    Preset,
    ContentLength,
    HasCode,
}

/// Per-rule line of a simulation trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTrace {
    pub rule_id: String,
    pub enabled: bool,
    /// Fields that failed. Empty for a rule whose condition matches.
    pub mismatches: Vec<Mismatch>,
    /// `true` only for the rule that actually won.
    pub selected: bool,
}

/// Result of a dry run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub decision: RoutingDecision,
    pub trace: Vec<RuleTrace>,
}

/// Fields of `rule`'s condition that `ctx` fails. Empty means match.
fn mismatches(rule: &RoutingRule, ctx: &RoutingContext) -> Vec<Mismatch> {
    let cond = &rule.condition;
    let mut out = Vec::new();

    if let Some(preset) = &cond.preset {
        if ctx.preset.as_deref() != Some(preset.as_str()) {
            out.push(Mismatch::Preset);
        }
    }
    if let Some(bucket) = cond.content_length {
        if bucket != ctx.content_length {
            out.push(Mismatch::ContentLength);
        }
    }
    if let Some(has_code) = cond.has_code {
        if has_code != ctx.has_code {
            out.push(Mismatch::HasCode);
        }
    }

    out
}

/// Whether every specified field of `rule`'s condition matches `ctx`.
///
/// Ignores `enabled`.
pub fn rule_matches(rule: &RoutingRule, ctx: &RoutingContext) -> bool {
    mismatches(rule, ctx).is_empty()
}

/// Evaluate `rules` in stored order against `ctx`.
pub fn evaluate(rules: &[RoutingRule], ctx: &RoutingContext) -> RoutingDecision {
    rules
        .iter()
        .filter(|r| r.enabled)
        .find(|r| rule_matches(r, ctx))
        .map_or(RoutingDecision::NoMatch, |r| RoutingDecision::Matched {
            rule_id: r.id.clone(),
            rule_name: r.name.clone(),
            models: r.preferred_models.clone(),
        })
}

/// Run the same matching as [`evaluate`] against a hypothetical input and
/// report how every rule fared. No side effects.
pub fn simulate(rules: &[RoutingRule], ctx: &RoutingContext) -> Simulation {
    let decision = evaluate(rules, ctx);
    let winner = match &decision {
        RoutingDecision::Matched { rule_id, .. } => Some(rule_id.as_str()),
        RoutingDecision::NoMatch => None,
    };

    let mut selected_seen = false;
    let trace = rules
        .iter()
        .map(|r| {
            let selected = !selected_seen && r.enabled && winner == Some(r.id.as_str());
            selected_seen |= selected;
            RuleTrace {
                rule_id: r.id.clone(),
                enabled: r.enabled,
                mismatches: mismatches(r, ctx),
                selected,
            }
        })
        .collect();

    Simulation { decision, trace }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
