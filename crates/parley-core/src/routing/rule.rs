//! Routing rule records and the input dimensions they match on.

use serde::{Deserialize, Serialize};

/// Lower bound (inclusive) of the `medium` bucket, in characters.
pub const MEDIUM_MIN_CHARS: usize = 500;
/// Lower bound (inclusive) of the `long` bucket, in characters.
pub const LONG_MIN_CHARS: usize = 2000;

// ─────────────────────────────────────────────
// Content length bucket
// ─────────────────────────────────────────────

/// Discretized prompt length.
///
/// Each bucket includes its lower bound: `short` is `[0, 500)`,
/// `medium` is `[500, 2000)`, `long` is `[2000, ∞)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentLength {
    Short,
    Medium,
    Long,
}

impl ContentLength {
    /// Bucket a character count.
    pub fn from_chars(chars: usize) -> Self {
        if chars >= LONG_MIN_CHARS {
            ContentLength::Long
        } else if chars >= MEDIUM_MIN_CHARS {
            ContentLength::Medium
        } else {
            ContentLength::Short
        }
    }

    /// Bucket a piece of text by its character (not byte) count.
    pub fn of(text: &str) -> Self {
        Self::from_chars(text.chars().count())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentLength::Short => "short",
            ContentLength::Medium => "medium",
            ContentLength::Long => "long",
        }
    }
}

impl std::fmt::Display for ContentLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(ContentLength::Short),
            "medium" => Ok(ContentLength::Medium),
            "long" => Ok(ContentLength::Long),
            other => Err(format!(
                "unknown content length '{other}' (expected short, medium or long)"
            )),
        }
    }
}

// ─────────────────────────────────────────────
// Code detection
// ─────────────────────────────────────────────

/// Line prefixes that strongly suggest source code.
const CODE_LINE_PREFIXES: &[&str] = &[
    "fn ", "pub fn ", "impl ", "use ", "def ", "class ", "import ", "from ", "#include",
    "function ", "const ", "let ", "var ", "package ", "public ", "private ", "return ",
    "SELECT ", "select ",
];

/// Whether `text` looks like it contains source code.
///
/// A fenced block (```` ``` ````) always counts. Otherwise at least two
/// code-shaped lines are required so that prose mentioning "import" once
/// does not trip it.
pub fn detect_code(text: &str) -> bool {
    if text.contains("```") {
        return true;
    }

    let code_lines = text
        .lines()
        .map(str::trim_start)
        .filter(|line| {
            CODE_LINE_PREFIXES.iter().any(|p| line.starts_with(p))
                || line.ends_with('{')
                || line.ends_with("};")
                || (line.ends_with(';') && line.contains('('))
        })
        .count();

    code_lines >= 2
}

// ─────────────────────────────────────────────
// Rules
// ─────────────────────────────────────────────

/// Condition part of a rule. Absent fields are wildcards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<ContentLength>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_code: Option<bool>,
}

impl RuleCondition {
    /// `true` when every field is absent.
    pub fn is_wildcard(&self) -> bool {
        self.preset.is_none() && self.content_length.is_none() && self.has_code.is_none()
    }
}

/// A user-owned routing rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub condition: RuleCondition,
    /// Ordered by preference; first is most preferred.
    pub preferred_models: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Input to rule evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingContext {
    pub preset: Option<String>,
    pub content_length: ContentLength,
    pub has_code: bool,
}

impl RoutingContext {
    /// Derive a context from a live prompt.
    pub fn from_prompt(prompt: &str, preset: Option<&str>) -> Self {
        RoutingContext {
            preset: preset.map(String::from),
            content_length: ContentLength::of(prompt),
            has_code: detect_code(prompt),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_boundaries_include_lower_bound() {
        assert_eq!(ContentLength::from_chars(0), ContentLength::Short);
        assert_eq!(ContentLength::from_chars(499), ContentLength::Short);
        assert_eq!(ContentLength::from_chars(500), ContentLength::Medium);
        assert_eq!(ContentLength::from_chars(1999), ContentLength::Medium);
        assert_eq!(ContentLength::from_chars(2000), ContentLength::Long);
        assert_eq!(ContentLength::from_chars(100_000), ContentLength::Long);
    }

    #[test]
    fn test_bucket_counts_chars_not_bytes() {
        // 400 three-byte characters = 1200 bytes but 400 chars
        let text = "世".repeat(400);
        assert_eq!(ContentLength::of(&text), ContentLength::Short);
    }

    #[test]
    fn test_content_length_parse() {
        assert_eq!("LONG".parse::<ContentLength>().unwrap(), ContentLength::Long);
        assert!("huge".parse::<ContentLength>().is_err());
    }

    #[test]
    fn test_detect_code_fence() {
        assert!(detect_code("Why does this fail?\n```\nx = 1\n```"));
    }

    #[test]
    fn test_detect_code_lines() {
        let src = "fn main() {\n    println!(\"hi\");\n}";
        assert!(detect_code(src));
    }

    #[test]
    fn test_detect_code_prose() {
        assert!(!detect_code("Please summarize this article about imports and exports."));
        assert!(!detect_code(""));
    }

    #[test]
    fn test_rule_json_camel_case_and_defaults() {
        let rule: RoutingRule = serde_json::from_str(
            r#"{
                "id": "r1",
                "name": "Long code",
                "condition": { "preset": "code", "contentLength": "long", "hasCode": true },
                "preferredModels": ["gpt-4o"]
            }"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.condition.content_length, Some(ContentLength::Long));
        assert_eq!(rule.condition.has_code, Some(true));

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["preferredModels"][0], "gpt-4o");
        assert_eq!(json["condition"]["contentLength"], "long");
    }

    #[test]
    fn test_missing_condition_is_wildcard() {
        let rule: RoutingRule = serde_json::from_str(
            r#"{"id": "any", "name": "Fallback", "preferredModels": ["gpt-4o-mini"]}"#,
        )
        .unwrap();
        assert!(rule.condition.is_wildcard());
    }

    #[test]
    fn test_context_from_prompt() {
        let ctx = RoutingContext::from_prompt("```rust\nfn x() {}\n```", Some("code"));
        assert_eq!(ctx.preset.as_deref(), Some("code"));
        assert_eq!(ctx.content_length, ContentLength::Short);
        assert!(ctx.has_code);
    }
}
