//! Routing rules: choose which models to run from the prompt's context.
//!
//! # Usage
//! ```
//! use parley_core::routing::{evaluate, RoutingContext, RoutingRule, RuleCondition};
//!
//! let rules = vec![RoutingRule {
//!     id: "code".into(),
//!     name: "Code questions".into(),
//!     condition: RuleCondition { preset: Some("code".into()), ..Default::default() },
//!     preferred_models: vec!["gpt-4o".into()],
//!     enabled: true,
//! }];
//! let ctx = RoutingContext::from_prompt("fix my loop", Some("code"));
//! assert_eq!(evaluate(&rules, &ctx).models(), &["gpt-4o".to_string()]);
//! ```

pub mod evaluator;
pub mod rule;
pub mod store;
pub mod validate;

pub use evaluator::{evaluate, rule_matches, simulate, Mismatch, RoutingDecision, RuleTrace, Simulation};
pub use rule::{detect_code, ContentLength, RoutingContext, RoutingRule, RuleCondition};
pub use store::{get_rules_path, parse_rules_json, RuleStore, RuleStoreError};
pub use validate::{validate_rule, validate_rules, RuleValidationError};
