//! # parley-core
//!
//! Shared types, configuration, and routing rules for Parley, a tool that
//! sends one prompt to several LLM providers and compares the answers.

pub mod config;
pub mod routing;
pub mod types;
pub mod utils;
