//! Parley orchestrator: concurrent multi-model runs.
//!
//! This crate contains:
//! - **task**: the per-run task table and its single `apply` mutation path
//! - **events**: status change notifications
//! - **orchestrator**: run / cancel / retry / reset over a `ProviderSet`

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod task;

pub use error::OrchestratorError;
pub use events::OrchestratorEvent;
pub use orchestrator::{Orchestrator, OrchestratorOptions, NO_CREDENTIAL, UNKNOWN_MODEL};
pub use task::{TaskSnapshot, TaskTable};
