//! Orchestrator error type.
//!
//! Per-task failures never surface here: they are recorded on the task's
//! status. These errors are about misuse of the orchestrator itself.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("no task for model '{0}' in the current run")]
    UnknownTask(String),

    #[error("task for model '{0}' is still in flight")]
    TaskInFlight(String),

    #[error("no previous run to retry from")]
    NoPreviousRun,
}
