//! Status change notifications.

use serde::Serialize;

use parley_core::types::TaskStatus;

/// Broadcast on every accepted change to the task table.
///
/// Consumers should render from these events; completion order across tasks
/// is unspecified.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum OrchestratorEvent {
    /// A run replaced the task table with these ids, in launch order.
    #[serde(rename_all = "camelCase")]
    RunStarted { model_ids: Vec<String> },

    #[serde(rename_all = "camelCase")]
    TaskUpdated {
        model_id: String,
        attempt: u64,
        status: TaskStatus,
    },

    /// All tasks were cleared.
    Reset,
}
