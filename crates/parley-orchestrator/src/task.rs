//! Task table: one record per model id in the current run.
//!
//! Every status change goes through [`TaskTable::apply`], which rejects
//! completions from superseded attempts and illegal transitions
//! (anything out of a terminal state, or `Running` twice).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use parley_core::types::TaskStatus;

use crate::error::OrchestratorError;

/// A task ready to be driven: which model, which attempt, and its token.
#[derive(Debug, Clone)]
pub struct Launch {
    pub model_id: String,
    pub attempt: u64,
    pub cancel: CancellationToken,
}

/// Outcome of a successful [`TaskTable::apply`], ready to broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub model_id: String,
    pub attempt: u64,
    pub status: TaskStatus,
}

/// Point-in-time view of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub model_id: String,
    pub attempt: u64,
    pub status: TaskStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TaskRecord {
    status: TaskStatus,
    attempt: u64,
    cancel: CancellationToken,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TaskTable {
    /// Launch order.
    order: Vec<String>,
    records: HashMap<String, TaskRecord>,
    /// Never reused, even across runs and resets.
    last_attempt: u64,
}

fn transition_allowed(from: &TaskStatus, to: &TaskStatus) -> bool {
    match (from, to) {
        (TaskStatus::Pending, TaskStatus::Pending) => false,
        (TaskStatus::Pending, _) => true,
        (TaskStatus::Running, next) => next.is_terminal(),
        _ => false,
    }
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_attempt(&mut self) -> u64 {
        self.last_attempt += 1;
        self.last_attempt
    }

    fn fresh_record(&mut self) -> TaskRecord {
        TaskRecord {
            status: TaskStatus::Pending,
            attempt: self.next_attempt(),
            cancel: CancellationToken::new(),
            updated_at: Utc::now(),
        }
    }

    /// Replace the table with one pending task per id.
    ///
    /// Any existing task is cancelled first. Duplicate ids collapse to the
    /// first occurrence.
    pub fn begin_run(&mut self, model_ids: &[String]) -> Vec<Launch> {
        self.reset();

        let mut launches = Vec::with_capacity(model_ids.len());
        for id in model_ids {
            if self.records.contains_key(id) {
                continue;
            }
            let record = self.fresh_record();
            launches.push(Launch {
                model_id: id.clone(),
                attempt: record.attempt,
                cancel: record.cancel.clone(),
            });
            self.order.push(id.clone());
            self.records.insert(id.clone(), record);
        }
        launches
    }

    /// Start a new attempt for a terminal task. Its old token is left alone:
    /// it belongs to an attempt that already finished.
    pub fn begin_retry(&mut self, model_id: &str) -> Result<Launch, OrchestratorError> {
        let current = self
            .records
            .get(model_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(model_id.to_string()))?;
        if !current.status.is_terminal() {
            return Err(OrchestratorError::TaskInFlight(model_id.to_string()));
        }

        let record = self.fresh_record();
        let launch = Launch {
            model_id: model_id.to_string(),
            attempt: record.attempt,
            cancel: record.cancel.clone(),
        };
        self.records.insert(model_id.to_string(), record);
        Ok(launch)
    }

    /// The single mutation path for task status.
    ///
    /// Returns `None` (and changes nothing) when the task is gone, the
    /// attempt is stale, or the transition is not allowed.
    pub fn apply(&mut self, model_id: &str, attempt: u64, next: TaskStatus) -> Option<Applied> {
        let record = self.records.get_mut(model_id)?;
        if record.attempt != attempt || !transition_allowed(&record.status, &next) {
            return None;
        }
        record.status = next.clone();
        record.updated_at = Utc::now();
        Some(Applied {
            model_id: model_id.to_string(),
            attempt,
            status: next,
        })
    }

    /// Cancel one task, or every task when `model_id` is `None`.
    ///
    /// Terminal tasks are untouched; the result lists what actually changed.
    pub fn cancel(&mut self, model_id: Option<&str>) -> Vec<Applied> {
        let targets: Vec<(String, u64)> = self
            .order
            .iter()
            .filter(|id| model_id.map_or(true, |wanted| wanted == id.as_str()))
            .filter_map(|id| {
                let record = self.records.get(id)?;
                (!record.status.is_terminal()).then(|| (id.clone(), record.attempt))
            })
            .collect();

        let mut applied = Vec::with_capacity(targets.len());
        for (id, attempt) in targets {
            if let Some(change) = self.apply(&id, attempt, TaskStatus::Cancelled) {
                if let Some(record) = self.records.get(&id) {
                    record.cancel.cancel();
                }
                applied.push(change);
            }
        }
        applied
    }

    /// Cancel every token and forget every task.
    pub fn reset(&mut self) {
        for record in self.records.values() {
            record.cancel.cancel();
        }
        self.records.clear();
        self.order.clear();
    }

    pub fn status(&self, model_id: &str) -> Option<&TaskStatus> {
        self.records.get(model_id).map(|r| &r.status)
    }

    pub fn model_ids(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every task, in launch order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.order
            .iter()
            .filter_map(|id| {
                let record = self.records.get(id)?;
                Some(TaskSnapshot {
                    model_id: id.clone(),
                    attempt: record.attempt,
                    status: record.status.clone(),
                    updated_at: record.updated_at,
                })
            })
            .collect()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn error(message: &str) -> TaskStatus {
        TaskStatus::Error {
            message: message.to_string(),
            can_retry: true,
        }
    }

    #[test]
    fn test_begin_run_collapses_duplicates() {
        let mut table = TaskTable::new();
        let launches = table.begin_run(&ids(&["a", "b", "a", "c"]));
        let launched: Vec<&str> = launches.iter().map(|l| l.model_id.as_str()).collect();
        assert_eq!(launched, vec!["a", "b", "c"]);
        assert_eq!(table.model_ids(), &ids(&["a", "b", "c"])[..]);
        assert!(table
            .snapshot()
            .iter()
            .all(|t| t.status == TaskStatus::Pending));
    }

    #[test]
    fn test_legal_path_to_success() {
        let mut table = TaskTable::new();
        let launch = table.begin_run(&ids(&["a"])).remove(0);

        assert!(table.apply("a", launch.attempt, TaskStatus::Running).is_some());
        assert!(table.apply("a", launch.attempt, TaskStatus::Running).is_none());
        assert!(table.apply("a", launch.attempt, error("boom")).is_some());
        assert_eq!(table.status("a"), Some(&error("boom")));
    }

    #[test]
    fn test_pending_can_go_straight_to_terminal() {
        let mut table = TaskTable::new();
        let launch = table.begin_run(&ids(&["a"])).remove(0);
        assert!(table.apply("a", launch.attempt, error("no key")).is_some());
    }

    #[test]
    fn test_terminal_is_final() {
        let mut table = TaskTable::new();
        let launch = table.begin_run(&ids(&["a"])).remove(0);
        table.apply("a", launch.attempt, TaskStatus::Cancelled);

        assert!(table.apply("a", launch.attempt, TaskStatus::Running).is_none());
        assert!(table.apply("a", launch.attempt, error("late")).is_none());
        assert_eq!(table.status("a"), Some(&TaskStatus::Cancelled));
    }

    #[test]
    fn test_stale_attempt_is_discarded() {
        let mut table = TaskTable::new();
        let first = table.begin_run(&ids(&["a"])).remove(0);
        table.apply("a", first.attempt, error("boom"));

        let second = table.begin_retry("a").unwrap();
        assert!(second.attempt > first.attempt);
        assert_eq!(table.status("a"), Some(&TaskStatus::Pending));

        assert!(table.apply("a", first.attempt, TaskStatus::Running).is_none());
        assert!(table.apply("a", second.attempt, TaskStatus::Running).is_some());
    }

    #[test]
    fn test_attempts_never_reused_across_runs() {
        let mut table = TaskTable::new();
        let old = table.begin_run(&ids(&["a"])).remove(0);
        let new = table.begin_run(&ids(&["a"])).remove(0);
        assert!(old.cancel.is_cancelled());
        assert!(!new.cancel.is_cancelled());
        assert!(table.apply("a", old.attempt, TaskStatus::Running).is_none());
    }

    #[test]
    fn test_retry_rules() {
        let mut table = TaskTable::new();
        let launch = table.begin_run(&ids(&["a"])).remove(0);

        assert_eq!(
            table.begin_retry("zzz").unwrap_err(),
            OrchestratorError::UnknownTask("zzz".into())
        );
        assert_eq!(
            table.begin_retry("a").unwrap_err(),
            OrchestratorError::TaskInFlight("a".into())
        );

        table.apply("a", launch.attempt, TaskStatus::Running);
        assert!(table.begin_retry("a").is_err());

        table.apply("a", launch.attempt, TaskStatus::Cancelled);
        assert!(table.begin_retry("a").is_ok());
    }

    #[test]
    fn test_cancel_one_leaves_others() {
        let mut table = TaskTable::new();
        let launches = table.begin_run(&ids(&["a", "b"]));

        let changed = table.cancel(Some("a"));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].model_id, "a");
        assert!(launches[0].cancel.is_cancelled());
        assert!(!launches[1].cancel.is_cancelled());
        assert_eq!(table.status("b"), Some(&TaskStatus::Pending));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut table = TaskTable::new();
        let launches = table.begin_run(&ids(&["a", "b"]));
        table.apply("b", launches[1].attempt, error("boom"));

        assert_eq!(table.cancel(None).len(), 1);
        assert!(table.cancel(None).is_empty());
        assert!(table.cancel(Some("a")).is_empty());
        assert!(table.cancel(Some("missing")).is_empty());
        assert_eq!(table.status("b"), Some(&error("boom")));
    }

    #[test]
    fn test_reset_cancels_and_clears() {
        let mut table = TaskTable::new();
        let launches = table.begin_run(&ids(&["a", "b"]));
        table.reset();
        table.reset();

        assert!(table.is_empty());
        assert!(table.snapshot().is_empty());
        assert!(launches.iter().all(|l| l.cancel.is_cancelled()));
        assert!(table.apply("a", launches[0].attempt, TaskStatus::Running).is_none());
    }
}
