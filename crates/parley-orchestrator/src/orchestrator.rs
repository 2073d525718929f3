//! Run orchestrator: fans one prompt out to many models.
//!
//! Each model gets a task in the [`TaskTable`]. Tasks are driven by
//! `tokio::spawn`ed futures that race the adapter call against the task's
//! cancellation token (and the optional timeout), then report back through
//! [`TaskTable::apply`]. Every accepted change is broadcast as an
//! [`OrchestratorEvent`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parley_core::config::Config;
use parley_core::types::{
    CredentialSource, NormalizedRequest, NormalizedResponse, RequestOptions, TaskStatus,
};
use parley_providers::ProviderSet;

use crate::error::OrchestratorError;
use crate::events::OrchestratorEvent;
use crate::task::{Applied, Launch, TaskSnapshot, TaskTable};

/// Message recorded when no provider serves a model id.
pub const UNKNOWN_MODEL: &str = "unknown model";
/// Message recorded when the model's provider has no credential.
pub const NO_CREDENTIAL: &str = "no credential configured";

// ─────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct OrchestratorOptions {
    /// Per-task limit on the adapter call. `None` waits forever.
    pub task_timeout: Option<Duration>,
    /// Options attached to every request.
    pub request: RequestOptions,
    /// Capacity of the event channel.
    pub event_buffer: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            task_timeout: Some(Duration::from_secs(120)),
            request: RequestOptions::default(),
            event_buffer: 256,
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            task_timeout: config.orchestrator.task_timeout(),
            request: config.defaults.request_options(),
            event_buffer: config.orchestrator.event_buffer.max(1),
        }
    }
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

struct Inner {
    providers: ProviderSet,
    credentials: Arc<dyn CredentialSource>,
    options: OrchestratorOptions,
    table: Mutex<TaskTable>,
    events: broadcast::Sender<OrchestratorEvent>,
    last_prompt: Mutex<Option<String>>,
}

/// Cheap to clone; clones share the same task table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("providers", &self.inner.providers)
            .field("tasks", &self.inner.table.lock().model_ids().len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        providers: ProviderSet,
        credentials: Arc<dyn CredentialSource>,
        options: OrchestratorOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                providers,
                credentials,
                options,
                table: Mutex::new(TaskTable::new()),
                events,
                last_prompt: Mutex::new(None),
            }),
        }
    }

    /// Receive every status change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    /// All tasks of the current run, in launch order.
    pub fn statuses(&self) -> Vec<TaskSnapshot> {
        self.inner.table.lock().snapshot()
    }

    pub fn status(&self, model_id: &str) -> Option<TaskStatus> {
        self.inner.table.lock().status(model_id).cloned()
    }

    /// Prompt of the most recent run, if any.
    pub fn last_prompt(&self) -> Option<String> {
        self.inner.last_prompt.lock().clone()
    }

    /// Send `prompt` to every model concurrently.
    ///
    /// Replaces any previous run (its tasks are cancelled). Resolves once
    /// every task is terminal, with the successful responses in model order.
    pub async fn run(&self, prompt: &str, model_ids: &[String]) -> Vec<NormalizedResponse> {
        *self.inner.last_prompt.lock() = Some(prompt.to_string());

        let launches = {
            let mut table = self.inner.table.lock();
            let launches = table.begin_run(model_ids);
            self.emit(OrchestratorEvent::RunStarted {
                model_ids: table.model_ids().to_vec(),
            });
            for launch in &launches {
                self.emit(OrchestratorEvent::TaskUpdated {
                    model_id: launch.model_id.clone(),
                    attempt: launch.attempt,
                    status: TaskStatus::Pending,
                });
            }
            launches
        };

        info!(models = launches.len(), "Starting run");
        let request = Arc::new(NormalizedRequest::from_prompt(
            prompt,
            self.inner.options.request.clone(),
        ));

        let handles: Vec<_> = launches
            .into_iter()
            .map(|launch| {
                let handle = self.spawn_task(launch.clone(), request.clone());
                (launch, handle)
            })
            .collect();

        let (launches, handles): (Vec<Launch>, Vec<JoinHandle<_>>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let responses: Vec<NormalizedResponse> = launches
            .iter()
            .zip(results)
            .filter_map(|(launch, result)| self.joined(launch, result))
            .collect();

        info!(succeeded = responses.len(), "Run finished");
        responses
    }

    /// Cancel one task, or all of them with `None`.
    ///
    /// Returns whether anything was still in flight.
    pub fn cancel(&self, model_id: Option<&str>) -> bool {
        let changed = {
            let mut table = self.inner.table.lock();
            let changed = table.cancel(model_id);
            for applied in &changed {
                self.emit_applied(applied);
            }
            changed
        };
        for applied in &changed {
            info!(model = %applied.model_id, "Task cancelled");
        }
        !changed.is_empty()
    }

    /// Re-issue one finished task with `prompt`, leaving the others alone.
    pub async fn retry(&self, model_id: &str, prompt: &str) -> Result<TaskStatus, OrchestratorError> {
        let launch = {
            let mut table = self.inner.table.lock();
            let launch = table.begin_retry(model_id)?;
            self.emit(OrchestratorEvent::TaskUpdated {
                model_id: launch.model_id.clone(),
                attempt: launch.attempt,
                status: TaskStatus::Pending,
            });
            launch
        };

        info!(model = %model_id, attempt = launch.attempt, "Retrying task");
        let request = Arc::new(NormalizedRequest::from_prompt(
            prompt,
            self.inner.options.request.clone(),
        ));
        let result = self.spawn_task(launch.clone(), request).await;
        self.joined(&launch, result);

        self.status(model_id)
            .ok_or_else(|| OrchestratorError::UnknownTask(model_id.to_string()))
    }

    /// [`retry`](Self::retry) with the prompt of the last run.
    pub async fn retry_last(&self, model_id: &str) -> Result<TaskStatus, OrchestratorError> {
        let prompt = self.last_prompt().ok_or(OrchestratorError::NoPreviousRun)?;
        self.retry(model_id, &prompt).await
    }

    /// Cancel everything in flight and forget every task.
    pub fn reset(&self) {
        {
            let mut table = self.inner.table.lock();
            table.reset();
            self.emit(OrchestratorEvent::Reset);
        }
        *self.inner.last_prompt.lock() = None;
        debug!("Orchestrator reset");
    }

    // ─────────────────────────────────────────
    // Task driving
    // ─────────────────────────────────────────

    fn spawn_task(
        &self,
        launch: Launch,
        request: Arc<NormalizedRequest>,
    ) -> JoinHandle<Option<NormalizedResponse>> {
        let this = self.clone();
        tokio::spawn(async move { this.drive(launch, request).await })
    }

    /// Map a finished join handle to the task's response.
    ///
    /// A panicked task is recorded as an error so it never stays `Running`.
    fn joined(
        &self,
        launch: &Launch,
        result: Result<Option<NormalizedResponse>, tokio::task::JoinError>,
    ) -> Option<NormalizedResponse> {
        match result {
            Ok(response) => response,
            Err(e) => {
                error!(model = %launch.model_id, error = %e, "Task failed to complete");
                self.apply(
                    &launch.model_id,
                    launch.attempt,
                    TaskStatus::Error {
                        message: format!("task failed: {}", e),
                        can_retry: true,
                    },
                );
                None
            }
        }
    }

    /// Run one attempt to a terminal state.
    ///
    /// Returns the response only if this attempt's success was recorded.
    async fn drive(&self, launch: Launch, request: Arc<NormalizedRequest>) -> Option<NormalizedResponse> {
        let Launch {
            model_id,
            attempt,
            cancel,
        } = launch;

        let Some((provider, adapter)) = self.inner.providers.resolve(&model_id) else {
            warn!(model = %model_id, "No provider serves this model");
            self.apply(
                &model_id,
                attempt,
                TaskStatus::Error {
                    message: UNKNOWN_MODEL.to_string(),
                    can_retry: false,
                },
            );
            return None;
        };

        let Some(credential) = self.inner.credentials.credential(provider) else {
            warn!(provider, model = %model_id, "No credential configured");
            self.apply(
                &model_id,
                attempt,
                TaskStatus::Error {
                    message: NO_CREDENTIAL.to_string(),
                    can_retry: true,
                },
            );
            return None;
        };

        if !self.apply(&model_id, attempt, TaskStatus::Running) {
            debug!(model = %model_id, attempt, "Task superseded before start");
            return None;
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(model = %model_id, attempt, "Dropping cancelled call");
                return None;
            }
            outcome = with_timeout(
                self.inner.options.task_timeout,
                adapter.send(&model_id, &request, &credential),
            ) => outcome,
        };

        let status = match outcome {
            Some(Ok(mut response)) => {
                if response.latency_ms.is_none() {
                    response.latency_ms = Some(started.elapsed().as_millis() as u64);
                }
                TaskStatus::Success {
                    response: Box::new(response),
                }
            }
            Some(Err(e)) => TaskStatus::Error {
                message: e.to_string(),
                can_retry: true,
            },
            None => TaskStatus::Error {
                message: format!(
                    "request timed out after {}s",
                    self.inner
                        .options
                        .task_timeout
                        .map(|d| d.as_secs_f64())
                        .unwrap_or_default()
                ),
                can_retry: true,
            },
        };

        let response = status.response().cloned();
        if self.apply(&model_id, attempt, status) {
            response
        } else {
            debug!(model = %model_id, attempt, "Discarding late result");
            None
        }
    }

    /// Apply a status change and broadcast it. Returns whether it was accepted.
    fn apply(&self, model_id: &str, attempt: u64, status: TaskStatus) -> bool {
        let mut table = self.inner.table.lock();
        match table.apply(model_id, attempt, status) {
            Some(applied) => {
                debug!(model = %model_id, attempt, state = applied.status.label(), "Task updated");
                self.emit_applied(&applied);
                true
            }
            None => false,
        }
    }

    fn emit_applied(&self, applied: &Applied) {
        self.emit(OrchestratorEvent::TaskUpdated {
            model_id: applied.model_id.clone(),
            attempt: applied.attempt,
            status: applied.status.clone(),
        });
    }

    fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

/// `None` when the limit elapses first.
async fn with_timeout<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
