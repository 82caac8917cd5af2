//! Per-process execution coordinator.
//!
//! One record per in-flight execution, driven through
//! `pending → running ↔ awaiting_llm → {completed, error, timeout}`.
//! Ingress calls `submit` after finishing all auth work; poll handlers read
//! sanitized snapshots; `respond` feeds a suspended script. Terminal
//! snapshots are persisted and the in-memory entry dropped, so history
//! survives restarts while in-flight state deliberately does not.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use airlock_core::current_unix_timestamp_ms;
use airlock_sandbox::{SandboxBackend, SandboxOutcome, SandboxRunRequest};
use airlock_store::{ExecutionRow, Store, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::pool::{SlotStatus, WorkerPool};
use crate::sanitizer::redact_secrets;
use crate::status::ExecutionStatus;

const RESTART_SWEEP_MESSAGE: &str = "service restarted";

/// Dispatcher tuning knobs, wired from the CLI.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    pub queue_depth: usize,
    pub default_timeout: Duration,
    pub llm_wait_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_depth: 64,
            default_timeout: Duration::from_secs(30),
            llm_wait_timeout: Duration::from_secs(300),
        }
    }
}

/// Typed failures of the dispatch layer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("execution '{0}' not found")]
    NotFound(String),
    #[error("execution '{execution_id}' is {status:?}, not awaiting an llm response")]
    WrongState {
        execution_id: String,
        status: ExecutionStatus,
    },
    #[error("execution queue is saturated")]
    Saturated,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The pending llm request surfaced while an execution is suspended.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub model: String,
}

/// Deep-copy view of one execution. Everything textual is already
/// sanitized; plaintext secrets never reach a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_request: Option<LlmRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    pub redacted: bool,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

/// Everything `submit` needs beyond the script itself.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub profile_id: String,
    pub script: String,
    /// Resolved credential plaintext; injected into the sandbox and used as
    /// the sanitizer's secret set. Never stored.
    pub credentials: BTreeMap<String, String>,
    pub network_allowlist: Option<Vec<String>>,
    pub timeout: Option<Duration>,
}

struct ExecutionEntry {
    snapshot: ExecutionSnapshot,
    script: String,
    env_secrets: BTreeMap<String, String>,
    network_allowlist: Option<Vec<String>>,
    timeout: Duration,
    secret_values: Vec<String>,
    respond_tx: Option<oneshot::Sender<String>>,
}

struct DispatcherInner {
    store: Arc<Store>,
    backend: Arc<dyn SandboxBackend>,
    config: DispatcherConfig,
    executions: Mutex<BTreeMap<String, ExecutionEntry>>,
    queue_tx: mpsc::Sender<String>,
    pool: WorkerPool,
}

/// The coordinator. Construction sweeps stale history and spawns one worker
/// task per pool slot on the ambient tokio runtime.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn start(
        store: Arc<Store>,
        backend: Arc<dyn SandboxBackend>,
        config: DispatcherConfig,
    ) -> Result<Self, DispatchError> {
        let swept =
            store.sweep_non_terminal_executions(RESTART_SWEEP_MESSAGE, current_unix_timestamp_ms())?;
        if swept > 0 {
            tracing::warn!(swept, "marked stale in-flight executions as failed");
        }

        let (queue_tx, queue_rx) = mpsc::channel::<String>(config.queue_depth.max(1));
        let inner = Arc::new(DispatcherInner {
            store,
            backend,
            pool: WorkerPool::new(config.worker_count),
            config,
            executions: Mutex::new(BTreeMap::new()),
            queue_tx,
        });

        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));
        for slot in 0..inner.pool.worker_count() {
            let inner = inner.clone();
            let queue_rx = queue_rx.clone();
            tokio::spawn(async move {
                loop {
                    let next = { queue_rx.lock().await.recv().await };
                    let Some(execution_id) = next else {
                        return;
                    };
                    drive_execution(&inner, slot, &execution_id).await;
                }
            });
        }
        tracing::info!(
            workers = inner.pool.worker_count(),
            queue_depth = inner.config.queue_depth,
            "dispatcher started"
        );
        Ok(Self { inner })
    }

    /// Accepts an execution: persists the pending row, registers the
    /// in-flight entry, and enqueues it. Returns `Saturated` without side
    /// effects when the queue is full.
    pub fn submit(&self, request: ExecutionRequest) -> Result<ExecutionSnapshot, DispatchError> {
        let permit = self
            .inner
            .queue_tx
            .try_reserve()
            .map_err(|_| DispatchError::Saturated)?;

        let execution_id = format!("exec_{}", Uuid::new_v4());
        let created_at = current_unix_timestamp_ms();
        self.inner.store.insert_execution_pending(
            &execution_id,
            &request.profile_id,
            &request.script,
            created_at,
        )?;

        let snapshot = ExecutionSnapshot {
            execution_id: execution_id.clone(),
            status: ExecutionStatus::Pending,
            result: None,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            llm_request: None,
            execution_time_ms: None,
            redacted: false,
            created_at,
            completed_at: None,
        };
        let entry = ExecutionEntry {
            snapshot: snapshot.clone(),
            script: request.script,
            secret_values: request.credentials.values().cloned().collect(),
            env_secrets: request.credentials,
            network_allowlist: request.network_allowlist,
            timeout: request.timeout.unwrap_or(self.inner.config.default_timeout),
            respond_tx: None,
        };
        self.lock_executions().insert(execution_id.clone(), entry);
        permit.send(execution_id.clone());
        tracing::info!(execution = %execution_id, profile = %request.profile_id, "execution accepted");
        Ok(snapshot)
    }

    /// Current state of one execution: the in-flight entry when present,
    /// otherwise the persisted row. A persisted terminal row overrides the
    /// in-flight entry, which lags it for the instant between terminal
    /// persistence and entry removal; observers converge on the final state
    /// as soon as it is durable and can never regress past it.
    pub fn poll(&self, execution_id: &str) -> Result<ExecutionSnapshot, DispatchError> {
        let in_flight = self
            .lock_executions()
            .get(execution_id)
            .map(|entry| entry.snapshot.clone());
        let persisted = self
            .inner
            .store
            .get_execution(execution_id)?
            .map(snapshot_from_row);
        match (in_flight, persisted) {
            (_, Some(snapshot)) if snapshot.status.is_terminal() => Ok(snapshot),
            (Some(snapshot), _) | (None, Some(snapshot)) => Ok(snapshot),
            (None, None) => Err(DispatchError::NotFound(execution_id.to_string())),
        }
    }

    /// Feeds the operator's llm response into a suspended execution.
    pub fn respond(
        &self,
        execution_id: &str,
        llm_response: String,
    ) -> Result<ExecutionSnapshot, DispatchError> {
        let (sender, snapshot) = {
            let mut executions = self.lock_executions();
            let Some(entry) = executions.get_mut(execution_id) else {
                drop(executions);
                // A terminal record exists once the entry is gone; that is a
                // state conflict, not a missing execution.
                let row = self
                    .inner
                    .store
                    .get_execution(execution_id)?
                    .ok_or_else(|| DispatchError::NotFound(execution_id.to_string()))?;
                return Err(DispatchError::WrongState {
                    execution_id: execution_id.to_string(),
                    status: ExecutionStatus::parse(&row.status),
                });
            };
            let Some(sender) = entry.respond_tx.take() else {
                return Err(DispatchError::WrongState {
                    execution_id: execution_id.to_string(),
                    status: entry.snapshot.status,
                });
            };
            entry.snapshot.status = ExecutionStatus::Running;
            entry.snapshot.llm_request = None;
            (sender, entry.snapshot.clone())
        };
        // A send failure means the worker already abandoned the wait; the
        // poll surface will show the terminal error shortly.
        let _ = sender.send(llm_response);
        tracing::info!(execution = %execution_id, "llm response delivered");
        Ok(snapshot)
    }

    /// Slot table view for diagnostics.
    pub fn pool_snapshot(&self) -> Vec<SlotStatus> {
        self.inner.pool.snapshot()
    }

    /// Worker slots currently free to pick up pending executions.
    pub fn idle_workers(&self) -> usize {
        self.inner.pool.idle_count()
    }

    fn lock_executions(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<String, ExecutionEntry>> {
        self.inner
            .executions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_inner_executions(
    inner: &DispatcherInner,
) -> std::sync::MutexGuard<'_, BTreeMap<String, ExecutionEntry>> {
    inner
        .executions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn drive_execution(inner: &Arc<DispatcherInner>, slot: usize, execution_id: &str) {
    let Some((request, secret_values)) = prepare_run(inner, slot, execution_id) else {
        return;
    };

    let mut running = Duration::ZERO;
    let backend = inner.backend.clone();
    let started = Instant::now();
    let mut outcome = run_blocking(move || backend.run(request)).await;
    running += started.elapsed();

    loop {
        match outcome {
            SandboxOutcome::Suspended {
                prompt,
                model,
                handle,
            } => {
                let (respond_tx, respond_rx) = oneshot::channel::<String>();
                mark_awaiting_llm(inner, execution_id, prompt, model, respond_tx);
                match tokio::time::timeout(inner.config.llm_wait_timeout, respond_rx).await {
                    Ok(Ok(response)) => {
                        let backend = inner.backend.clone();
                        let started = Instant::now();
                        outcome = run_blocking(move || backend.resume(handle, response)).await;
                        running += started.elapsed();
                    }
                    Ok(Err(_)) | Err(_) => {
                        // No respond arrived (or the dispatcher dropped the
                        // sender); abandon the worker and fail the record.
                        let waited = inner.config.llm_wait_timeout;
                        clear_pending_respond(inner, execution_id);
                        let stdout = handle.abandon();
                        finalize(
                            inner,
                            slot,
                            execution_id,
                            ExecutionStatus::Error,
                            None,
                            stdout,
                            String::new(),
                            Some(format!("no llm response received within {waited:?}")),
                            running,
                            &secret_values,
                        );
                        return;
                    }
                }
            }
            SandboxOutcome::Completed {
                result,
                stdout,
                stderr,
            } => {
                finalize(
                    inner,
                    slot,
                    execution_id,
                    ExecutionStatus::Completed,
                    result,
                    stdout,
                    stderr,
                    None,
                    running,
                    &secret_values,
                );
                return;
            }
            SandboxOutcome::Failed {
                error,
                stdout,
                stderr,
            } => {
                finalize(
                    inner,
                    slot,
                    execution_id,
                    ExecutionStatus::Error,
                    None,
                    stdout,
                    stderr,
                    Some(error),
                    running,
                    &secret_values,
                );
                return;
            }
            SandboxOutcome::TimedOut { stdout, stderr } => {
                finalize(
                    inner,
                    slot,
                    execution_id,
                    ExecutionStatus::Timeout,
                    None,
                    stdout,
                    stderr,
                    Some("script execution timed out".to_string()),
                    running,
                    &secret_values,
                );
                return;
            }
        }
    }
}

/// Marks the slot busy and flips the record to running. Returns the sandbox
/// request, or `None` when the entry vanished (restart race).
fn prepare_run(
    inner: &Arc<DispatcherInner>,
    slot: usize,
    execution_id: &str,
) -> Option<(SandboxRunRequest, Vec<String>)> {
    let mut executions = lock_inner_executions(inner);
    let entry = executions.get_mut(execution_id)?;
    inner.pool.mark_busy(slot, execution_id);
    entry.snapshot.status = ExecutionStatus::Running;
    Some((
        SandboxRunRequest {
            script: entry.script.clone(),
            env_secrets: entry.env_secrets.clone(),
            network_allowlist: entry.network_allowlist.clone(),
            timeout: entry.timeout,
        },
        entry.secret_values.clone(),
    ))
}

fn mark_awaiting_llm(
    inner: &Arc<DispatcherInner>,
    execution_id: &str,
    prompt: String,
    model: String,
    respond_tx: oneshot::Sender<String>,
) {
    let mut executions = lock_inner_executions(inner);
    if let Some(entry) = executions.get_mut(execution_id) {
        let secret_values = entry.secret_values.clone();
        let (prompt, _) = redact_secrets(&prompt, &secret_values);
        entry.snapshot.status = ExecutionStatus::AwaitingLlm;
        entry.snapshot.llm_request = Some(LlmRequest { prompt, model });
        entry.respond_tx = Some(respond_tx);
    }
}

fn clear_pending_respond(inner: &Arc<DispatcherInner>, execution_id: &str) {
    let mut executions = lock_inner_executions(inner);
    if let Some(entry) = executions.get_mut(execution_id) {
        entry.respond_tx = None;
    }
}

#[allow(clippy::too_many_arguments)]
fn finalize(
    inner: &Arc<DispatcherInner>,
    slot: usize,
    execution_id: &str,
    status: ExecutionStatus,
    result: Option<serde_json::Value>,
    stdout: String,
    stderr: String,
    error: Option<String>,
    running: Duration,
    secret_values: &[String],
) {
    let completed_at = current_unix_timestamp_ms();
    let execution_time_ms = u64::try_from(running.as_millis()).unwrap_or(u64::MAX);

    let mut redacted = false;
    let (stdout, hit) = redact_secrets(&stdout, secret_values);
    redacted |= hit;
    let (stderr, hit) = redact_secrets(&stderr, secret_values);
    redacted |= hit;
    let error = error.map(|message| {
        let (message, hit) = redact_secrets(&message, secret_values);
        redacted |= hit;
        message
    });
    let result = result.map(|value| {
        let (value, hit) = sanitize_result(value, secret_values);
        redacted |= hit;
        value
    });

    let result_json = result
        .as_ref()
        .map(|value| serde_json::to_string(value).unwrap_or_else(|_| "null".to_string()));
    // Only the terminal fields reach the UPDATE; profile id, script, and
    // created_at keep their values from the pending insert.
    let row = ExecutionRow {
        id: execution_id.to_string(),
        profile_id: String::new(),
        script: String::new(),
        status: status.as_str().to_string(),
        result_json,
        stdout,
        stderr,
        error,
        execution_time_ms: Some(execution_time_ms),
        redacted,
        created_at_unix_ms: 0,
        completed_at_unix_ms: Some(completed_at),
    };
    if let Err(store_error) = inner.store.finalize_execution(&row) {
        tracing::error!(execution = %execution_id, %store_error, "failed to persist terminal execution");
    }

    // Remove the in-flight entry only after the terminal row is persisted;
    // poll falls through to the store and never observes a gap or a
    // regression past terminal.
    lock_inner_executions(inner).remove(execution_id);
    inner.pool.mark_idle(slot);
    tracing::info!(
        execution = %execution_id,
        status = status.as_str(),
        execution_time_ms,
        redacted,
        "execution finished"
    );
}

/// Redacts the serialized form of the result. When redaction breaks the
/// JSON shape the rewritten text is kept as a string; no exact-match secret
/// may survive even at the cost of structure.
fn sanitize_result(
    value: serde_json::Value,
    secret_values: &[String],
) -> (serde_json::Value, bool) {
    let serialized = serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());
    let (rewritten, redacted) = redact_secrets(&serialized, secret_values);
    if !redacted {
        return (value, false);
    }
    match serde_json::from_str(&rewritten) {
        Ok(reparsed) => (reparsed, true),
        Err(_) => (serde_json::Value::String(rewritten), true),
    }
}

fn snapshot_from_row(row: ExecutionRow) -> ExecutionSnapshot {
    let result = row.result_json.as_deref().map(|raw| {
        serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
    });
    ExecutionSnapshot {
        execution_id: row.id,
        status: ExecutionStatus::parse(&row.status),
        result,
        stdout: row.stdout,
        stderr: row.stderr,
        error: row.error,
        llm_request: None,
        execution_time_ms: row.execution_time_ms,
        redacted: row.redacted,
        created_at: row.created_at_unix_ms,
        completed_at: row.completed_at_unix_ms,
    }
}

/// Runs a blocking backend call off the async runtime. A panicking backend
/// is reported as a worker failure rather than taking the worker task down.
async fn run_blocking(
    op: impl FnOnce() -> SandboxOutcome + Send + 'static,
) -> SandboxOutcome {
    match tokio::task::spawn_blocking(op).await {
        Ok(outcome) => outcome,
        Err(join_error) => SandboxOutcome::Failed {
            error: format!("worker failure: {join_error}"),
            stdout: String::new(),
            stderr: String::new(),
        },
    }
}
