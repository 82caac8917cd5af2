//! The `SandboxBackend` contract and the in-process reference backend.
//!
//! The backend runs the script engine on a dedicated OS thread and speaks to
//! it over mpsc channels. `llm.complete` surfaces as a `Suspended` outcome
//! carrying a resume handle; the language-level pause never crosses this
//! boundary. Wall-clock enforcement uses `recv_timeout` on the host side
//! plus a cooperative cancel flag the engine honors between statements, so
//! an abandoned script cannot run unbounded.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::interpreter::Interpreter;
use crate::ScriptError;

/// One execution request as the pool hands it to a sandbox.
#[derive(Debug, Clone)]
pub struct SandboxRunRequest {
    pub script: String,
    /// Credential plaintext injected as the script's environment.
    pub env_secrets: BTreeMap<String, String>,
    /// Destination hostnames the profile permits. The built-in engine has no
    /// network surface; backends that do must enforce this.
    pub network_allowlist: Option<Vec<String>>,
    /// Wall-clock budget across run + resume segments, excluding time spent
    /// suspended.
    pub timeout: Duration,
}

/// Terminal and suspension outcomes of one sandbox invocation.
pub enum SandboxOutcome {
    Completed {
        result: Option<serde_json::Value>,
        stdout: String,
        stderr: String,
    },
    Failed {
        error: String,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        stdout: String,
        stderr: String,
    },
    Suspended {
        prompt: String,
        model: String,
        handle: ResumeHandle,
    },
}

impl fmt::Debug for SandboxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxOutcome::Completed { result, .. } => f
                .debug_struct("Completed")
                .field("result", result)
                .finish_non_exhaustive(),
            SandboxOutcome::Failed { error, .. } => f
                .debug_struct("Failed")
                .field("error", error)
                .finish_non_exhaustive(),
            SandboxOutcome::TimedOut { .. } => f.write_str("TimedOut"),
            SandboxOutcome::Suspended { prompt, model, .. } => f
                .debug_struct("Suspended")
                .field("prompt", prompt)
                .field("model", model)
                .finish_non_exhaustive(),
        }
    }
}

/// What the core demands of a sandbox implementation. The pool drives one
/// execution per slot through `run` and, across suspensions, `resume`.
pub trait SandboxBackend: Send + Sync {
    fn run(&self, request: SandboxRunRequest) -> SandboxOutcome;
    fn resume(&self, handle: ResumeHandle, llm_response: String) -> SandboxOutcome;
}

enum WorkerEvent {
    Suspended { prompt: String, model: String },
    Finished(Result<Option<serde_json::Value>, ScriptError>),
}

/// Live connection to a suspended script. Dropping it without `resume`
/// leaves the script blocked; call `abandon` to tear it down instead.
pub struct ResumeHandle {
    events: mpsc::Receiver<WorkerEvent>,
    responses: mpsc::Sender<String>,
    stdout: Arc<Mutex<String>>,
    cancelled: Arc<AtomicBool>,
    remaining: Duration,
}

impl ResumeHandle {
    /// Cancels the suspended script and returns the stdout captured so far.
    /// The response channel closes, the engine observes the cancel flag, and
    /// the worker thread unwinds on its own.
    pub fn abandon(self) -> String {
        self.cancelled.store(true, Ordering::SeqCst);
        // Dropping `responses` wakes the blocked `llm.complete` with a
        // channel-closed error.
        snapshot(&self.stdout)
    }
}

impl fmt::Debug for ResumeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeHandle")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

/// The in-process sandbox: one engine thread per execution, secrets injected
/// as the engine's environment map.
#[derive(Debug, Default, Clone)]
pub struct ScriptSandbox;

impl ScriptSandbox {
    pub fn new() -> Self {
        Self
    }

    fn await_event(
        events: mpsc::Receiver<WorkerEvent>,
        responses: mpsc::Sender<String>,
        stdout: Arc<Mutex<String>>,
        cancelled: Arc<AtomicBool>,
        budget: Duration,
    ) -> SandboxOutcome {
        let started = Instant::now();
        match events.recv_timeout(budget) {
            Ok(WorkerEvent::Finished(Ok(result))) => SandboxOutcome::Completed {
                result,
                stdout: snapshot(&stdout),
                stderr: String::new(),
            },
            Ok(WorkerEvent::Finished(Err(error))) => SandboxOutcome::Failed {
                error: error.to_string(),
                stdout: snapshot(&stdout),
                stderr: String::new(),
            },
            Ok(WorkerEvent::Suspended { prompt, model }) => SandboxOutcome::Suspended {
                prompt,
                model,
                handle: ResumeHandle {
                    events,
                    responses,
                    stdout,
                    cancelled,
                    remaining: budget.saturating_sub(started.elapsed()),
                },
            },
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::SeqCst);
                drop(responses);
                SandboxOutcome::TimedOut {
                    stdout: snapshot(&stdout),
                    stderr: String::new(),
                }
            }
            Err(RecvTimeoutError::Disconnected) => SandboxOutcome::Failed {
                error: "worker terminated unexpectedly".to_string(),
                stdout: snapshot(&stdout),
                stderr: String::new(),
            },
        }
    }
}

impl SandboxBackend for ScriptSandbox {
    fn run(&self, request: SandboxRunRequest) -> SandboxOutcome {
        if let Some(allowlist) = &request.network_allowlist {
            tracing::debug!(
                hosts = allowlist.len(),
                "network allowlist recorded; built-in engine exposes no network surface"
            );
        }
        let stdout = Arc::new(Mutex::new(String::new()));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>();
        let (response_tx, response_rx) = mpsc::channel::<String>();

        let thread_stdout = stdout.clone();
        let thread_cancelled = cancelled.clone();
        let spawn_result = std::thread::Builder::new()
            .name("airlock-script".to_string())
            .spawn(move || {
                let llm_events = event_tx.clone();
                let llm = Box::new(move |prompt: &str, model: &str| {
                    let sent = llm_events.send(WorkerEvent::Suspended {
                        prompt: prompt.to_string(),
                        model: model.to_string(),
                    });
                    if sent.is_err() {
                        return Err(ScriptError::Cancelled);
                    }
                    response_rx.recv().map_err(|_| ScriptError::Cancelled)
                });
                let interpreter = Interpreter::new(
                    request.env_secrets,
                    thread_stdout,
                    thread_cancelled,
                    llm,
                );
                let outcome = interpreter
                    .run(&request.script)
                    .map(|artifacts| artifacts.result);
                let _ = event_tx.send(WorkerEvent::Finished(outcome));
            });
        if let Err(error) = spawn_result {
            return SandboxOutcome::Failed {
                error: format!("failed to start worker thread: {error}"),
                stdout: String::new(),
                stderr: String::new(),
            };
        }
        Self::await_event(event_rx, response_tx, stdout, cancelled, request.timeout)
    }

    fn resume(&self, handle: ResumeHandle, llm_response: String) -> SandboxOutcome {
        let ResumeHandle {
            events,
            responses,
            stdout,
            cancelled,
            remaining,
        } = handle;
        if responses.send(llm_response).is_err() {
            return SandboxOutcome::Failed {
                error: "worker is no longer waiting for a response".to_string(),
                stdout: snapshot(&stdout),
                stderr: String::new(),
            };
        }
        Self::await_event(events, responses, stdout, cancelled, remaining)
    }
}

fn snapshot(stdout: &Arc<Mutex<String>>) -> String {
    stdout
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}
