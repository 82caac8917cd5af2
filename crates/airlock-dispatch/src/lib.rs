//! Execution dispatch: the state machine between ingress and the sandbox.
//!
//! Owns one record per in-flight execution, a bounded submit queue, the
//! worker-slot table, and the output sanitizer. Polling is the only way
//! state leaves this crate, and every snapshot is sanitized first.

mod dispatcher;
mod pool;
mod sanitizer;
mod status;

pub use dispatcher::{
    DispatchError, Dispatcher, DispatcherConfig, ExecutionRequest, ExecutionSnapshot, LlmRequest,
};
pub use pool::{SlotStatus, WorkerPool};
pub use sanitizer::redact_secrets;
pub use status::ExecutionStatus;
