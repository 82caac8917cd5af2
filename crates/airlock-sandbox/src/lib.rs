//! The worker scripting runtime and sandbox contract.
//!
//! Scripts run in one fixed, deliberately small imperative language, opaque
//! to every other crate. The shim surface injected into the execution scope
//! is `settings.get` / `settings.keys`, `llm.complete` (the single
//! suspension point), `set_result`, and `print`. The `SandboxBackend` trait
//! is what the worker pool drives; `ScriptSandbox` is the in-process
//! reference implementation.

use thiserror::Error;

mod backend;
mod interpreter;
mod lexer;
mod parser;
mod value;

pub use backend::{
    ResumeHandle, SandboxBackend, SandboxOutcome, SandboxRunRequest, ScriptSandbox,
};
pub use value::Value;

/// Failures surfaced by the script engine.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("{0}")]
    Runtime(String),
    #[error("execution cancelled")]
    Cancelled,
}
