//! Execution status: a closed six-variant sum with one permitted cycle.

use serde::Serialize;

/// Where an execution currently stands. `Completed`, `Error`, and `Timeout`
/// are terminal; `Running` and `AwaitingLlm` may alternate arbitrarily many
/// times within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    AwaitingLlm,
    Completed,
    Error,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::AwaitingLlm => "awaiting_llm",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Error | ExecutionStatus::Timeout
        )
    }

    /// Parses the persisted representation. Unknown strings map to `Error`
    /// rather than panicking on a hand-edited store.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => ExecutionStatus::Pending,
            "running" => ExecutionStatus::Running,
            "awaiting_llm" => ExecutionStatus::AwaitingLlm,
            "completed" => ExecutionStatus::Completed,
            "timeout" => ExecutionStatus::Timeout,
            _ => ExecutionStatus::Error,
        }
    }
}
