//! Worker-slot accounting. A slot stays busy from the first `run` call
//! through the terminal outcome, including across suspend/resume cycles;
//! it never goes idle while its execution is merely waiting on an agent.

use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Default)]
struct SlotState {
    execution_id: Option<String>,
    completed_executions: u64,
}

/// Externally visible slot state.
#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub slot: usize,
    pub busy: bool,
    pub execution_id: Option<String>,
    pub completed_executions: u64,
}

/// Mutex-guarded slot table for `worker_count` sandbox workers.
pub struct WorkerPool {
    slots: Mutex<Vec<SlotState>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            slots: Mutex::new(vec![SlotState::default(); worker_count.max(1)]),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.guard().len()
    }

    pub fn mark_busy(&self, slot: usize, execution_id: &str) {
        let mut slots = self.guard();
        if let Some(state) = slots.get_mut(slot) {
            state.execution_id = Some(execution_id.to_string());
        }
    }

    pub fn mark_idle(&self, slot: usize) {
        let mut slots = self.guard();
        if let Some(state) = slots.get_mut(slot) {
            if state.execution_id.take().is_some() {
                state.completed_executions = state.completed_executions.saturating_add(1);
            }
        }
    }

    pub fn idle_count(&self) -> usize {
        self.guard()
            .iter()
            .filter(|state| state.execution_id.is_none())
            .count()
    }

    pub fn snapshot(&self) -> Vec<SlotStatus> {
        self.guard()
            .iter()
            .enumerate()
            .map(|(slot, state)| SlotStatus {
                slot,
                busy: state.execution_id.is_some(),
                execution_id: state.execution_id.clone(),
                completed_executions: state.completed_executions,
            })
            .collect()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<SlotState>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
