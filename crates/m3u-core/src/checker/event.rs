use serde::{Deserialize, Serialize};

/// Progress notifications emitted by a [`Checker`](super::Checker) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckEvent {
    BatchCompleted {
        /// 1-based index of the batch that just drained.
        batch: usize,
        batches: usize,
        checked: usize,
        total: usize,
        alive: usize,
        unstable: usize,
        dead: usize,
        timeout_secs: f64,
    },
    RetestCompleted {
        recovered: usize,
        failed: usize,
    },
}
