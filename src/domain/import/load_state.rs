// ============================================================
// LOAD STATE
// ============================================================
// Lifecycle of one source import

use serde::{Deserialize, Serialize};

/// Sampling -> Reconciling -> Streaming -> Draining -> Done | Aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    Sampling,
    Reconciling,
    Streaming,
    Draining,
    Done,
    Aborted,
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Done | LoadState::Aborted)
    }

    /// Whether moving to `next` is a legal step.
    pub fn can_transition_to(&self, next: LoadState) -> bool {
        use LoadState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Sampling, Reconciling)
                | (Sampling, Done)
                | (Sampling, Aborted)
                | (Reconciling, Streaming)
                | (Reconciling, Aborted)
                | (Streaming, Draining)
                | (Streaming, Aborted)
                | (Draining, Done)
                | (Draining, Aborted)
        )
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadState::Sampling => "Sampling",
            LoadState::Reconciling => "Reconciling",
            LoadState::Streaming => "Streaming",
            LoadState::Draining => "Draining",
            LoadState::Done => "Done",
            LoadState::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// Result of importing one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub object: String,
    pub state: LoadState,

    /// Source rows read in this run, including rows skipped below the checkpoint
    pub rows_read: usize,

    /// Rows skipped because they sat below the checkpoint
    pub rows_skipped: usize,

    pub batches_submitted: usize,
    pub success_count: usize,
    pub error_count: usize,

    /// The shutdown signal stopped submission early
    pub interrupted: bool,

    /// Why the import was aborted, if it was
    pub abort_reason: Option<String>,
}

impl LoadReport {
    pub fn new(object: &str) -> Self {
        Self {
            object: object.to_string(),
            state: LoadState::Sampling,
            rows_read: 0,
            rows_skipped: 0,
            batches_submitted: 0,
            success_count: 0,
            error_count: 0,
            interrupted: false,
            abort_reason: None,
        }
    }

    pub fn aborted(mut self, reason: impl Into<String>) -> Self {
        self.state = LoadState::Aborted;
        self.abort_reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(LoadState::Sampling.can_transition_to(LoadState::Reconciling));
        assert!(LoadState::Reconciling.can_transition_to(LoadState::Aborted));
        assert!(!LoadState::Reconciling.can_transition_to(LoadState::Done));
        assert!(!LoadState::Done.can_transition_to(LoadState::Streaming));
        assert!(LoadState::Aborted.is_terminal());
        assert!(!LoadState::Done.can_transition_to(LoadState::Aborted));
    }
}
