//! Adapter running state and status detail, observable by the host.
//!
//! The handle is shared between the lifecycle (serialized transitions) and
//! delivery tasks (inbound forwarding, shadow failures), which may flag the
//! Error state without entering the lifecycle's critical section.

use std::sync::{Arc, Mutex};

/// Lifecycle state of a transport adapter. Exactly one state is active at
/// any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunningState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
    Error,
}

#[derive(Default)]
struct StatusInner {
    state: Mutex<RunningState>,
    error_message: Mutex<Option<String>>,
}

/// Cloneable handle to an adapter's observable status.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<StatusInner>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunningState {
        *self.inner.state.lock().unwrap()
    }

    pub fn set_state(&self, state: RunningState) {
        *self.inner.state.lock().unwrap() = state;
    }

    /// Status detail for health monitoring; reflects the most recent failure.
    pub fn error_message(&self) -> Option<String> {
        self.inner.error_message.lock().unwrap().clone()
    }

    pub fn set_error_message(&self, message: Option<String>) {
        *self.inner.error_message.lock().unwrap() = message;
    }

    /// Record a failure: Error state plus its message, in one step.
    pub fn fail(&self, message: String) {
        self.set_error_message(Some(message));
        self.set_state(RunningState::Error);
    }
}
