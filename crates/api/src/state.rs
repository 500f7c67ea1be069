//! Application state shared across handlers.

use worker::CoordinatorHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Entry point to the running coordinator
    pub coordinator: CoordinatorHandle,
}

impl AppState {
    pub fn new(coordinator: CoordinatorHandle) -> Self {
        Self { coordinator }
    }
}
