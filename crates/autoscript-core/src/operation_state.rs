//! Per-operation runtime state (§3). `runs` increments exactly once per
//! terminal transition (`done`/`skipped`/`failed`); `pending` never bumps it.

use std::collections::HashMap;

use autoscript_types::{OperationState, OperationStatus};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct OperationStateStore {
    states: HashMap<String, OperationState>,
}

impl OperationStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> OperationState {
        self.states.get(id).cloned().unwrap_or_default()
    }

    pub fn as_map(&self) -> &HashMap<String, OperationState> {
        &self.states
    }

    pub fn restore(&mut self, map: HashMap<String, OperationState>) {
        self.states = map;
    }

    pub fn mark_terminal(
        &mut self,
        id: &str,
        status: OperationStatus,
        error: Option<String>,
        result: Value,
        now: i64,
    ) {
        let mut state = self.get(id);
        state.status = status;
        state.runs += 1;
        state.last_error = error;
        state.result = result;
        state.updated_at = Some(now);
        self.states.insert(id.to_string(), state);
    }

    /// Resets a `oncePerAppear` operation back to `pending` when a fresh
    /// `appear` event arrives for its trigger subscription (§4.4 "reset-on-appear").
    pub fn reset_to_pending(&mut self, id: &str, now: i64) {
        let mut state = self.get(id);
        state.status = OperationStatus::Pending;
        state.last_error = None;
        state.result = Value::Null;
        state.updated_at = Some(now);
        self.states.insert(id.to_string(), state);
    }
}
