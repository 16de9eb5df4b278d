//! Per-operation pacing/idempotency bookkeeping (§3), consulted by the
//! scheduler's eligibility chain and mutated at enqueue/dequeue time (§4.4).

use std::collections::HashMap;

use autoscript_types::ScheduleState;

#[derive(Debug, Default)]
pub struct ScheduleStateStore {
    states: HashMap<String, ScheduleState>,
}

impl ScheduleStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> ScheduleState {
        self.states.get(id).cloned().unwrap_or_default()
    }

    pub fn as_map(&self) -> &HashMap<String, ScheduleState> {
        &self.states
    }

    pub fn restore(&mut self, map: HashMap<String, ScheduleState>) {
        self.states = map;
    }

    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut ScheduleState)) {
        let mut state = self.get(id);
        f(&mut state);
        self.states.insert(id.to_string(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_mutates_the_stored_entry() {
        let mut store = ScheduleStateStore::new();
        store.update("a", |s| s.last_trigger_key = Some("startup".to_string()));
        assert_eq!(store.get("a").last_trigger_key.as_deref(), Some("startup"));
    }
}
