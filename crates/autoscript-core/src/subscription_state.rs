//! Per-subscription runtime state (§3). `appear_count` and `version` are
//! monotonic for the lifetime of the store; nothing outside `apply_event`
//! is allowed to touch them.

use std::collections::HashMap;

use autoscript_types::{SubscriptionEventKind, SubscriptionState};

#[derive(Debug, Default)]
pub struct SubscriptionStateStore {
    states: HashMap<String, SubscriptionState>,
}

impl SubscriptionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> SubscriptionState {
        self.states.get(id).copied().unwrap_or_default()
    }

    pub fn as_map(&self) -> &HashMap<String, SubscriptionState> {
        &self.states
    }

    pub fn restore(&mut self, map: HashMap<String, SubscriptionState>) {
        self.states = map
            .into_iter()
            .map(|(id, mut state)| {
                state.appear_count = state.appear_count.max(0);
                state.version = state.version.max(0);
                (id, state)
            })
            .collect();
    }

    /// Applies one watcher event to subscription `id`, per the invariants in
    /// §3. Returns the updated state.
    pub fn apply_event(
        &mut self,
        id: &str,
        kind: SubscriptionEventKind,
        count: Option<u64>,
        now: i64,
    ) -> SubscriptionState {
        let mut state = self.get(id);
        state.last_event_at = Some(now);
        match kind {
            SubscriptionEventKind::Appear => {
                state.exists = true;
                state.appear_count += 1;
                state.version += 1;
            }
            SubscriptionEventKind::Exist => {
                state.exists = true;
            }
            SubscriptionEventKind::Disappear => {
                state.exists = false;
                state.version += 1;
            }
            SubscriptionEventKind::Change => {
                let count_positive = count.map(|c| c > 0).unwrap_or(false);
                state.exists = count_positive || state.exists;
                state.version += 1;
            }
        }
        self.states.insert(id.to_string(), state);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appear_increments_count_and_version() {
        let mut store = SubscriptionStateStore::new();
        store.apply_event("s", SubscriptionEventKind::Appear, None, 1);
        let state = store.apply_event("s", SubscriptionEventKind::Appear, None, 2);
        assert_eq!(state.appear_count, 2);
        assert_eq!(state.version, 2);
        assert!(state.exists);
    }

    #[test]
    fn exist_does_not_touch_appear_count_or_version() {
        let mut store = SubscriptionStateStore::new();
        store.apply_event("s", SubscriptionEventKind::Appear, None, 1);
        let state = store.apply_event("s", SubscriptionEventKind::Exist, None, 2);
        assert_eq!(state.appear_count, 1);
        assert_eq!(state.version, 1);
        assert!(state.exists);
    }

    #[test]
    fn disappear_clears_exists_and_bumps_version() {
        let mut store = SubscriptionStateStore::new();
        store.apply_event("s", SubscriptionEventKind::Appear, None, 1);
        let state = store.apply_event("s", SubscriptionEventKind::Disappear, None, 2);
        assert!(!state.exists);
        assert_eq!(state.version, 2);
    }

    #[test]
    fn change_with_positive_count_sets_exists_true() {
        let mut store = SubscriptionStateStore::new();
        let state = store.apply_event("s", SubscriptionEventKind::Change, Some(3), 1);
        assert!(state.exists);
        assert_eq!(state.version, 1);
    }
}
