//! Failure → blocking-scope propagation (§4.3). Modeled as a pure
//! `(state, operation, event) -> (state, effect)` step, the same shape as
//! `tandem-orchestrator`'s `DefaultMissionReducer::reduce` matches an event
//! enum top-to-bottom and returns commands alongside mutated state.

use std::collections::HashSet;

use autoscript_types::{ImpactScope, OnFailure, Operation, WatcherEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    None,
    Op,
    Subscription,
    Script,
}

#[derive(Debug, Default)]
pub struct ImpactEngine {
    script_stopped: bool,
    blocked_subscriptions: HashSet<String>,
    blocked_operations: HashSet<String>,
}

impl ImpactEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_stopped(&self) -> bool {
        self.script_stopped
    }

    pub fn blocked_subscriptions(&self) -> &HashSet<String> {
        &self.blocked_subscriptions
    }

    pub fn blocked_operations(&self) -> &HashSet<String> {
        &self.blocked_operations
    }

    pub fn set_blocked_subscriptions(&mut self, subs: HashSet<String>) {
        self.blocked_subscriptions = subs;
    }

    pub fn set_blocked_operations(&mut self, ops: HashSet<String>) {
        self.blocked_operations = ops;
    }

    pub fn set_script_stopped(&mut self, stopped: bool) {
        self.script_stopped = stopped;
    }

    /// `false` if the script has stopped, the operation is blocked, or the
    /// event's subscription is blocked.
    pub fn can_run(&self, op: &Operation, event: &WatcherEvent) -> bool {
        if self.script_stopped {
            return false;
        }
        if self.blocked_operations.contains(&op.id) {
            return false;
        }
        if let Some(subscription_id) = event.subscription_id() {
            if self.blocked_subscriptions.contains(subscription_id) {
                return false;
            }
        }
        true
    }

    /// Decision table from §4.3, checked top-to-bottom.
    pub fn apply_failure(&mut self, op: &Operation, event: &WatcherEvent) -> FailureScope {
        let subscription_id = event.subscription_id().map(str::to_string);

        if op.on_failure == OnFailure::Continue {
            return FailureScope::None;
        }
        if op.on_failure == OnFailure::StopAll {
            self.script_stopped = true;
            return FailureScope::Script;
        }
        if op.impact == ImpactScope::Script {
            self.script_stopped = true;
            return FailureScope::Script;
        }
        if op.impact == ImpactScope::Subscription {
            if let Some(id) = subscription_id {
                self.blocked_subscriptions.insert(id);
            }
            return FailureScope::Subscription;
        }
        if op.on_failure == OnFailure::ChainStop {
            if let Some(id) = subscription_id {
                self.blocked_subscriptions.insert(id);
                return FailureScope::Subscription;
            }
            self.blocked_operations.insert(op.id.clone());
            return FailureScope::Op;
        }
        self.blocked_operations.insert(op.id.clone());
        FailureScope::Op
    }
}
