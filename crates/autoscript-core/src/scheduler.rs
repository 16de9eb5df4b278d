//! Operation eligibility and trigger-key deduplication (§4.4). The scheduler
//! decides *what* becomes eligible on a given event; the caller (the
//! `Runner`) is responsible for actually chaining the executor call onto the
//! serial queue and resolving the outcome once it runs.

use std::collections::HashSet;

use autoscript_types::{Condition, Operation, OperationStatus, Script, SubscriptionEventKind, Trigger, WatcherEvent};

use crate::impact::ImpactEngine;
use crate::operation_state::OperationStateStore;
use crate::schedule_state::ScheduleStateStore;
use crate::subscription_state::SubscriptionStateStore;

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: HashSet<String>,
    force_run: HashSet<String>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, op_id: &str) -> bool {
        self.pending.contains(op_id)
    }

    pub fn mark_pending(&mut self, op_id: &str) {
        self.pending.insert(op_id.to_string());
    }

    pub fn clear_pending(&mut self, op_id: &str) {
        self.pending.remove(op_id);
    }

    pub fn request_force_run(&mut self, op_id: &str) {
        self.force_run.insert(op_id.to_string());
    }

    /// Resets every `oncePerAppear` operation whose trigger is a
    /// `subscription_event` on `subscription_id` and whose state is not
    /// already `pending`, so its per-appear cycle can fire again.
    pub fn reset_on_appear(
        &self,
        script: &Script,
        subscription_id: &str,
        operation_states: &mut OperationStateStore,
        now: i64,
    ) {
        for op in &script.operations {
            if !op.once_per_appear {
                continue;
            }
            if op.trigger.subscription_id() != Some(subscription_id) {
                continue;
            }
            if operation_states.get(&op.id).status != OperationStatus::Pending {
                operation_states.reset_to_pending(&op.id, now);
            }
        }
    }

    /// Scans every operation in script order and returns the ids eligible to
    /// run for `event`, in enqueue order. Schedule-state bookkeeping (§4.4
    /// "Enqueue") is applied here before returning each id, and the op is
    /// marked pending; clearing pending again is the caller's job once the
    /// executor actually runs.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_ready_operations(
        &mut self,
        script: &Script,
        event: &WatcherEvent,
        now: i64,
        subscription_states: &SubscriptionStateStore,
        operation_states: &OperationStateStore,
        schedule_states: &mut ScheduleStateStore,
        impact: &ImpactEngine,
    ) -> Vec<String> {
        let mut ready = Vec::new();
        for op in &script.operations {
            if self.should_schedule(op, event, now, subscription_states, operation_states, schedule_states, impact) {
                self.enqueue_bookkeeping(op, event, now, subscription_states, schedule_states);
                ready.push(op.id.clone());
            }
        }
        ready
    }

    #[allow(clippy::too_many_arguments)]
    fn should_schedule(
        &self,
        op: &Operation,
        event: &WatcherEvent,
        now: i64,
        subscription_states: &SubscriptionStateStore,
        operation_states: &OperationStateStore,
        schedule_states: &ScheduleStateStore,
        impact: &ImpactEngine,
    ) -> bool {
        // 1. enabled
        if !op.enabled {
            return false;
        }
        // 2. force-run or trigger match
        let forced = self.force_run.contains(&op.id);
        if !forced && !is_triggered(op, event) {
            return false;
        }
        // 3. once + done
        let op_state = operation_states.get(&op.id);
        if op.once && op_state.status == OperationStatus::Done {
            return false;
        }
        // 4. dependsOn satisfied
        for dep in &op.depends_on {
            let dep_status = operation_states.get(dep).status;
            if !matches!(dep_status, OperationStatus::Done | OperationStatus::Skipped) {
                return false;
            }
        }
        // 5. conditions hold
        for cond in &op.conditions {
            if !condition_holds(cond, operation_states, subscription_states) {
                return false;
            }
        }
        // 6. impact engine permits
        if !impact.can_run(op, event) {
            return false;
        }
        // 7. not already pending
        if self.pending.contains(&op.id) {
            return false;
        }
        // 8. pacing gates
        let schedule = schedule_states.get(&op.id);
        if op.pacing.operation_min_interval_ms > 0 {
            if let Some(last_started) = schedule.last_started_at {
                if now.saturating_sub(last_started) < op.pacing.operation_min_interval_ms as i64 {
                    return false;
                }
            }
        }
        if op.pacing.event_cooldown_ms > 0 {
            if let Some(last_event) = schedule.last_event_at {
                if now.saturating_sub(last_event) < op.pacing.event_cooldown_ms as i64 {
                    return false;
                }
            }
        }
        // 9. oncePerAppear dedup
        if op.once_per_appear {
            if let Some(subscription_id) = op.trigger.subscription_id() {
                let appear_count = subscription_states.get(subscription_id).appear_count;
                if appear_count > 0
                    && (schedule.last_scheduled_appear_count == Some(appear_count)
                        || schedule.last_completed_appear_count == Some(appear_count))
                {
                    return false;
                }
            }
        }
        // 10. trigger-key dedup
        if !forced {
            let key = trigger_key(op, event, subscription_states);
            if schedule.last_trigger_key.as_deref() == Some(key.as_str()) {
                let allow_exist_reschedule = !op.once
                    && !op.once_per_appear
                    && matches!(
                        op.trigger,
                        Trigger::SubscriptionEvent {
                            event: SubscriptionEventKind::Exist,
                            ..
                        }
                    )
                    && (op.pacing.operation_min_interval_ms > 0 || op.pacing.event_cooldown_ms > 0);
                if !allow_exist_reschedule {
                    return false;
                }
            }
        }

        true
    }

    fn enqueue_bookkeeping(
        &mut self,
        op: &Operation,
        event: &WatcherEvent,
        now: i64,
        subscription_states: &SubscriptionStateStore,
        schedule_states: &mut ScheduleStateStore,
    ) {
        let forced = self.force_run.remove(&op.id);
        let key = if forced {
            format!("force:{}", op.id)
        } else {
            trigger_key(op, event, subscription_states)
        };
        let appear_count = op
            .trigger
            .subscription_id()
            .map(|id| subscription_states.get(id).appear_count);

        schedule_states.update(&op.id, |s| {
            s.last_scheduled_at = Some(now);
            s.last_event_at = Some(now);
            s.last_trigger_key = Some(key);
            if let Some(count) = appear_count {
                if count > 0 {
                    s.last_scheduled_appear_count = Some(count);
                }
            }
        });
        self.pending.insert(op.id.clone());
    }
}

fn is_triggered(op: &Operation, event: &WatcherEvent) -> bool {
    match (&op.trigger, event) {
        (Trigger::Startup, WatcherEvent::Startup { .. }) => true,
        (Trigger::Manual, WatcherEvent::Manual { .. }) => true,
        (
            Trigger::SubscriptionEvent { subscription_id, event: want },
            WatcherEvent::Subscription { subscription_id: got_id, kind, .. },
        ) => subscription_id == got_id && want == kind,
        _ => false,
    }
}

fn condition_holds(
    cond: &Condition,
    operation_states: &OperationStateStore,
    subscription_states: &SubscriptionStateStore,
) -> bool {
    match cond {
        Condition::OperationDone { operation_id } => {
            operation_states.get(operation_id).status == OperationStatus::Done
        }
        Condition::SubscriptionExist { subscription_id } => subscription_states.get(subscription_id).exists,
        Condition::SubscriptionAppear { subscription_id } => {
            subscription_states.get(subscription_id).appear_count > 0
        }
    }
}

/// §4.4 step 10, "Trigger-key dedup".
fn trigger_key(op: &Operation, event: &WatcherEvent, subscription_states: &SubscriptionStateStore) -> String {
    match &op.trigger {
        Trigger::Startup => "startup".to_string(),
        Trigger::Manual => format!("manual:{}", event.timestamp_ms()),
        Trigger::SubscriptionEvent { subscription_id, event: kind } => {
            let state = subscription_states.get(subscription_id);
            match kind {
                SubscriptionEventKind::Exist | SubscriptionEventKind::Appear => {
                    format!("{subscription_id}.{}:{}", kind.as_str(), state.appear_count)
                }
                SubscriptionEventKind::Disappear | SubscriptionEventKind::Change => {
                    format!("{subscription_id}.{}:{}", kind.as_str(), state.version)
                }
            }
        }
        Trigger::Unknown(raw) => format!("unknown:{raw}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscript_types::{CheckpointSpec, ImpactScope, OnFailure, PacingPolicy, RetryPolicy, ValidationSpec};

    fn startup_op(id: &str) -> Operation {
        Operation {
            id: id.to_string(),
            enabled: true,
            action: "click".to_string(),
            params: serde_json::Value::Null,
            trigger: Trigger::Startup,
            depends_on: vec![],
            conditions: vec![],
            retry: RetryPolicy::default(),
            impact: ImpactScope::default(),
            on_failure: OnFailure::default(),
            pacing: PacingPolicy::default(),
            timeout_ms: None,
            disable_timeout: false,
            validation: None::<ValidationSpec>,
            checkpoint: CheckpointSpec::default(),
            once: true,
            once_per_appear: false,
        }
    }

    #[test]
    fn schedules_startup_op_on_startup_event() {
        let mut scheduler = Scheduler::new();
        let op = startup_op("a");
        let subs = SubscriptionStateStore::new();
        let ops = OperationStateStore::new();
        let mut schedules = ScheduleStateStore::new();
        let impact = ImpactEngine::new();
        let event = WatcherEvent::Startup { timestamp_ms: 0 };
        assert!(scheduler.should_schedule(&op, &event, 0, &subs, &ops, &schedules, &impact));
        scheduler.enqueue_bookkeeping(&op, &event, 0, &subs, &mut schedules);
        assert!(scheduler.is_pending("a"));
        assert_eq!(schedules.get("a").last_trigger_key.as_deref(), Some("startup"));
    }

    #[test]
    fn trigger_key_dedup_rejects_repeat_startup_event() {
        let mut scheduler = Scheduler::new();
        let op = startup_op("a");
        let subs = SubscriptionStateStore::new();
        let ops = OperationStateStore::new();
        let mut schedules = ScheduleStateStore::new();
        let impact = ImpactEngine::new();
        let event = WatcherEvent::Startup { timestamp_ms: 0 };
        scheduler.enqueue_bookkeeping(&op, &event, 0, &subs, &mut schedules);
        scheduler.clear_pending("a");
        assert!(!scheduler.should_schedule(&op, &event, 1, &subs, &ops, &schedules, &impact));
    }

    #[test]
    fn exist_trigger_reschedules_with_pacing_but_not_without() {
        let mut op = startup_op("a");
        op.trigger = Trigger::SubscriptionEvent {
            subscription_id: "s".to_string(),
            event: SubscriptionEventKind::Exist,
        };
        op.once = false;
        let mut subs = SubscriptionStateStore::new();
        subs.apply_event("s", SubscriptionEventKind::Exist, None, 0);
        let ops = OperationStateStore::new();
        let mut schedules = ScheduleStateStore::new();
        let impact = ImpactEngine::new();
        let event = WatcherEvent::Subscription {
            subscription_id: "s".to_string(),
            kind: SubscriptionEventKind::Exist,
            selector: None,
            count: None,
            timestamp_ms: 0,
        };

        let mut scheduler = Scheduler::new();
        scheduler.enqueue_bookkeeping(&op, &event, 0, &subs, &mut schedules);
        scheduler.clear_pending("a");
        assert!(
            !scheduler.should_schedule(&op, &event, 10, &subs, &ops, &schedules, &impact),
            "without pacing, repeated exist on the same appearCount must not reschedule"
        );

        op.pacing.event_cooldown_ms = 5;
        assert!(
            scheduler.should_schedule(&op, &event, 10, &subs, &ops, &schedules, &impact),
            "with positive pacing, the allow-exist-reschedule carve-out applies"
        );
    }
}
