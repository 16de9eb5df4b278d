//! The operation executor wrapper (§4.5): pacing waits, stale-trigger
//! re-checks, timeout resolution, the attempt/backoff loop, recovery, and
//! result classification. Grounded on `tandem-core::EngineLoop`'s
//! provider-call retry handling — an attempt loop wrapped around an opaque
//! external call, with an observability event emitted at every edge.

use std::sync::Arc;
use std::time::Duration;

use autoscript_types::{Operation, RuntimeContext, Script, SubscriptionEventKind, Trigger, WatcherEvent};
use regex::Regex;
use serde_json::{json, Value};

use crate::contracts::{Checkpoint, ExecutionContext, Executor, ExecutorOutcome, Validator, ValidationPhase};
use crate::impact::{FailureScope, ImpactEngine};
use crate::recovery::run_recovery;
use crate::subscription_state::SubscriptionStateStore;

const NAVIGATION_ACTIONS: &[&str] = &[
    "goto",
    "back",
    "new_page",
    "switch_page",
    "ensure_tab_pool",
    "tab_pool_switch_next",
    "tab_pool_switch_slot",
];

const TIMEOUT_45S_ACTIONS: &[&str] = &[
    "evaluate",
    "goto",
    "new_page",
    "switch_page",
    "ensure_tab_pool",
    "tab_pool_switch_next",
    "tab_pool_switch_slot",
];

const TIMEOUT_30S_ACTIONS: &[&str] = &[
    "click",
    "type",
    "back",
    "press_key",
    "get_current_url",
    "raise_error",
];

fn is_verification_action(action: &str) -> bool {
    action.starts_with("verify") || action.starts_with("assert")
}

fn is_scroll_action(action: &str) -> bool {
    action.starts_with("scroll")
}

pub type MockExecutorHook =
    Arc<dyn Fn(&Operation, &ExecutionContext) -> Option<ExecutorOutcome> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    SkippedStaleTrigger,
    SkippedStaleTriggerPreValidation,
    TerminalDone { code: String },
    Failed { scope: FailureScope },
}

pub struct OperationExecutor {
    pub executor: Arc<dyn Executor>,
    pub validator: Option<Arc<dyn Validator>>,
    pub checkpoint: Option<Arc<dyn Checkpoint>>,
    pub mock_hook: Option<MockExecutorHook>,
    pub skip_validation: bool,
}

/// A thin, borrow-free slice of things `run` needs to observe — kept
/// separate from the owning `Runner` so this module has no dependency on it.
pub struct Observe<'a> {
    pub emit: &'a mut dyn FnMut(&'static str, Value),
}

impl OperationExecutor {
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        run_id: &str,
        profile_id: &str,
        script: &Script,
        op: &Operation,
        event: &WatcherEvent,
        runtime: &mut RuntimeContext,
        subscription_states: &SubscriptionStateStore,
        impact: &mut ImpactEngine,
        now_ms: impl Fn() -> i64,
        observe: &mut Observe<'_>,
    ) -> Outcome {
        let max_attempts = op.retry.attempts.max(1);

        for attempt in 1..=max_attempts {
            self.pacing_wait(op, runtime, &now_ms).await;

            if is_stale_trigger(op, event, subscription_states) {
                (observe.emit)(
                    autoscript_types::EVT_OPERATION_SKIPPED,
                    json!({"operationId": op.id, "code": "OPERATION_SKIPPED_STALE_TRIGGER"}),
                );
                return Outcome::SkippedStaleTrigger;
            }

            let timeout_ms = effective_timeout(op, script);
            let context = ExecutionContext {
                run_id: run_id.to_string(),
                event: event.clone(),
                attempt,
                max_attempts,
                runtime: runtime.clone(),
            };

            (observe.emit)(
                autoscript_types::EVT_OPERATION_START,
                json!({"operationId": op.id, "attempt": attempt, "maxAttempts": max_attempts}),
            );

            let attempt_outcome = self
                .execute_attempt(profile_id, op, &context, timeout_ms)
                .await;

            if attempt_outcome.ok {
                if NAVIGATION_ACTIONS.contains(&op.action.as_str()) {
                    runtime.last_navigation_at = Some(now_ms());
                }
                (observe.emit)(
                    autoscript_types::EVT_OPERATION_DONE,
                    json!({"operationId": op.id, "data": attempt_outcome.data}),
                );
                return Outcome::Done;
            }

            let code = attempt_outcome.code.clone().unwrap_or_default();
            let message = attempt_outcome.message.clone().unwrap_or_default();

            if code.contains("VALIDATION")
                && attempt_outcome.data.get("phase").and_then(Value::as_str) == Some("pre")
                && is_stale_trigger(op, event, subscription_states)
            {
                (observe.emit)(
                    autoscript_types::EVT_OPERATION_SKIPPED,
                    json!({"operationId": op.id, "code": "OPERATION_SKIPPED_STALE_TRIGGER_PRE_VALIDATION"}),
                );
                return Outcome::SkippedStaleTriggerPreValidation;
            }

            if let Some(done_tag) = terminal_done_code(&code, &message) {
                (observe.emit)(
                    autoscript_types::EVT_OPERATION_TERMINAL,
                    json!({"operationId": op.id, "code": done_tag, "scope": "script"}),
                );
                return Outcome::TerminalDone { code: done_tag };
            }

            (observe.emit)(
                autoscript_types::EVT_OPERATION_ERROR,
                json!({"operationId": op.id, "attempt": attempt, "code": code, "message": message}),
            );

            let recovery_outcome = run_recovery(self.checkpoint.as_ref(), profile_id, &op.checkpoint).await;
            (observe.emit)(
                autoscript_types::EVT_RECOVERY_ACTION,
                json!({"operationId": op.id, "code": recovery_outcome.code()}),
            );
            if matches!(recovery_outcome, crate::recovery::RecoveryOutcome::Done { .. }) {
                (observe.emit)(
                    autoscript_types::EVT_OPERATION_RECOVERED,
                    json!({"operationId": op.id}),
                );
            } else if matches!(recovery_outcome, crate::recovery::RecoveryOutcome::Exhausted) {
                (observe.emit)(
                    autoscript_types::EVT_OPERATION_RECOVERY_FAILED,
                    json!({"operationId": op.id}),
                );
            }

            if attempt < max_attempts {
                if op.retry.backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(op.retry.backoff_ms)).await;
                }
                continue;
            }

            let scope = impact.apply_failure(op, event);
            if scope == FailureScope::None {
                (observe.emit)(
                    autoscript_types::EVT_OPERATION_SKIPPED,
                    json!({"operationId": op.id, "code": "OPERATION_SKIPPED_ON_FAILURE_CONTINUE"}),
                );
            } else {
                (observe.emit)(
                    autoscript_types::EVT_IMPACT,
                    json!({"operationId": op.id, "scope": format!("{scope:?}")}),
                );
            }
            return Outcome::Failed { scope };
        }

        unreachable!("attempt loop always returns before exhausting max_attempts")
    }

    async fn pacing_wait(&self, op: &Operation, runtime: &RuntimeContext, now_ms: &impl Fn() -> i64) {
        if NAVIGATION_ACTIONS.contains(&op.action.as_str()) && op.pacing.navigation_min_interval_ms > 0 {
            if let Some(last) = runtime.last_navigation_at {
                let elapsed = now_ms().saturating_sub(last).max(0) as u64;
                if elapsed < op.pacing.navigation_min_interval_ms {
                    tokio::time::sleep(Duration::from_millis(op.pacing.navigation_min_interval_ms - elapsed)).await;
                }
            }
        }
        if op.pacing.jitter_ms > 0 {
            let jitter = (rand::random::<f64>() * (op.pacing.jitter_ms + 1) as f64).floor() as u64;
            if jitter > 0 {
                tokio::time::sleep(Duration::from_millis(jitter)).await;
            }
        }
    }

    async fn execute_attempt(
        &self,
        profile_id: &str,
        op: &Operation,
        context: &ExecutionContext,
        timeout_ms: u64,
    ) -> ExecutorOutcome {
        if let Some(hook) = &self.mock_hook {
            if let Some(outcome) = hook(op, context) {
                return outcome;
            }
        }

        if !self.skip_validation {
            if let (Some(validator), Some(spec)) = (&self.validator, &op.validation) {
                let pre = validator
                    .validate_operation(profile_id, spec, ValidationPhase::Pre, context)
                    .await;
                if !pre.ok {
                    return ExecutorOutcome {
                        ok: false,
                        code: Some(pre.code.unwrap_or_else(|| "VALIDATION_FAILED".to_string())),
                        message: pre.message,
                        data: json!({"phase": "pre"}),
                    };
                }
            }
        }

        let run_call = self.executor.execute_operation(profile_id, op, context);
        let outcome = if timeout_ms == 0 {
            run_call.await
        } else {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), run_call).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => return ExecutorOutcome::failure("OPERATION_TIMEOUT", "operation timed out"),
            }
        };

        if !outcome.ok {
            return outcome;
        }

        if !self.skip_validation {
            if let (Some(validator), Some(spec)) = (&self.validator, &op.validation) {
                let post = validator
                    .validate_operation(profile_id, spec, ValidationPhase::Post, context)
                    .await;
                if !post.ok {
                    return ExecutorOutcome {
                        ok: false,
                        code: Some(post.code.unwrap_or_else(|| "VALIDATION_FAILED".to_string())),
                        message: post.message,
                        data: json!({"phase": "post"}),
                    };
                }
            }
        }

        outcome
    }
}

fn is_stale_trigger(op: &Operation, event: &WatcherEvent, subscription_states: &SubscriptionStateStore) -> bool {
    let Trigger::SubscriptionEvent { subscription_id, event: kind } = &op.trigger else {
        return false;
    };
    let _ = event;
    let state = subscription_states.get(subscription_id);
    match kind {
        SubscriptionEventKind::Exist | SubscriptionEventKind::Appear => !state.exists,
        SubscriptionEventKind::Disappear => state.exists,
        SubscriptionEventKind::Change => false,
    }
}

fn effective_timeout(op: &Operation, script: &Script) -> u64 {
    if op.disable_timeout {
        return 0;
    }
    if let Some(explicit) = op.timeout_ms {
        if explicit > 0 {
            return explicit;
        }
    }
    if script.defaults.disable_timeout && op.timeout_ms.is_none() {
        return 0;
    }
    if op.pacing.timeout_ms > 0 {
        return op.pacing.timeout_ms;
    }
    per_action_default_timeout(op)
}

fn per_action_default_timeout(op: &Operation) -> u64 {
    if op.action == "wait" {
        let ms = op.params.get("ms").and_then(Value::as_u64).unwrap_or(0);
        return 30_000u64.max(ms + 5_000);
    }
    if TIMEOUT_45S_ACTIONS.contains(&op.action.as_str()) || is_verification_action(&op.action) {
        return 45_000;
    }
    if TIMEOUT_30S_ACTIONS.contains(&op.action.as_str()) || is_scroll_action(&op.action) {
        return 30_000;
    }
    20_000
}

fn terminal_done_code(code: &str, message: &str) -> Option<String> {
    let re = Regex::new(r"AUTOSCRIPT_DONE_[A-Z_]+").expect("static regex is valid");
    re.find(code)
        .or_else(|| re.find(message))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_action_timeout_is_ms_plus_5s_floored_at_30s() {
        let mut op = sample_op("wait");
        op.params = json!({"ms": 40_000});
        let script = Script {
            name: "s".into(),
            version: "1".into(),
            profile_id: "p".into(),
            throttle: 250,
            defaults: Default::default(),
            subscriptions: vec![],
            operations: vec![],
        };
        assert_eq!(effective_timeout(&op, &script), 45_000);
    }

    #[test]
    fn disable_timeout_on_op_wins_over_everything() {
        let mut op = sample_op("click");
        op.disable_timeout = true;
        op.pacing.timeout_ms = 99_000;
        let script = Script {
            name: "s".into(),
            version: "1".into(),
            profile_id: "p".into(),
            throttle: 250,
            defaults: Default::default(),
            subscriptions: vec![],
            operations: vec![],
        };
        assert_eq!(effective_timeout(&op, &script), 0);
    }

    #[test]
    fn terminal_done_code_matches_regex_in_code_field() {
        assert_eq!(
            terminal_done_code("AUTOSCRIPT_DONE_OK", ""),
            Some("AUTOSCRIPT_DONE_OK".to_string())
        );
        assert_eq!(terminal_done_code("OPERATION_FAILED", "nope"), None);
    }

    fn sample_op(action: &str) -> Operation {
        Operation {
            id: "a".into(),
            enabled: true,
            action: action.to_string(),
            params: Value::Null,
            trigger: Trigger::Startup,
            depends_on: vec![],
            conditions: vec![],
            retry: Default::default(),
            impact: Default::default(),
            on_failure: Default::default(),
            pacing: Default::default(),
            timeout_ms: None,
            disable_timeout: false,
            validation: None,
            checkpoint: Default::default(),
            once: true,
            once_per_appear: false,
        }
    }
}
