use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use autoscript_core::{
    normalize_script, ExecutionContext, Executor, ExecutorOutcome, MockEvent, OperationExecutor,
    Runner, RunnerConfig,
};
use autoscript_observability::{NullObserver, RecordingObserver};
use autoscript_types::{Operation, OperationStatus};
use serde_json::{json, Value};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Mock executor keyed by op id; unlisted ops always succeed.
struct ScriptedExecutor {
    failing: Vec<String>,
    terminal_codes: std::collections::HashMap<String, String>,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute_operation(
        &self,
        _profile_id: &str,
        operation: &Operation,
        _context: &ExecutionContext,
    ) -> ExecutorOutcome {
        if let Some(code) = self.terminal_codes.get(&operation.id) {
            return ExecutorOutcome {
                ok: false,
                code: Some(code.clone()),
                message: None,
                data: Value::Null,
            };
        }
        if self.failing.contains(&operation.id) {
            return ExecutorOutcome::failure("OPERATION_FAILED", "scripted failure");
        }
        ExecutorOutcome::success(Value::Null)
    }
}

fn executor(failing: &[&str], terminal_codes: &[(&str, &str)]) -> Arc<OperationExecutor> {
    Arc::new(OperationExecutor {
        executor: Arc::new(ScriptedExecutor {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            terminal_codes: terminal_codes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }),
        validator: None,
        checkpoint: None,
        mock_hook: None,
        skip_validation: true,
    })
}

#[tokio::test]
async fn startup_triggered_once_op_completes_and_feed_exhaustion_stops_the_run() {
    let script = normalize_script(&json!({
        "profileId": "p1",
        "subscriptions": [{"id": "S", "selector": ".x"}],
        "operations": [{"id": "A", "action": "click", "trigger": "startup", "once": true}]
    }));

    let runner = Runner::new(script, RunnerConfig::default(), executor(&[], &[]), Arc::new(NullObserver))
        .unwrap()
        .with_mock_feed(
            vec![MockEvent {
                kind: "manual".to_string(),
                subscription_id: None,
                selector: None,
                count: None,
                delay_ms: Some(20),
            }],
            true,
        );

    runner.start(now_ms).await.unwrap();
    let done = runner.wait_done().await;
    assert_eq!(done.reason, "mock_events_exhausted");

    let envelope = runner.snapshot(&done.reason, now_ms()).await;
    let a = &envelope.state.operation_state["A"];
    assert_eq!(a.status, OperationStatus::Done);
    assert_eq!(a.runs, 1);
}

#[tokio::test]
async fn appear_triggered_once_per_appear_op_fires_once_per_distinct_appear_count() {
    let script = normalize_script(&json!({
        "profileId": "p1",
        "subscriptions": [{"id": "S", "selector": ".x"}],
        "operations": [{
            "id": "B",
            "action": "click",
            "trigger": "S.appear",
            "once": false,
            "oncePerAppear": true
        }]
    }));

    let runner = Runner::new(script, RunnerConfig::default(), executor(&[], &[]), Arc::new(NullObserver))
        .unwrap()
        .with_mock_feed(
            vec![
                MockEvent { kind: "appear".to_string(), subscription_id: Some("S".to_string()), selector: None, count: Some(1), delay_ms: Some(10) },
                MockEvent { kind: "disappear".to_string(), subscription_id: Some("S".to_string()), selector: None, count: Some(0), delay_ms: Some(10) },
                MockEvent { kind: "appear".to_string(), subscription_id: Some("S".to_string()), selector: None, count: Some(1), delay_ms: Some(10) },
            ],
            true,
        );

    runner.start(now_ms).await.unwrap();
    let done = runner.wait_done().await;

    let envelope = runner.snapshot(&done.reason, now_ms()).await;
    let b = &envelope.state.operation_state["B"];
    assert_eq!(b.runs, 2);
    assert_eq!(b.status, OperationStatus::Done);
    assert_eq!(envelope.state.subscription_state["S"].appear_count, 2);
}

#[tokio::test]
async fn retry_then_exhausted_blocks_the_triggering_subscription() {
    let script = normalize_script(&json!({
        "profileId": "p1",
        "subscriptions": [{"id": "S", "selector": ".x"}],
        "operations": [{
            "id": "C",
            "action": "click",
            "trigger": "S.appear",
            "once": false,
            "retry": {"attempts": 2, "backoffMs": 0},
            "impact": "subscription"
        }]
    }));

    let runner = Runner::new(script, RunnerConfig::default(), executor(&["C"], &[]), Arc::new(NullObserver))
        .unwrap()
        .with_mock_feed(
            vec![
                MockEvent { kind: "appear".to_string(), subscription_id: Some("S".to_string()), selector: None, count: Some(1), delay_ms: Some(10) },
            ],
            true,
        );

    runner.start(now_ms).await.unwrap();
    let done = runner.wait_done().await;

    let envelope = runner.snapshot(&done.reason, now_ms()).await;
    let c = &envelope.state.operation_state["C"];
    assert_eq!(c.status, OperationStatus::Failed);
    assert_eq!(c.runs, 1);
    assert!(envelope.state.state.blocked_subscriptions.contains(&"S".to_string()));
}

#[tokio::test]
async fn on_failure_continue_skips_the_op_and_unblocks_its_dependents() {
    let script = normalize_script(&json!({
        "profileId": "p1",
        "operations": [
            {
                "id": "G",
                "action": "click",
                "trigger": "startup",
                "once": true,
                "onFailure": "continue"
            },
            {
                "id": "H",
                "action": "click",
                "trigger": "startup",
                "once": true,
                "dependsOn": ["G"]
            }
        ]
    }));

    let runner = Runner::new(script, RunnerConfig::default(), executor(&["G"], &[]), Arc::new(NullObserver))
        .unwrap()
        .with_mock_feed(vec![], true);

    runner.start(now_ms).await.unwrap();
    let done = runner.wait_done().await;

    let envelope = runner.snapshot(&done.reason, now_ms()).await;
    let g = &envelope.state.operation_state["G"];
    let h = &envelope.state.operation_state["H"];
    assert_eq!(g.status, OperationStatus::Skipped);
    assert_eq!(h.status, OperationStatus::Done);
    assert!(envelope.state.state.blocked_operations.is_empty());
    assert!(envelope.state.state.blocked_subscriptions.is_empty());
}

#[tokio::test]
async fn terminal_done_code_stops_the_script_as_done() {
    let script = normalize_script(&json!({
        "profileId": "p1",
        "operations": [{"id": "D", "action": "click", "trigger": "startup", "once": true}]
    }));

    let runner = Runner::new(
        script,
        RunnerConfig::default(),
        executor(&[], &[("D", "AUTOSCRIPT_DONE_OK")]),
        Arc::new(NullObserver),
    )
    .unwrap()
    .with_mock_feed(vec![], false);

    runner.start(now_ms).await.unwrap();
    let done = runner.wait_done().await;

    assert_eq!(done.reason, "script_complete");
    let envelope = runner.snapshot(&done.reason, now_ms()).await;
    let d = &envelope.state.operation_state["D"];
    assert_eq!(d.status, OperationStatus::Done);
    assert_eq!(
        d.result.get("terminalDoneCode").and_then(Value::as_str),
        Some("AUTOSCRIPT_DONE_OK")
    );
}

#[tokio::test]
async fn repeated_exist_events_without_an_intervening_appear_share_a_trigger_key() {
    let script = normalize_script(&json!({
        "profileId": "p1",
        "subscriptions": [{"id": "S", "selector": ".x"}],
        "operations": [{
            "id": "F",
            "action": "click",
            "trigger": "S.exist",
            "once": false,
            "oncePerAppear": false,
            "pacing": {"operationMinIntervalMs": 0}
        }]
    }));

    let runner = Runner::new(script, RunnerConfig::default(), executor(&[], &[]), Arc::new(NullObserver))
        .unwrap()
        .with_mock_feed(
            vec![
                MockEvent { kind: "exist".to_string(), subscription_id: Some("S".to_string()), selector: None, count: Some(1), delay_ms: Some(10) },
                MockEvent { kind: "exist".to_string(), subscription_id: Some("S".to_string()), selector: None, count: Some(1), delay_ms: Some(10) },
            ],
            true,
        );

    runner.start(now_ms).await.unwrap();
    let done = runner.wait_done().await;

    let envelope = runner.snapshot(&done.reason, now_ms()).await;
    assert_eq!(envelope.state.operation_state["F"].runs, 1);
}

#[tokio::test]
async fn recording_observer_sees_the_startup_cascade_in_order() {
    let script = normalize_script(&json!({
        "profileId": "p1",
        "operations": [{"id": "A", "action": "click", "trigger": "startup", "once": true}]
    }));

    let observer = Arc::new(RecordingObserver::new());
    let runner = Runner::new(script, RunnerConfig::default(), executor(&[], &[]), observer.clone())
        .unwrap()
        .with_mock_feed(vec![], true);

    runner.start(now_ms).await.unwrap();
    runner.wait_done().await;

    let events = observer.events();
    assert_eq!(
        events,
        vec![
            autoscript_types::EVT_START,
            autoscript_types::EVT_EVENT,
            autoscript_types::EVT_OPERATION_START,
            autoscript_types::EVT_OPERATION_DONE,
            autoscript_types::EVT_STOP,
        ]
    );
}

