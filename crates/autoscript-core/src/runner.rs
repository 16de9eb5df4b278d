//! Runner lifecycle and event fan-in (§4.7). The composition root: owns every
//! mutable store for the run, wires the mock feed or external watcher, and
//! drives events through the scheduler and executor. Modeled on
//! `tandem-core::EngineLoop` (a `Clone` handle over `Arc`/lock-guarded
//! collaborators, constructed once and handed to whatever drives events in).

use std::sync::Arc;

use autoscript_observability::Observer;
use autoscript_types::{
    Observation, RunnerFlags, RuntimeContext, Script, SnapshotEnvelope, SnapshotState,
    SubscriptionEventKind, WatcherEvent, EVT_EVENT, EVT_START, EVT_STOP, EVT_WATCH_ERROR,
    SNAPSHOT_KIND, SNAPSHOT_VERSION,
};
use serde_json::Value;
use tokio::sync::{watch, Mutex};

use crate::config::RunnerConfig;
use crate::contracts::{WatchHandle, Watcher};
use crate::error::RunnerError;
use crate::executor::{Observe, OperationExecutor, Outcome};
use crate::impact::{FailureScope, ImpactEngine};
use crate::operation_state::OperationStateStore;
use crate::queue::OperationQueue;
use crate::schedule_state::ScheduleStateStore;
use crate::scheduler::Scheduler;
use crate::subscription_state::SubscriptionStateStore;
use crate::validator::validate;

/// One event from the JSON mock feed (§6 "Mock event feed").
#[derive(Debug, Clone)]
pub struct MockEvent {
    pub kind: String,
    pub subscription_id: Option<String>,
    pub selector: Option<String>,
    pub count: Option<u64>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DoneResult {
    pub run_id: String,
    pub reason: String,
    pub started_at: i64,
    pub stopped_at: i64,
}

enum EventSource {
    Mock {
        events: Vec<MockEvent>,
        drain_on_exhaustion: bool,
    },
    Watcher(Arc<dyn Watcher>),
}

struct RunnerState {
    script: Script,
    scheduler: Scheduler,
    subscription_states: SubscriptionStateStore,
    operation_states: OperationStateStore,
    schedule_states: ScheduleStateStore,
    impact: ImpactEngine,
    runtime_context: RuntimeContext,
    flags: RunnerFlags,
}

/// Every mutation to runner state happens inside a closure chained onto
/// `queue`, so even though `state` is guarded by an async `Mutex` (reachable
/// from the mock-feed task and from watcher callbacks), at most one event is
/// ever being processed at a time — the single-threaded cooperative model
/// §5 requires.
pub struct Runner {
    state: Arc<Mutex<RunnerState>>,
    queue: OperationQueue,
    executor: Arc<OperationExecutor>,
    observer: Arc<dyn Observer>,
    config: RunnerConfig,
    run_id: Arc<Mutex<Option<String>>>,
    watch_handle: Arc<Mutex<Option<Box<dyn WatchHandle>>>>,
    done_tx: Arc<watch::Sender<Option<DoneResult>>>,
    done_rx: watch::Receiver<Option<DoneResult>>,
    source: Arc<std::sync::Mutex<Option<EventSource>>>,
}

impl Runner {
    /// Refuses to construct over a script that fails static validation
    /// (`RunnerError::ValidationFailed`).
    pub fn new(
        script: Script,
        config: RunnerConfig,
        executor: Arc<OperationExecutor>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, RunnerError> {
        let report = validate(&script);
        if !report.ok {
            return Err(RunnerError::ValidationFailed(report.errors));
        }

        let state = RunnerState {
            script,
            scheduler: Scheduler::new(),
            subscription_states: SubscriptionStateStore::new(),
            operation_states: OperationStateStore::new(),
            schedule_states: ScheduleStateStore::new(),
            impact: ImpactEngine::new(),
            runtime_context: RuntimeContext::default(),
            flags: RunnerFlags::default(),
        };

        let (done_tx, done_rx) = watch::channel(None);

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            queue: OperationQueue::new(),
            executor,
            observer,
            config,
            run_id: Arc::new(Mutex::new(None)),
            watch_handle: Arc::new(Mutex::new(None)),
            done_tx: Arc::new(done_tx),
            done_rx,
            source: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    pub fn with_mock_feed(self, events: Vec<MockEvent>, drain_on_exhaustion: bool) -> Self {
        *self.source.lock().expect("source mutex poisoned") = Some(EventSource::Mock {
            events,
            drain_on_exhaustion,
        });
        self
    }

    pub fn with_watcher(self, watcher: Arc<dyn Watcher>) -> Self {
        *self.source.lock().expect("source mutex poisoned") = Some(EventSource::Watcher(watcher));
        self
    }

    /// Requires a non-empty `profileId`; fails if the runner is already
    /// active.
    pub async fn start(
        &self,
        now_ms: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Result<String, RunnerError> {
        let start_ts = now_ms();
        {
            let mut state = self.state.lock().await;
            if state.flags.active {
                return Err(RunnerError::AlreadyActive);
            }
            if state.script.profile_id.is_empty() {
                return Err(RunnerError::MissingProfileId);
            }
            state.flags.active = true;
            state.flags.started_at = Some(start_ts);
        }

        let run_id = format!("run-{start_ts}");
        *self.run_id.lock().await = Some(run_id.clone());

        self.emit(&run_id, EVT_START, Value::Null).await;

        // Enqueue the startup event before spawning the feed/watcher task so
        // an empty mock feed with `drain_on_exhaustion` can't race its way to
        // `stop()` ahead of this push.
        self.handle_event(&run_id, WatcherEvent::Startup { timestamp_ms: start_ts })
            .await;

        let source = self.source.lock().expect("source mutex poisoned").take();
        match source {
            Some(EventSource::Mock {
                events,
                drain_on_exhaustion,
            }) => {
                self.spawn_mock_feed(run_id.clone(), events, drain_on_exhaustion, now_ms);
            }
            Some(EventSource::Watcher(watcher)) => {
                self.spawn_watcher(run_id.clone(), watcher).await;
            }
            None => {}
        }

        Ok(run_id)
    }

    fn spawn_mock_feed(
        &self,
        run_id: String,
        events: Vec<MockEvent>,
        drain_on_exhaustion: bool,
        now_ms: impl Fn() -> i64 + Send + Sync + 'static,
    ) {
        let this = self.clone_handle();
        let base_delay = self.config.mock_feed_base_delay_ms;
        tokio::spawn(async move {
            for event in events {
                if !this.is_active().await {
                    return;
                }
                let delay = event.delay_ms.unwrap_or(base_delay);
                if delay > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
                match mock_event_to_watcher_event(&event, now_ms()) {
                    Some(watcher_event) => this.handle_event(&run_id, watcher_event).await,
                    None => {
                        this.emit(
                            &run_id,
                            EVT_WATCH_ERROR,
                            serde_json::json!({"code": "MOCK_EVENT_FEED_FAILED"}),
                        )
                        .await
                    }
                }
            }
            if drain_on_exhaustion {
                this.queue.drain().await;
                this.stop(&run_id, "mock_events_exhausted", now_ms()).await;
            }
        });
    }

    async fn spawn_watcher(&self, run_id: String, watcher: Arc<dyn Watcher>) {
        let (subscriptions, throttle, profile_id) = {
            let state = self.state.lock().await;
            (
                state.script.subscriptions.clone(),
                state.script.throttle,
                state.script.profile_id.clone(),
            )
        };

        let this_event = self.clone_handle();
        let run_id_event = run_id.clone();
        let on_event = Arc::new(move |event: WatcherEvent| {
            let this_event = this_event.clone_handle();
            let run_id_event = run_id_event.clone();
            tokio::spawn(async move {
                this_event.handle_event(&run_id_event, event).await;
            });
        });

        let this_error = self.clone_handle();
        let run_id_error = run_id;
        let on_error = Arc::new(move |message: String| {
            let this_error = this_error.clone_handle();
            let run_id_error = run_id_error.clone();
            tokio::spawn(async move {
                this_error
                    .emit(
                        &run_id_error,
                        EVT_WATCH_ERROR,
                        serde_json::json!({"code": "SUBSCRIPTION_WATCH_FAILED", "message": message}),
                    )
                    .await;
            });
        });

        let handle = watcher
            .watch_subscriptions(&profile_id, &subscriptions, throttle, on_event, on_error)
            .await;
        *self.watch_handle.lock().await = Some(handle);
    }

    /// Pushes the actual event handling onto the serial queue so that, no
    /// matter which task called this (the mock feed, or a watcher callback),
    /// only one event is ever being processed at a time.
    async fn handle_event(&self, run_id: &str, event: WatcherEvent) {
        if !self.is_active().await {
            return;
        }
        let this = self.clone_handle();
        let run_id = run_id.to_string();
        self.queue
            .enqueue(async move {
                this.handle_event_serial(&run_id, event).await;
            })
            .await;
    }

    /// `handleEvent` (§4.7): updates subscription state, runs the
    /// appear-reset, then schedules and executes the resulting cascade to
    /// completion. Only ever runs from inside the operation queue's single
    /// consumer task.
    async fn handle_event_serial(&self, run_id: &str, event: WatcherEvent) {
        if !self.is_active().await {
            return;
        }
        self.emit(run_id, EVT_EVENT, serde_json::json!({"type": event.type_str()}))
            .await;

        let ready = {
            let mut state = self.state.lock().await;
            if let (Some(subscription_id), Some(kind)) = (event.subscription_id(), event.kind()) {
                let count = if let WatcherEvent::Subscription { count, .. } = &event {
                    *count
                } else {
                    None
                };
                state
                    .subscription_states
                    .apply_event(subscription_id, kind, count, event.timestamp_ms());
                if kind == SubscriptionEventKind::Appear {
                    let now = event.timestamp_ms();
                    let RunnerState {
                        script,
                        scheduler,
                        operation_states,
                        ..
                    } = &mut *state;
                    scheduler.reset_on_appear(script, subscription_id, operation_states, now);
                }
            }
            self.scan_ready(&mut state, &event)
        };

        self.run_cascade(run_id, event, ready).await;
    }

    fn scan_ready(&self, state: &mut RunnerState, event: &WatcherEvent) -> Vec<String> {
        let now = event.timestamp_ms();
        let RunnerState {
            script,
            scheduler,
            subscription_states,
            operation_states,
            schedule_states,
            impact,
            ..
        } = state;
        scheduler.schedule_ready_operations(
            script,
            event,
            now,
            subscription_states,
            operation_states,
            schedule_states,
            impact,
        )
    }

    /// Drains `ready`, executing one operation at a time; a successful
    /// operation triggers an immediate rescan whose results are spliced
    /// ahead of the remaining work, matching §4.4's enqueue note ("rescans
    /// using the same event before dequeuing the next operation").
    async fn run_cascade(&self, run_id: &str, event: WatcherEvent, mut ready: Vec<String>) {
        let mut cursor = 0;
        while cursor < ready.len() {
            if !self.is_active().await {
                return;
            }
            let op_id = ready[cursor].clone();
            cursor += 1;

            let op = {
                let state = self.state.lock().await;
                match state.script.operation(&op_id) {
                    Some(op) => op.clone(),
                    None => continue,
                }
            };

            let outcome = self.run_one(run_id, &op, &event).await;

            let mut state = self.state.lock().await;
            state.scheduler.clear_pending(&op_id);
            let now = event.timestamp_ms();

            match outcome {
                Outcome::Done => {
                    state.operation_states.mark_terminal(
                        &op_id,
                        autoscript_types::OperationStatus::Done,
                        None,
                        Value::Null,
                        now,
                    );
                    let completed_appear_count = op
                        .trigger
                        .subscription_id()
                        .map(|id| state.subscription_states.get(id).appear_count);
                    state.schedule_states.update(&op_id, |s| {
                        if let Some(count) = completed_appear_count {
                            s.last_completed_appear_count = Some(count);
                        }
                    });
                    let mut more = {
                        let RunnerState {
                            script,
                            scheduler,
                            subscription_states,
                            operation_states,
                            schedule_states,
                            impact,
                            ..
                        } = &mut *state;
                        scheduler.schedule_ready_operations(
                            script,
                            &event,
                            now,
                            subscription_states,
                            operation_states,
                            schedule_states,
                            impact,
                        )
                    };
                    more.retain(|id| !ready[..cursor].contains(id));
                    for id in more.into_iter().rev() {
                        ready.insert(cursor, id);
                    }
                }
                Outcome::SkippedStaleTrigger | Outcome::SkippedStaleTriggerPreValidation => {
                    state.operation_states.mark_terminal(
                        &op_id,
                        autoscript_types::OperationStatus::Skipped,
                        None,
                        Value::Null,
                        now,
                    );
                }
                Outcome::TerminalDone { code } => {
                    state.operation_states.mark_terminal(
                        &op_id,
                        autoscript_types::OperationStatus::Done,
                        None,
                        serde_json::json!({"terminalDoneCode": code}),
                        now,
                    );
                    drop(state);
                    self.stop(run_id, "script_complete", now).await;
                    return;
                }
                Outcome::Failed { scope } if scope == FailureScope::None => {
                    // onFailure=continue: apply_failure left every blocking
                    // set untouched, so the op is skipped, not failed, and
                    // downstream dependsOn treats it as cleared (§4.3/§4.4).
                    state.operation_states.mark_terminal(
                        &op_id,
                        autoscript_types::OperationStatus::Skipped,
                        None,
                        Value::Null,
                        now,
                    );
                    let mut more = {
                        let RunnerState {
                            script,
                            scheduler,
                            subscription_states,
                            operation_states,
                            schedule_states,
                            impact,
                            ..
                        } = &mut *state;
                        scheduler.schedule_ready_operations(
                            script,
                            &event,
                            now,
                            subscription_states,
                            operation_states,
                            schedule_states,
                            impact,
                        )
                    };
                    more.retain(|id| !ready[..cursor].contains(id));
                    for id in more.into_iter().rev() {
                        ready.insert(cursor, id);
                    }
                }
                Outcome::Failed { scope } => {
                    state.operation_states.mark_terminal(
                        &op_id,
                        autoscript_types::OperationStatus::Failed,
                        Some("operation failed".to_string()),
                        Value::Null,
                        now,
                    );
                    let _ = scope;
                    let script_stopped = state.impact.script_stopped();
                    state.flags.script_stopped = script_stopped;
                    state.flags.blocked_subscriptions = state
                        .impact
                        .blocked_subscriptions()
                        .iter()
                        .cloned()
                        .collect();
                    state.flags.blocked_operations =
                        state.impact.blocked_operations().iter().cloned().collect();
                    drop(state);
                    if script_stopped {
                        self.stop(run_id, "script_failure", now).await;
                        return;
                    }
                }
            }
        }
    }

    async fn run_one(&self, run_id: &str, op: &autoscript_types::Operation, event: &WatcherEvent) -> Outcome {
        let mut state = self.state.lock().await;
        let now = event.timestamp_ms();
        state.schedule_states.update(&op.id, |s| s.last_started_at = Some(now));

        let observer = self.observer.clone();
        let run_id_owned = run_id.to_string();
        let emit_profile_id = state.script.profile_id.clone();
        let mut emit = move |name: &'static str, payload: Value| {
            let observation = Observation {
                run_id: run_id_owned.clone(),
                profile_id: emit_profile_id.clone(),
                event: name,
                ts: 0,
                payload,
            };
            autoscript_observability::notify_tracing(&observation);
            observer.notify(&observation);
        };
        let mut observe = Observe { emit: &mut emit };

        let profile_id = state.script.profile_id.clone();
        let script = state.script.clone();
        let RunnerState {
            runtime_context,
            subscription_states,
            impact,
            ..
        } = &mut *state;

        self.executor
            .run(
                run_id,
                &profile_id,
                &script,
                op,
                event,
                runtime_context,
                subscription_states,
                impact,
                || event.timestamp_ms(),
                &mut observe,
            )
            .await
    }

    /// Idempotent: a second call is a no-op and does not re-resolve the done
    /// future.
    pub async fn stop(&self, run_id: &str, reason: &str, now_ms: i64) {
        let (was_active, started_at) = {
            let mut state = self.state.lock().await;
            let was_active = state.flags.active;
            state.flags.active = false;
            (was_active, state.flags.started_at.unwrap_or(now_ms))
        };
        if !was_active {
            return;
        }
        if let Some(handle) = self.watch_handle.lock().await.take() {
            handle.stop();
        }
        self.emit(run_id, EVT_STOP, serde_json::json!({"reason": reason})).await;

        let result = DoneResult {
            run_id: run_id.to_string(),
            reason: reason.to_string(),
            started_at,
            stopped_at: now_ms,
        };
        let _ = self.done_tx.send(Some(result));
    }

    /// Resolves exactly once, when `stop()` first runs.
    pub async fn wait_done(&self) -> DoneResult {
        let mut rx = self.done_rx.clone();
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                panic!("done channel closed before resolving");
            }
        }
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.flags.active
    }

    pub async fn snapshot(&self, reason: &str, now_ms: i64) -> SnapshotEnvelope {
        let run_id = self.run_id.lock().await.clone().unwrap_or_default();
        let state = self.state.lock().await;
        SnapshotEnvelope {
            kind: SNAPSHOT_KIND.to_string(),
            version: SNAPSHOT_VERSION,
            reason: reason.to_string(),
            created_at: now_ms,
            run_id,
            profile_id: state.script.profile_id.clone(),
            script_name: state.script.name.clone(),
            state: SnapshotState {
                state: state.flags.clone(),
                subscription_state: state.subscription_states.as_map().clone(),
                operation_state: state.operation_states.as_map().clone(),
                operation_schedule_state: state.schedule_states.as_map().clone(),
                runtime_context: state.runtime_context.clone(),
                last_navigation_at: state.runtime_context.last_navigation_at,
            },
        }
    }

    pub async fn restore(&self, envelope: &SnapshotEnvelope) -> Result<(), RunnerError> {
        if !envelope.is_compatible() {
            return Err(RunnerError::SnapshotRestore(format!(
                "unsupported snapshot kind/version: {}/{}",
                envelope.kind, envelope.version
            )));
        }
        let mut state = self.state.lock().await;
        state.flags = envelope.state.state.clone();
        state.subscription_states.restore(envelope.state.subscription_state.clone());
        state.operation_states.restore(envelope.state.operation_state.clone());
        state.schedule_states.restore(envelope.state.operation_schedule_state.clone());
        state.runtime_context = envelope.state.runtime_context.clone();
        state.impact.set_script_stopped(state.flags.script_stopped);
        state
            .impact
            .set_blocked_subscriptions(state.flags.blocked_subscriptions.iter().cloned().collect());
        state
            .impact
            .set_blocked_operations(state.flags.blocked_operations.iter().cloned().collect());
        Ok(())
    }

    async fn emit(&self, run_id: &str, name: &'static str, payload: Value) {
        let profile_id = self.state.lock().await.script.profile_id.clone();
        let observation = Observation {
            run_id: run_id.to_string(),
            profile_id,
            event: name,
            ts: 0,
            payload,
        };
        autoscript_observability::notify_tracing(&observation);
        self.observer.notify(&observation);
    }

    /// Cheap `Arc`-backed clone used to hand a handle to spawned tasks (mock
    /// feed, watcher callbacks) without exposing `Runner` itself as `Clone`
    /// in the public API surface.
    fn clone_handle(&self) -> Self {
        Self {
            state: self.state.clone(),
            queue: self.queue.clone(),
            executor: self.executor.clone(),
            observer: self.observer.clone(),
            config: self.config.clone(),
            run_id: self.run_id.clone(),
            watch_handle: self.watch_handle.clone(),
            done_tx: self.done_tx.clone(),
            done_rx: self.done_rx.clone(),
            source: self.source.clone(),
        }
    }
}

fn mock_event_to_watcher_event(event: &MockEvent, now_ms: i64) -> Option<WatcherEvent> {
    match event.kind.as_str() {
        "startup" => Some(WatcherEvent::Startup { timestamp_ms: now_ms }),
        "manual" => Some(WatcherEvent::Manual { timestamp_ms: now_ms }),
        other => {
            let kind = SubscriptionEventKind::parse(other)?;
            let subscription_id = event.subscription_id.clone()?;
            Some(WatcherEvent::Subscription {
                subscription_id,
                kind,
                selector: event.selector.clone(),
                count: event.count,
                timestamp_ms: now_ms,
            })
        }
    }
}
