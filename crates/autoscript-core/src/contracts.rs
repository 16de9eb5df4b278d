//! External collaborator contracts (§6). This crate owns the scheduler and
//! executor *wrapper*; the actual DOM watcher, action execution, validation
//! and checkpoint capture/restore are opaque to it and plugged in through
//! these traits, the way `tandem-core`'s `ProviderRegistry`/`ToolRegistry`
//! sit behind trait objects the engine loop calls through without knowing
//! which concrete provider or tool answered.

use std::sync::Arc;

use async_trait::async_trait;
use autoscript_types::{Operation, RuntimeContext, ValidationSpec, WatcherEvent};
use serde_json::Value;

/// Validation phase an operation is checked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    Pre,
    Post,
}

/// Outcome of an `executeOperation` or `executeExternalOperation` call. A
/// non-boolean `ok` from a malformed external result is never represented
/// here — callers that get something they can't parse construct this with
/// `ExecutorOutcome::malformed()` instead, per §7's propagation policy.
#[derive(Debug, Clone)]
pub struct ExecutorOutcome {
    pub ok: bool,
    pub code: Option<String>,
    pub message: Option<String>,
    pub data: Value,
}

impl ExecutorOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            code: None,
            message: None,
            data,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            code: Some(code.into()),
            message: Some(message.into()),
            data: Value::Null,
        }
    }

    /// Converts a malformed/opaque external result into the canonical
    /// `OPERATION_FAILED` outcome rather than crashing the runner.
    pub fn malformed() -> Self {
        Self::failure("OPERATION_FAILED", "executor returned a malformed result")
    }
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub code: Option<String>,
    pub message: Option<String>,
    pub data: Value,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            ok: true,
            code: None,
            message: None,
            data: Value::Null,
        }
    }

    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            code: Some(code.into()),
            message: Some(message.into()),
            data: Value::Null,
        }
    }
}

/// Everything the executor contract hands to an operation attempt.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub event: WatcherEvent,
    pub attempt: u32,
    pub max_attempts: u32,
    pub runtime: RuntimeContext,
}

/// A recursive call an action can make back into the runner's own executor
/// (e.g. a composite action that runs a sub-operation). Out of scope beyond
/// its contract shape; this crate never calls it itself.
#[async_trait]
pub trait ExternalOperationExecutor: Send + Sync {
    async fn execute_external_operation(
        &self,
        operation: &Operation,
        context: &ExecutionContext,
    ) -> ExecutorOutcome;
}

/// §6 "Executor contract".
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute_operation(
        &self,
        profile_id: &str,
        operation: &Operation,
        context: &ExecutionContext,
    ) -> ExecutorOutcome;
}

/// §6 "Validator contract". Skipped entirely when `skipValidation` is set on
/// the runner.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate_operation(
        &self,
        profile_id: &str,
        spec: &ValidationSpec,
        phase: ValidationPhase,
        context: &ExecutionContext,
    ) -> ValidationOutcome;
}

/// §6 "Checkpoint contract". Invoked only from recovery.
#[async_trait]
pub trait Checkpoint: Send + Sync {
    async fn capture_checkpoint(&self, profile_id: &str, container_id: Option<&str>) -> Value;

    async fn restore_checkpoint(
        &self,
        profile_id: &str,
        baseline: &Value,
        action: &Value,
        target_checkpoint: Option<&str>,
        container_id: Option<&str>,
    ) -> ExecutorOutcome;
}

/// A stopped watch subscription. `stop()` is called at most once by the
/// runner; implementations should tolerate being dropped without it being
/// called (process exit).
pub trait WatchHandle: Send + Sync {
    fn stop(&self);
}

/// §6 "Watcher contract". `on_event`/`on_error` are invoked from whatever
/// task the watcher implementation drives; the runner itself does the
/// re-entry onto its own serialized queue.
#[async_trait]
pub trait Watcher: Send + Sync {
    async fn watch_subscriptions(
        &self,
        profile_id: &str,
        subscriptions: &[autoscript_types::Subscription],
        throttle_ms: u64,
        on_event: Arc<dyn Fn(WatcherEvent) + Send + Sync>,
        on_error: Arc<dyn Fn(String) + Send + Sync>,
    ) -> Box<dyn WatchHandle>;
}
