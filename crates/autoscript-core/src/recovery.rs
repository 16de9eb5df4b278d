//! Recovery passes (§4.6), run by the executor between a failed attempt and
//! its retry. Recovery never changes operation status by itself; it is
//! purely a side-effecting attempt to put the page back into a runnable
//! state before the next attempt.

use std::sync::Arc;

use autoscript_types::CheckpointSpec;
use serde_json::Value;

use crate::contracts::Checkpoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    NotConfigured,
    Done { attempts: u32 },
    Exhausted,
}

impl RecoveryOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryOutcome::NotConfigured => "RECOVERY_NOT_CONFIGURED",
            RecoveryOutcome::Done { .. } => "RECOVERY_DONE",
            RecoveryOutcome::Exhausted => "RECOVERY_EXHAUSTED",
        }
    }
}

pub async fn run_recovery(checkpoint: Option<&Arc<dyn Checkpoint>>, profile_id: &str, spec: &CheckpointSpec) -> RecoveryOutcome {
    if spec.recovery.attempts == 0 || spec.recovery.actions.is_empty() {
        return RecoveryOutcome::NotConfigured;
    }
    let Some(checkpoint) = checkpoint else {
        return RecoveryOutcome::NotConfigured;
    };

    let baseline: Value = checkpoint
        .capture_checkpoint(profile_id, spec.container_id.as_deref())
        .await;

    for attempt in 1..=spec.recovery.attempts {
        let mut pass_ok = true;
        for action in &spec.recovery.actions {
            let outcome = checkpoint
                .restore_checkpoint(
                    profile_id,
                    &baseline,
                    action,
                    spec.target_checkpoint.as_deref(),
                    spec.container_id.as_deref(),
                )
                .await;
            if !outcome.ok {
                pass_ok = false;
                break;
            }
        }
        if pass_ok {
            return RecoveryOutcome::Done { attempts: attempt };
        }
    }
    RecoveryOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ExecutorOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysOkCheckpoint;

    #[async_trait]
    impl Checkpoint for AlwaysOkCheckpoint {
        async fn capture_checkpoint(&self, _profile_id: &str, _container_id: Option<&str>) -> Value {
            Value::Null
        }

        async fn restore_checkpoint(
            &self,
            _profile_id: &str,
            _baseline: &Value,
            _action: &Value,
            _target_checkpoint: Option<&str>,
            _container_id: Option<&str>,
        ) -> ExecutorOutcome {
            ExecutorOutcome::success(Value::Null)
        }
    }

    struct FailNTimesCheckpoint {
        remaining_failures: AtomicUsize,
    }

    #[async_trait]
    impl Checkpoint for FailNTimesCheckpoint {
        async fn capture_checkpoint(&self, _profile_id: &str, _container_id: Option<&str>) -> Value {
            Value::Null
        }

        async fn restore_checkpoint(
            &self,
            _profile_id: &str,
            _baseline: &Value,
            _action: &Value,
            _target_checkpoint: Option<&str>,
            _container_id: Option<&str>,
        ) -> ExecutorOutcome {
            if self.remaining_failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                ExecutorOutcome::failure("RESTORE_FAILED", "nope")
            } else {
                ExecutorOutcome::success(Value::Null)
            }
        }
    }

    fn spec_with(attempts: u32, actions: usize) -> CheckpointSpec {
        CheckpointSpec {
            container_id: None,
            target_checkpoint: None,
            recovery: autoscript_types::RecoverySpec {
                attempts,
                actions: vec![Value::Null; actions],
            },
        }
    }

    #[tokio::test]
    async fn not_configured_without_attempts_or_actions() {
        let checkpoint: Arc<dyn Checkpoint> = Arc::new(AlwaysOkCheckpoint);
        let outcome = run_recovery(Some(&checkpoint), "p", &spec_with(0, 0)).await;
        assert_eq!(outcome, RecoveryOutcome::NotConfigured);
    }

    #[tokio::test]
    async fn done_when_a_pass_fully_succeeds() {
        let checkpoint: Arc<dyn Checkpoint> = Arc::new(AlwaysOkCheckpoint);
        let outcome = run_recovery(Some(&checkpoint), "p", &spec_with(2, 1)).await;
        assert_eq!(outcome, RecoveryOutcome::Done { attempts: 1 });
    }

    #[tokio::test]
    async fn exhausted_after_every_pass_fails() {
        let checkpoint: Arc<dyn Checkpoint> = Arc::new(FailNTimesCheckpoint {
            remaining_failures: AtomicUsize::new(10),
        });
        let outcome = run_recovery(Some(&checkpoint), "p", &spec_with(2, 1)).await;
        assert_eq!(outcome, RecoveryOutcome::Exhausted);
    }
}
