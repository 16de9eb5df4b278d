//! Structured logging for the autoscript runtime.
//!
//! Every mandatory observation name from the runner's outward contract is
//! routed through [`notify`], which always emits a `tracing` line and, if an
//! [`Observer`] is attached, also hands it a typed [`Observation`] — the same
//! split the rest of this codebase uses between a log sink nobody programs
//! against and a callback embedders can assert on.

use std::sync::Mutex;

use autoscript_types::{Observation, EVT_OPERATION_ERROR, EVT_OPERATION_TERMINAL, EVT_WATCH_ERROR};

/// Receives every observation the runner emits, in order. Implementations must
/// not block for long; the runner calls this synchronously from its own task.
pub trait Observer: Send + Sync {
    fn notify(&self, observation: &Observation);
}

/// The default observer: discards everything. `tracing` still sees every event
/// regardless of which `Observer` is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn notify(&self, _observation: &Observation) {}
}

/// Appends every observation it sees, for assertions in tests. Exported (not
/// `#[cfg(test)]`-gated) so integration tests outside this crate can use it.
#[derive(Default)]
pub struct RecordingObserver {
    observations: Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.observations
            .lock()
            .expect("observation log poisoned")
            .iter()
            .map(|o| o.event)
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Observation> {
        self.observations
            .lock()
            .expect("observation log poisoned")
            .clone()
    }
}

impl Observer for RecordingObserver {
    fn notify(&self, observation: &Observation) {
        self.observations
            .lock()
            .expect("observation log poisoned")
            .push(observation.clone());
    }
}

/// Emits `observation` as a structured `tracing` line, at a level chosen per
/// event name: operation errors and watch errors log at `WARN`; a
/// script-scoped terminal observation logs at `ERROR`; everything else at
/// `INFO`.
pub fn notify_tracing(observation: &Observation) {
    let is_script_terminal = observation.event == EVT_OPERATION_TERMINAL
        && observation
            .payload
            .get("scope")
            .and_then(|v| v.as_str())
            == Some("script");

    if is_script_terminal {
        tracing::error!(
            target: "autoscript",
            run_id = %observation.run_id,
            profile_id = %observation.profile_id,
            event = observation.event,
            payload = %observation.payload,
            "autoscript_observation"
        );
    } else if observation.event == EVT_OPERATION_ERROR || observation.event == EVT_WATCH_ERROR {
        tracing::warn!(
            target: "autoscript",
            run_id = %observation.run_id,
            profile_id = %observation.profile_id,
            event = observation.event,
            payload = %observation.payload,
            "autoscript_observation"
        );
    } else {
        tracing::info!(
            target: "autoscript",
            run_id = %observation.run_id,
            profile_id = %observation.profile_id,
            event = observation.event,
            payload = %observation.payload,
            "autoscript_observation"
        );
    }
}

/// Initializes the global `tracing` subscriber for console output. Idempotent:
/// a second call is a no-op rather than a panic, so tests and the CLI can both
/// call it freely.
pub fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscript_types::EVT_START;
    use serde_json::json;

    fn sample(event: &'static str, payload: serde_json::Value) -> Observation {
        Observation {
            run_id: "run-1".to_string(),
            profile_id: "profile-1".to_string(),
            event,
            ts: 0,
            payload,
        }
    }

    #[test]
    fn recording_observer_preserves_order() {
        let observer = RecordingObserver::new();
        observer.notify(&sample(EVT_START, json!({})));
        observer.notify(&sample(EVT_OPERATION_ERROR, json!({"code": "x"})));
        assert_eq!(observer.events(), vec![EVT_START, EVT_OPERATION_ERROR]);
    }

    #[test]
    fn null_observer_drops_everything() {
        let observer = NullObserver;
        observer.notify(&sample(EVT_START, json!({})));
    }
}
