use serde::Serialize;
use serde_json::Value;

/// The mandatory observation names from §6 — the testable outward contract of
/// the runner. Kept as `&'static str` constants rather than an enum so a future
/// action provider can emit an event name this crate doesn't know about yet
/// without the type system rejecting it.
pub const EVT_START: &str = "autoscript:start";
pub const EVT_STOP: &str = "autoscript:stop";
pub const EVT_EVENT: &str = "autoscript:event";
pub const EVT_WATCH_ERROR: &str = "autoscript:watch_error";
pub const EVT_OPERATION_START: &str = "autoscript:operation_start";
pub const EVT_OPERATION_DONE: &str = "autoscript:operation_done";
pub const EVT_OPERATION_ERROR: &str = "autoscript:operation_error";
pub const EVT_OPERATION_SKIPPED: &str = "autoscript:operation_skipped";
pub const EVT_OPERATION_TERMINAL: &str = "autoscript:operation_terminal";
pub const EVT_OPERATION_RECOVERED: &str = "autoscript:operation_recovered";
pub const EVT_OPERATION_RECOVERY_FAILED: &str = "autoscript:operation_recovery_failed";
pub const EVT_IMPACT: &str = "autoscript:impact";
pub const EVT_PACING_WAIT: &str = "autoscript:pacing_wait";
pub const EVT_RECOVERY_ACTION: &str = "autoscript:recovery_action";

/// One structured record of a runner lifecycle event. Emitted to `tracing` and,
/// if attached, to the runner's `Observer`.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "profileId")]
    pub profile_id: String,
    pub event: &'static str,
    pub ts: i64,
    #[serde(flatten)]
    pub payload: Value,
}
