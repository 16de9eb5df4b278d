use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::{OperationState, RunnerFlags, RuntimeContext, ScheduleState, SubscriptionState};

pub const SNAPSHOT_KIND: &str = "autoscript_snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotState {
    pub state: RunnerFlags,
    #[serde(rename = "subscriptionState")]
    pub subscription_state: HashMap<String, SubscriptionState>,
    #[serde(rename = "operationState")]
    pub operation_state: HashMap<String, OperationState>,
    #[serde(rename = "operationScheduleState")]
    pub operation_schedule_state: HashMap<String, ScheduleState>,
    #[serde(rename = "runtimeContext")]
    pub runtime_context: RuntimeContext,
    #[serde(rename = "lastNavigationAt")]
    pub last_navigation_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub kind: String,
    pub version: u32,
    pub reason: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "profileId")]
    pub profile_id: String,
    #[serde(rename = "scriptName")]
    pub script_name: String,
    pub state: SnapshotState,
}

impl SnapshotEnvelope {
    /// `false` if `kind`/`version` don't match what this crate produces — the
    /// runner refuses to restore from a snapshot shaped by something else.
    pub fn is_compatible(&self) -> bool {
        self.kind == SNAPSHOT_KIND && self.version == SNAPSHOT_VERSION
    }
}
