use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub exists: bool,
    #[serde(rename = "appearCount")]
    pub appear_count: u64,
    #[serde(rename = "lastEventAt")]
    pub last_event_at: Option<i64>,
    pub version: u64,
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self {
            exists: false,
            appear_count: 0,
            last_event_at: None,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Done,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationState {
    pub status: OperationStatus,
    pub runs: u64,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub result: Value,
}

impl Default for OperationState {
    fn default() -> Self {
        Self {
            status: OperationStatus::Pending,
            runs: 0,
            last_error: None,
            updated_at: None,
            result: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    #[serde(rename = "lastScheduledAt")]
    pub last_scheduled_at: Option<i64>,
    #[serde(rename = "lastStartedAt")]
    pub last_started_at: Option<i64>,
    #[serde(rename = "lastEventAt")]
    pub last_event_at: Option<i64>,
    #[serde(rename = "lastTriggerKey")]
    pub last_trigger_key: Option<String>,
    #[serde(rename = "lastScheduledAppearCount")]
    pub last_scheduled_appear_count: Option<u64>,
    #[serde(rename = "lastCompletedAppearCount")]
    pub last_completed_appear_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeContext {
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
    #[serde(rename = "tabPool", default)]
    pub tab_pool: Value,
    #[serde(rename = "currentTab", default)]
    pub current_tab: Value,
    /// Mirrored at the top level of a [`crate::snapshot::SnapshotState`] as
    /// well, matching the wire envelope's sibling `lastNavigationAt` field.
    #[serde(rename = "lastNavigationAt", default)]
    pub last_navigation_at: Option<i64>,
}

/// The impact engine's own mutable state, carried inside a snapshot alongside
/// the per-subscription/operation/schedule maps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerFlags {
    pub active: bool,
    #[serde(rename = "startedAt")]
    pub started_at: Option<i64>,
    #[serde(rename = "scriptStopped")]
    pub script_stopped: bool,
    #[serde(rename = "blockedSubscriptions")]
    pub blocked_subscriptions: Vec<String>,
    #[serde(rename = "blockedOperations")]
    pub blocked_operations: Vec<String>,
}
