use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::trigger::{SubscriptionEventKind, Trigger};

/// The blocking radius the impact engine applies when an operation exhausts its
/// retries without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactScope {
    Op,
    Subscription,
    Script,
}

impl Default for ImpactScope {
    fn default() -> Self {
        ImpactScope::Op
    }
}

/// What a failed operation asks the runner to do once its retries (and any
/// recovery attempts) are spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    ChainStop,
    Continue,
    StopAll,
}

impl Default for OnFailure {
    fn default() -> Self {
        OnFailure::ChainStop
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(rename = "backoffMs")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingPolicy {
    #[serde(rename = "operationMinIntervalMs")]
    pub operation_min_interval_ms: u64,
    #[serde(rename = "eventCooldownMs")]
    pub event_cooldown_ms: u64,
    #[serde(rename = "jitterMs")]
    pub jitter_ms: u64,
    #[serde(rename = "navigationMinIntervalMs")]
    pub navigation_min_interval_ms: u64,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoverySpec {
    pub attempts: u32,
    #[serde(default)]
    pub actions: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSpec {
    #[serde(rename = "containerId")]
    pub container_id: Option<String>,
    #[serde(rename = "targetCheckpoint")]
    pub target_checkpoint: Option<String>,
    #[serde(default)]
    pub recovery: RecoverySpec,
}

/// Opaque pre/post validation spec, forwarded verbatim to the external validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSpec(pub Value);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptDefaults {
    pub retry: RetryPolicy,
    pub impact: ImpactScope,
    #[serde(rename = "onFailure")]
    pub on_failure: OnFailure,
    #[serde(rename = "validationMode")]
    pub validation_mode: String,
    pub recovery: RecoverySpec,
    pub pacing: PacingPolicy,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
    #[serde(rename = "disableTimeout")]
    pub disable_timeout: bool,
}

impl Default for ScriptDefaults {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            impact: ImpactScope::default(),
            on_failure: OnFailure::default(),
            validation_mode: "standard".to_string(),
            recovery: RecoverySpec::default(),
            pacing: PacingPolicy::default(),
            timeout_ms: 0,
            disable_timeout: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub selector: String,
    pub visible: bool,
    #[serde(rename = "pageUrlIncludes")]
    pub page_url_includes: Vec<String>,
    #[serde(rename = "pageUrlExcludes")]
    pub page_url_excludes: Vec<String>,
    pub events: Vec<SubscriptionEventKind>,
    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,
    pub retry: RetryPolicy,
    pub impact: ImpactScope,
}

#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: String,
    pub enabled: bool,
    pub action: String,
    pub params: Value,
    pub trigger: Trigger,
    #[serde(rename = "dependsOn")]
    pub depends_on: Vec<String>,
    pub conditions: Vec<Condition>,
    pub retry: RetryPolicy,
    pub impact: ImpactScope,
    #[serde(rename = "onFailure")]
    pub on_failure: OnFailure,
    pub pacing: PacingPolicy,
    /// Explicit per-operation override; `None` means "fall through to script
    /// defaults / per-action default", matching the resolution order in §4.5.
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    #[serde(rename = "disableTimeout")]
    pub disable_timeout: bool,
    pub validation: Option<ValidationSpec>,
    pub checkpoint: CheckpointSpec,
    pub once: bool,
    #[serde(rename = "oncePerAppear")]
    pub once_per_appear: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Script {
    pub name: String,
    pub version: String,
    #[serde(rename = "profileId")]
    pub profile_id: String,
    pub throttle: u64,
    pub defaults: ScriptDefaults,
    pub subscriptions: Vec<Subscription>,
    pub operations: Vec<Operation>,
}

impl Script {
    pub fn subscription(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.id == id)
    }
}
