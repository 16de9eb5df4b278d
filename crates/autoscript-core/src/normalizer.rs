//! Normalizes a raw, arbitrarily-shaped script document into a canonical
//! [`Script`]. Mirrors the `Value`-walking, fill-in-defaults posture
//! `tandem-core`'s config and tool-arg normalization use throughout: no
//! `Deserialize` derive on the raw input, just `.get()`/`.as_str()` chains
//! with clamped fallbacks.

use autoscript_types::{
    CheckpointSpec, Condition, ImpactScope, Operation, OnFailure, PacingPolicy, RecoverySpec,
    RetryPolicy, Script, ScriptDefaults, Subscription, SubscriptionEventKind, Trigger,
    ValidationSpec,
};
use serde_json::{Map, Value};

const CONVENIENCE_PARAM_KEYS: [&str; 6] = ["selector", "url", "text", "script", "ms", "value"];

pub fn normalize_script(raw: &Value) -> Script {
    let name = str_field(raw, "name").unwrap_or_else(|| "unnamed".to_string());
    let version = str_field(raw, "version").unwrap_or_else(|| "1".to_string());
    let profile_id = str_field(raw, "profileId").unwrap_or_default();
    let throttle = clamp_min(u64_field(raw, "throttle").unwrap_or(250), 100);

    let defaults = normalize_defaults(raw.get("defaults"));

    let subscriptions = raw
        .get("subscriptions")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(normalize_subscription).collect())
        .unwrap_or_default();

    let operations = raw
        .get("operations")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(normalize_operation).collect())
        .unwrap_or_default();

    Script {
        name,
        version,
        profile_id,
        throttle,
        defaults,
        subscriptions,
        operations,
    }
}

fn normalize_defaults(raw: Option<&Value>) -> ScriptDefaults {
    let mut defaults = ScriptDefaults::default();
    let Some(raw) = raw else {
        return defaults;
    };

    if let Some(retry) = raw.get("retry") {
        defaults.retry = normalize_retry(retry, defaults.retry);
    }
    if let Some(impact) = raw.get("impact").and_then(Value::as_str) {
        defaults.impact = parse_impact(impact).unwrap_or(defaults.impact);
    }
    if let Some(on_failure) = raw.get("onFailure").and_then(Value::as_str) {
        defaults.on_failure = parse_on_failure(on_failure).unwrap_or(defaults.on_failure);
    }
    if let Some(mode) = str_field(raw, "validationMode") {
        defaults.validation_mode = mode;
    }
    if let Some(recovery) = raw.get("recovery") {
        defaults.recovery = normalize_recovery(recovery);
    }
    if let Some(pacing) = raw.get("pacing") {
        defaults.pacing = normalize_pacing(pacing);
    }
    defaults.timeout_ms = u64_field(raw, "timeoutMs").unwrap_or(defaults.timeout_ms);
    defaults.disable_timeout = bool_field(raw, "disableTimeout").unwrap_or(false);

    defaults
}

fn normalize_subscription(raw: &Value) -> Subscription {
    let events = raw
        .get("events")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .filter_map(SubscriptionEventKind::parse)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let events = if events.is_empty() {
        SubscriptionEventKind::ALL.to_vec()
    } else {
        events
    };

    Subscription {
        id: str_field(raw, "id").unwrap_or_default(),
        selector: str_field(raw, "selector").unwrap_or_default(),
        visible: bool_field(raw, "visible").unwrap_or(true),
        page_url_includes: string_array(raw, "pageUrlIncludes"),
        page_url_excludes: string_array(raw, "pageUrlExcludes"),
        events,
        depends_on: string_array(raw, "dependsOn"),
        retry: raw
            .get("retry")
            .map(|r| normalize_retry(r, RetryPolicy::default()))
            .unwrap_or_default(),
        impact: raw
            .get("impact")
            .and_then(Value::as_str)
            .and_then(parse_impact)
            .unwrap_or_default(),
    }
}

fn normalize_operation(raw: &Value) -> Operation {
    let trigger = str_field(raw, "trigger")
        .map(|t| Trigger::parse(&t))
        .unwrap_or(Trigger::Unknown(String::new()));

    let conditions = raw
        .get("conditions")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|c| serde_json::from_value::<Condition>(c.clone()).ok())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let params_omitted = raw.get("params").is_none();
    let mut params = raw.get("params").cloned().unwrap_or(Value::Null);
    if !matches!(params, Value::Object(_)) {
        params = Value::Object(Map::new());
    }
    if let Value::Object(ref mut map) = params {
        if params_omitted {
            for key in CONVENIENCE_PARAM_KEYS {
                if let Some(v) = raw.get(key) {
                    map.insert(key.to_string(), v.clone());
                }
            }
        }
    }

    Operation {
        id: str_field(raw, "id").unwrap_or_default(),
        enabled: bool_field(raw, "enabled").unwrap_or(true),
        action: str_field(raw, "action").unwrap_or_default(),
        params,
        trigger,
        depends_on: string_array(raw, "dependsOn"),
        conditions,
        retry: raw
            .get("retry")
            .map(|r| normalize_retry(r, RetryPolicy::default()))
            .unwrap_or_default(),
        impact: raw
            .get("impact")
            .and_then(Value::as_str)
            .and_then(parse_impact)
            .unwrap_or_default(),
        on_failure: raw
            .get("onFailure")
            .and_then(Value::as_str)
            .and_then(parse_on_failure)
            .unwrap_or_default(),
        pacing: raw
            .get("pacing")
            .map(normalize_pacing)
            .unwrap_or_default(),
        timeout_ms: u64_field(raw, "timeoutMs"),
        disable_timeout: bool_field(raw, "disableTimeout").unwrap_or(false),
        validation: raw.get("validation").cloned().map(ValidationSpec),
        checkpoint: raw
            .get("checkpoint")
            .map(normalize_checkpoint)
            .unwrap_or_default(),
        once: bool_field(raw, "once").unwrap_or(true),
        once_per_appear: bool_field(raw, "oncePerAppear").unwrap_or(false),
    }
}

fn normalize_retry(raw: &Value, fallback: RetryPolicy) -> RetryPolicy {
    RetryPolicy {
        attempts: clamp_min(
            u64_field(raw, "attempts").unwrap_or(fallback.attempts as u64),
            1,
        ) as u32,
        backoff_ms: clamp_min(
            u64_field(raw, "backoffMs").unwrap_or(fallback.backoff_ms),
            0,
        ),
    }
}

fn normalize_pacing(raw: &Value) -> PacingPolicy {
    PacingPolicy {
        operation_min_interval_ms: clamp_min(u64_field(raw, "operationMinIntervalMs").unwrap_or(0), 0),
        event_cooldown_ms: clamp_min(u64_field(raw, "eventCooldownMs").unwrap_or(0), 0),
        jitter_ms: clamp_min(u64_field(raw, "jitterMs").unwrap_or(0), 0),
        navigation_min_interval_ms: clamp_min(
            u64_field(raw, "navigationMinIntervalMs").unwrap_or(0),
            0,
        ),
        timeout_ms: clamp_min(u64_field(raw, "timeoutMs").unwrap_or(0), 0),
    }
}

fn normalize_recovery(raw: &Value) -> RecoverySpec {
    RecoverySpec {
        attempts: clamp_min(u64_field(raw, "attempts").unwrap_or(0), 0) as u32,
        actions: raw
            .get("actions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

fn normalize_checkpoint(raw: &Value) -> CheckpointSpec {
    CheckpointSpec {
        container_id: str_field(raw, "containerId"),
        target_checkpoint: str_field(raw, "targetCheckpoint"),
        recovery: raw
            .get("recovery")
            .map(normalize_recovery)
            .unwrap_or_default(),
    }
}

fn parse_impact(raw: &str) -> Option<ImpactScope> {
    match raw {
        "op" => Some(ImpactScope::Op),
        "subscription" => Some(ImpactScope::Subscription),
        "script" => Some(ImpactScope::Script),
        _ => None,
    }
}

fn parse_on_failure(raw: &str) -> Option<OnFailure> {
    match raw {
        "chain_stop" => Some(OnFailure::ChainStop),
        "continue" => Some(OnFailure::Continue),
        "stop_all" => Some(OnFailure::StopAll),
        _ => None,
    }
}

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(raw: &Value, key: &str) -> Option<bool> {
    raw.get(key).and_then(Value::as_bool)
}

fn u64_field(raw: &Value, key: &str) -> Option<u64> {
    raw.get(key).and_then(Value::as_f64).and_then(|f| {
        if f.is_finite() && f >= 0.0 {
            Some(f as u64)
        } else {
            None
        }
    })
}

fn string_array(raw: &Value, key: &str) -> Vec<String> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn clamp_min(value: u64, min: u64) -> u64 {
    value.max(min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fills_in_documented_defaults() {
        let script = normalize_script(&json!({
            "name": "demo",
            "profileId": "p1",
            "operations": [{"id": "a", "action": "click", "trigger": "startup"}]
        }));
        let op = &script.operations[0];
        assert!(op.enabled);
        assert!(op.once);
        assert!(!op.once_per_appear);
        assert_eq!(op.trigger, Trigger::Startup);
        assert_eq!(script.throttle, 250);
    }

    #[test]
    fn subscription_events_default_to_all_four() {
        let script = normalize_script(&json!({
            "subscriptions": [{"id": "s", "selector": ".x"}]
        }));
        assert_eq!(script.subscriptions[0].events.len(), 4);
    }

    #[test]
    fn parses_dotted_trigger_strings() {
        let script = normalize_script(&json!({
            "operations": [{"id": "a", "action": "click", "trigger": "modal.appear"}]
        }));
        assert_eq!(
            script.operations[0].trigger,
            Trigger::SubscriptionEvent {
                subscription_id: "modal".to_string(),
                event: SubscriptionEventKind::Appear,
            }
        );
    }

    #[test]
    fn throttle_clamps_to_at_least_100() {
        let script = normalize_script(&json!({"throttle": 5}));
        assert_eq!(script.throttle, 100);
    }

    #[test]
    fn retry_attempts_clamp_to_at_least_one() {
        let script = normalize_script(&json!({
            "defaults": {"retry": {"attempts": 0, "backoffMs": 10}}
        }));
        assert_eq!(script.defaults.retry.attempts, 1);
    }

    #[test]
    fn convenience_param_keys_become_params_when_params_absent() {
        let script = normalize_script(&json!({
            "operations": [{"id": "a", "action": "type", "trigger": "manual", "text": "hello"}]
        }));
        assert_eq!(
            script.operations[0].params.get("text").and_then(Value::as_str),
            Some("hello")
        );
    }

    #[test]
    fn unparseable_trigger_becomes_unknown() {
        let script = normalize_script(&json!({
            "operations": [{"id": "a", "action": "click", "trigger": "bogus"}]
        }));
        assert_eq!(script.operations[0].trigger, Trigger::Unknown("bogus".to_string()));
    }
}
