//! Static validation: duplicate IDs, dangling references, dependency cycles,
//! and a best-effort topological order (§4.2).

use std::collections::{HashMap, HashSet};

use autoscript_types::{Condition, Operation, Script, Trigger, ValidationError, ValidationReport, ValidationWarning};

pub fn validate(script: &Script) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let subscription_ids: HashSet<&str> = check_duplicates(
        script.subscriptions.iter().map(|s| s.id.as_str()),
        "subscription",
        &mut errors,
    );
    let operation_ids: HashSet<&str> = check_duplicates(
        script.operations.iter().map(|o| o.id.as_str()),
        "operation",
        &mut errors,
    );

    for op in &script.operations {
        check_trigger(op, &subscription_ids, &mut errors);
        check_dependencies(op, &operation_ids, &mut errors);
        check_conditions(op, &subscription_ids, &operation_ids, &mut errors);
        if !op.enabled {
            warnings.push(ValidationWarning::new("OPERATION_DISABLED", format!("operation '{}' is disabled", op.id)).at(op.id.clone()));
        }
    }

    let (cycle_errors, topological_order) = detect_cycles_and_order(script);
    errors.extend(cycle_errors);

    ValidationReport {
        ok: errors.is_empty(),
        errors,
        warnings,
        topological_order,
    }
}

fn check_duplicates<'a>(
    ids: impl Iterator<Item = &'a str>,
    kind: &str,
    errors: &mut Vec<ValidationError>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(
                ValidationError::new(
                    "DUPLICATE_ID",
                    format!("duplicate {kind} id '{id}'"),
                )
                .at(id.to_string()),
            );
        }
    }
    seen
}

fn check_trigger(op: &Operation, subscription_ids: &HashSet<&str>, errors: &mut Vec<ValidationError>) {
    match &op.trigger {
        Trigger::Startup | Trigger::Manual => {}
        Trigger::SubscriptionEvent { subscription_id, .. } => {
            if !subscription_ids.contains(subscription_id.as_str()) {
                errors.push(
                    ValidationError::new(
                        "UNKNOWN_SUBSCRIPTION_TRIGGER",
                        format!(
                            "operation '{}' triggers on unknown subscription '{}'",
                            op.id, subscription_id
                        ),
                    )
                    .at(op.id.clone()),
                );
            }
        }
        Trigger::Unknown(raw) => {
            errors.push(
                ValidationError::new(
                    "UNSUPPORTED_TRIGGER_SHAPE",
                    format!("operation '{}' has an unsupported trigger '{}'", op.id, raw),
                )
                .at(op.id.clone()),
            );
        }
    }
}

fn check_dependencies(op: &Operation, operation_ids: &HashSet<&str>, errors: &mut Vec<ValidationError>) {
    for dep in &op.depends_on {
        if !operation_ids.contains(dep.as_str()) {
            errors.push(
                ValidationError::new(
                    "DANGLING_DEPENDENCY",
                    format!("operation '{}' depends on unknown operation '{}'", op.id, dep),
                )
                .at(op.id.clone()),
            );
        }
    }
}

fn check_conditions(
    op: &Operation,
    subscription_ids: &HashSet<&str>,
    operation_ids: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) {
    for cond in &op.conditions {
        if let Some(operation_id) = cond.referenced_operation_id() {
            if !operation_ids.contains(operation_id) {
                errors.push(
                    ValidationError::new(
                        "DANGLING_CONDITION",
                        format!(
                            "operation '{}' condition references unknown operation '{}'",
                            op.id, operation_id
                        ),
                    )
                    .at(op.id.clone()),
                );
            }
        }
        if let Some(subscription_id) = cond.referenced_subscription_id() {
            if !subscription_ids.contains(subscription_id) {
                errors.push(
                    ValidationError::new(
                        "DANGLING_CONDITION",
                        format!(
                            "operation '{}' condition references unknown subscription '{}'",
                            op.id, subscription_id
                        ),
                    )
                    .at(op.id.clone()),
                );
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS topological sort over the `dependsOn` graph. A cycle is reported with
/// its full path; nodes that are not part of any cycle still get an ordered
/// position, so the rest of the script remains schedulable.
fn detect_cycles_and_order(script: &Script) -> (Vec<ValidationError>, Vec<String>) {
    let index: HashMap<&str, &Operation> = script.operations.iter().map(|o| (o.id.as_str(), o)).collect();
    let mut color: HashMap<&str, Color> = script.operations.iter().map(|o| (o.id.as_str(), Color::White)).collect();
    let mut order = Vec::new();
    let mut errors = Vec::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut in_cycle: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        id: &'a str,
        index: &HashMap<&'a str, &'a Operation>,
        color: &mut HashMap<&'a str, Color>,
        order: &mut Vec<String>,
        errors: &mut Vec<ValidationError>,
        stack: &mut Vec<&'a str>,
        in_cycle: &mut HashSet<&'a str>,
    ) {
        match color.get(id) {
            Some(Color::Black) | None => return,
            Some(Color::Gray) => {
                let start = stack.iter().position(|n| *n == id).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                path.push(id.to_string());
                for n in &stack[start..] {
                    in_cycle.insert(n);
                }
                errors.push(ValidationError::new(
                    "DEPENDENCY_CYCLE",
                    format!("dependency cycle: {}", path.join(" -> ")),
                ));
                return;
            }
            Some(Color::White) => {}
        }
        color.insert(id, Color::Gray);
        stack.push(id);
        if let Some(op) = index.get(id) {
            for dep in &op.depends_on {
                visit(dep.as_str(), index, color, order, errors, stack, in_cycle);
            }
        }
        stack.pop();
        color.insert(id, Color::Black);
        if !in_cycle.contains(id) {
            order.push(id.to_string());
        }
    }

    for op in &script.operations {
        visit(
            op.id.as_str(),
            &index,
            &mut color,
            &mut order,
            &mut errors,
            &mut stack,
            &mut in_cycle,
        );
    }

    (errors, order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize_script;
    use serde_json::json;

    #[test]
    fn flags_duplicate_operation_ids() {
        let script = normalize_script(&json!({
            "operations": [
                {"id": "a", "action": "click", "trigger": "startup"},
                {"id": "a", "action": "click", "trigger": "startup"}
            ]
        }));
        let report = validate(&script);
        assert!(!report.ok);
        assert!(report.errors.iter().any(|e| e.code == "DUPLICATE_ID"));
    }

    #[test]
    fn flags_dangling_dependency() {
        let script = normalize_script(&json!({
            "operations": [
                {"id": "a", "action": "click", "trigger": "startup", "dependsOn": ["ghost"]}
            ]
        }));
        let report = validate(&script);
        assert!(report.errors.iter().any(|e| e.code == "DANGLING_DEPENDENCY"));
    }

    #[test]
    fn flags_unknown_trigger_shape() {
        let script = normalize_script(&json!({
            "operations": [{"id": "a", "action": "click", "trigger": "nonsense"}]
        }));
        let report = validate(&script);
        assert!(report.errors.iter().any(|e| e.code == "UNSUPPORTED_TRIGGER_SHAPE"));
    }

    #[test]
    fn detects_cycle_but_still_orders_other_ops() {
        let script = normalize_script(&json!({
            "operations": [
                {"id": "a", "action": "click", "trigger": "startup", "dependsOn": ["b"]},
                {"id": "b", "action": "click", "trigger": "startup", "dependsOn": ["a"]},
                {"id": "c", "action": "click", "trigger": "startup"}
            ]
        }));
        let report = validate(&script);
        assert!(report.errors.iter().any(|e| e.code == "DEPENDENCY_CYCLE"));
        assert!(report.topological_order.contains(&"c".to_string()));
        assert!(!report.topological_order.contains(&"a".to_string()));
    }

    #[test]
    fn disabled_operation_is_a_warning_not_an_error() {
        let script = normalize_script(&json!({
            "operations": [{"id": "a", "action": "click", "trigger": "startup", "enabled": false}]
        }));
        let report = validate(&script);
        assert!(report.ok);
        assert!(report.warnings.iter().any(|w| w.code == "OPERATION_DISABLED"));
    }
}
