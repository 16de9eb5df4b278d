use serde::{Deserialize, Serialize};

/// A precondition an operation must satisfy in addition to its trigger and
/// dependency graph before it becomes eligible to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    OperationDone {
        #[serde(rename = "operationId")]
        operation_id: String,
    },
    SubscriptionExist {
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
    },
    SubscriptionAppear {
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
    },
}

impl Condition {
    /// The operation or subscription id this condition references, for validator
    /// reference-integrity checks.
    pub fn referenced_operation_id(&self) -> Option<&str> {
        match self {
            Condition::OperationDone { operation_id } => Some(operation_id),
            _ => None,
        }
    }

    pub fn referenced_subscription_id(&self) -> Option<&str> {
        match self {
            Condition::SubscriptionExist { subscription_id }
            | Condition::SubscriptionAppear { subscription_id } => Some(subscription_id),
            _ => None,
        }
    }
}
