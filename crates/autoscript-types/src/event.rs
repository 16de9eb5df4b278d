use crate::trigger::SubscriptionEventKind;

/// An event as reported by the external watcher (or synthesized by the runner
/// itself, for `startup`). See §6, "Watcher contract".
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    Startup {
        timestamp_ms: i64,
    },
    Manual {
        timestamp_ms: i64,
    },
    Subscription {
        subscription_id: String,
        kind: SubscriptionEventKind,
        selector: Option<String>,
        count: Option<u64>,
        timestamp_ms: i64,
    },
}

impl WatcherEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            WatcherEvent::Startup { timestamp_ms }
            | WatcherEvent::Manual { timestamp_ms }
            | WatcherEvent::Subscription { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            WatcherEvent::Subscription {
                subscription_id, ..
            } => Some(subscription_id),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<SubscriptionEventKind> {
        match self {
            WatcherEvent::Subscription { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            WatcherEvent::Startup { .. } => "startup",
            WatcherEvent::Manual { .. } => "manual",
            WatcherEvent::Subscription { kind, .. } => kind.as_str(),
        }
    }
}
