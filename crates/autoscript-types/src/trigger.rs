use serde::{Deserialize, Serialize};

/// The four DOM lifecycle events a subscription can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventKind {
    Appear,
    Exist,
    Disappear,
    Change,
}

impl SubscriptionEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionEventKind::Appear => "appear",
            SubscriptionEventKind::Exist => "exist",
            SubscriptionEventKind::Disappear => "disappear",
            SubscriptionEventKind::Change => "change",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "appear" => Some(Self::Appear),
            "exist" => Some(Self::Exist),
            "disappear" => Some(Self::Disappear),
            "change" => Some(Self::Change),
            _ => None,
        }
    }

    pub const ALL: [SubscriptionEventKind; 4] = [
        SubscriptionEventKind::Appear,
        SubscriptionEventKind::Exist,
        SubscriptionEventKind::Disappear,
        SubscriptionEventKind::Change,
    ];
}

/// An operation's firing condition, normalized from the raw `"subscriptionId.event"`
/// string form (or the bare `"startup"` / `"manual"` literals) found in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Manual,
    SubscriptionEvent {
        subscription_id: String,
        event: SubscriptionEventKind,
    },
    /// Anything the normalizer could not parse. The validator rejects this shape;
    /// it is kept rather than discarded so the error message can show the raw text.
    Unknown(String),
}

impl Trigger {
    pub fn parse(raw: &str) -> Trigger {
        match raw {
            "startup" => Trigger::Startup,
            "manual" => Trigger::Manual,
            other => match other.split_once('.') {
                Some((subscription_id, event)) if !subscription_id.is_empty() => {
                    match SubscriptionEventKind::parse(event) {
                        Some(event) => Trigger::SubscriptionEvent {
                            subscription_id: subscription_id.to_string(),
                            event,
                        },
                        None => Trigger::Unknown(other.to_string()),
                    }
                }
                _ => Trigger::Unknown(other.to_string()),
            },
        }
    }

    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Trigger::SubscriptionEvent { subscription_id, .. } => Some(subscription_id),
            _ => None,
        }
    }

    /// Re-renders the canonical `"X.Y"` / `"startup"` / `"manual"` wire form.
    pub fn to_wire_string(&self) -> String {
        match self {
            Trigger::Startup => "startup".to_string(),
            Trigger::Manual => "manual".to_string(),
            Trigger::SubscriptionEvent {
                subscription_id,
                event,
            } => format!("{subscription_id}.{}", event.as_str()),
            Trigger::Unknown(raw) => raw.clone(),
        }
    }
}

impl Serialize for Trigger {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_wire_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_startup_and_manual() {
        assert_eq!(Trigger::parse("startup"), Trigger::Startup);
        assert_eq!(Trigger::parse("manual"), Trigger::Manual);
    }

    #[test]
    fn parses_subscription_event() {
        assert_eq!(
            Trigger::parse("modal.appear"),
            Trigger::SubscriptionEvent {
                subscription_id: "modal".to_string(),
                event: SubscriptionEventKind::Appear,
            }
        );
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert_eq!(
            Trigger::parse("modal.blink"),
            Trigger::Unknown("modal.blink".to_string())
        );
        assert_eq!(
            Trigger::parse("nonsense"),
            Trigger::Unknown("nonsense".to_string())
        );
    }

    #[test]
    fn round_trips_wire_string() {
        let t = Trigger::parse("modal.appear");
        assert_eq!(t.to_wire_string(), "modal.appear");
    }
}
