//! Behavior Payloads
//!
//! Behaviors are side-effect payloads embedded in a streamed response: an
//! expression change, a gesture trigger, or something this crate does not know
//! about yet. They arrive untyped (a JSON object with a `type` tag) and are
//! decoded into a closed set with an explicit [`Behavior::Unknown`] variant, so
//! a new server-side behavior never breaks parsing.
//!
//! # Wire Format
//!
//! ```json
//! { "type": "expression", "current": "smile", "next": "neutral" }
//! { "type": "gesture", "name": "wave" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Tag used for expression behaviors
pub const EXPRESSION_TAG: &str = "expression";
/// Tag used for gesture behaviors
pub const GESTURE_TAG: &str = "gesture";

/// Expression change carried by a response
///
/// `current` is shown while the character speaks, `next` once the message
/// has finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    /// Expression to apply immediately
    pub current: String,
    /// Expression to apply when the message is finalized
    pub next: String,
}

/// Gesture trigger carried by a response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gesture {
    /// Gesture name, looked up in the gesture table
    pub name: String,
}

/// A decoded behavior payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Behavior {
    /// Facial expression change
    Expression(Expression),
    /// Body gesture
    Gesture(Gesture),
    /// Unrecognized or malformed payload, retained verbatim
    Unknown {
        /// The `type` tag, if the payload had one
        kind: Option<String>,
        /// Raw payload as received
        payload: Value,
    },
}

impl Behavior {
    /// Decode a raw payload. Never fails: anything that is not a well-formed
    /// expression or gesture becomes [`Behavior::Unknown`].
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str);

        let decoded = match kind {
            Some(EXPRESSION_TAG) => Expression::deserialize(value).map(Self::Expression),
            Some(GESTURE_TAG) => Gesture::deserialize(value).map(Self::Gesture),
            _ => return Self::unknown(kind, value),
        };

        decoded.unwrap_or_else(|e| {
            tracing::debug!(kind = ?kind, error = %e, "Malformed behavior payload");
            Self::unknown(kind, value)
        })
    }

    fn unknown(kind: Option<&str>, value: &Value) -> Self {
        Self::Unknown {
            kind: kind.map(str::to_string),
            payload: value.clone(),
        }
    }

    /// The `type` tag of this behavior (`"unknown"` if absent)
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Expression(_) => EXPRESSION_TAG,
            Self::Gesture(_) => GESTURE_TAG,
            Self::Unknown { kind, .. } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    /// Borrow the expression, if this is one
    #[must_use]
    pub fn as_expression(&self) -> Option<&Expression> {
        match self {
            Self::Expression(expression) => Some(expression),
            _ => None,
        }
    }

    /// Borrow the gesture, if this is one
    #[must_use]
    pub fn as_gesture(&self) -> Option<&Gesture> {
        match self {
            Self::Gesture(gesture) => Some(gesture),
            _ => None,
        }
    }
}

impl From<Value> for Behavior {
    fn from(value: Value) -> Self {
        Self::parse(&value)
    }
}

impl From<Behavior> for Value {
    fn from(behavior: Behavior) -> Self {
        match behavior {
            Behavior::Expression(Expression { current, next }) => json!({
                "type": EXPRESSION_TAG,
                "current": current,
                "next": next,
            }),
            Behavior::Gesture(Gesture { name }) => json!({
                "type": GESTURE_TAG,
                "name": name,
            }),
            Behavior::Unknown { payload, .. } => payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expression() {
        let behavior = Behavior::parse(&json!({
            "type": "expression",
            "current": "smile",
            "next": "neutral"
        }));

        assert_eq!(
            behavior,
            Behavior::Expression(Expression {
                current: "smile".to_string(),
                next: "neutral".to_string(),
            })
        );
        assert_eq!(behavior.kind(), "expression");
    }

    #[test]
    fn test_parse_gesture() {
        let behavior = Behavior::parse(&json!({ "type": "gesture", "name": "wave" }));
        assert_eq!(behavior.as_gesture().map(|g| g.name.as_str()), Some("wave"));
        assert!(behavior.as_expression().is_none());
    }

    #[test]
    fn test_unknown_tag_is_retained() {
        let payload = json!({ "type": "dance", "style": "salsa" });
        let behavior = Behavior::parse(&payload);

        assert_eq!(behavior.kind(), "dance");
        match behavior {
            Behavior::Unknown { kind, payload: kept } => {
                assert_eq!(kind.as_deref(), Some("dance"));
                assert_eq!(kept, payload);
            }
            other => panic!("Expected unknown behavior, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_expression_is_unknown() {
        let behavior = Behavior::parse(&json!({ "type": "expression", "current": "smile" }));
        assert!(matches!(behavior, Behavior::Unknown { .. }));
        assert_eq!(behavior.kind(), "expression");
    }

    #[test]
    fn test_untagged_payload_is_unknown() {
        let behavior = Behavior::parse(&json!("just a string"));
        assert_eq!(behavior.kind(), "unknown");
    }

    #[test]
    fn test_deserialize_list_of_behaviors() {
        let behaviors: Vec<Behavior> = serde_json::from_value(json!([
            { "type": "gesture", "name": "nod" },
            { "type": "sparkle" }
        ]))
        .unwrap();

        assert_eq!(behaviors.len(), 2);
        assert_eq!(behaviors[0].kind(), "gesture");
        assert_eq!(behaviors[1].kind(), "sparkle");
    }

    #[test]
    fn test_serialize_keeps_type_tag() {
        let value = serde_json::to_value(Behavior::Gesture(Gesture {
            name: "wave".to_string(),
        }))
        .unwrap();
        assert_eq!(value, json!({ "type": "gesture", "name": "wave" }));
    }
}
