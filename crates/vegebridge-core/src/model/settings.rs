// ── Settings document types ──

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names that identify a slot inside an array of channel settings,
/// in lookup priority order.
pub const SLOT_KEYS: [&str; 3] = ["slot", "idx", "actuator_slot"];

/// A leaf value in a settings document.
///
/// Coercion only ever produces `Str`, `Int` or `Float`. `Bool` and `Null`
/// exist so hub fields we know nothing about survive a load/save cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality used for slot matching: numbers compare by value across
    /// `Int` and `Float`, everything else compares structurally.
    pub fn loosely_eq(&self, other: &Self) -> bool {
        match (self.as_f64(), other.as_f64()) {
            #[allow(clippy::float_cmp)]
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{}", Value::from(*x)),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&Scalar> for Value {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(x) => Value::from(*x),
            Scalar::Str(s) => Value::String(s.clone()),
        }
    }
}

/// One node of a hub's settings tree.
///
/// Arrays normally hold objects, one per slot (channel or actuator), each
/// carrying one of the [`SLOT_KEYS`] as its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsNode {
    Leaf(Scalar),
    Object(IndexMap<String, SettingsNode>),
    Array(Vec<SettingsNode>),
}

impl SettingsNode {
    pub fn as_object(&self) -> Option<&IndexMap<String, SettingsNode>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Leaf(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// Child lookup on an object node; `None` for leaves and arrays.
    pub fn get(&self, key: &str) -> Option<&SettingsNode> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// The slot identifier of an object node: the first of `slot`, `idx`,
    /// `actuator_slot` that is present.
    pub fn slot_id(&self) -> Option<&Scalar> {
        let map = self.as_object()?;
        SLOT_KEYS
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(SettingsNode::as_scalar)
    }

    /// JSON form with object keys sorted, used for persistence and for
    /// publishing whole subtrees.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Leaf(scalar) => Value::from(scalar),
            Self::Object(map) => Value::Object(sorted_object(map)),
            Self::Array(items) => Value::Array(items.iter().map(SettingsNode::to_json).collect()),
        }
    }

    /// The string a subscriber receives for this node: leaves verbatim,
    /// containers as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Self::Leaf(scalar) => scalar.to_string(),
            container => container.to_json().to_string(),
        }
    }
}

impl From<Value> for SettingsNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Leaf(Scalar::Null),
            Value::Bool(b) => Self::Leaf(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Leaf(Scalar::Int(i)),
                None => Self::Leaf(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => Self::Leaf(Scalar::Str(s)),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Object(object_from_json(map)),
        }
    }
}

pub(crate) fn object_from_json(map: Map<String, Value>) -> IndexMap<String, SettingsNode> {
    map.into_iter()
        .map(|(k, v)| (k, SettingsNode::from(v)))
        .collect()
}

pub(crate) fn sorted_object(map: &IndexMap<String, SettingsNode>) -> Map<String, Value> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|k| map.get(k).map(|v| (k.clone(), v.to_json())))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_mixed_tree() {
        let node: SettingsNode = serde_json::from_value(json!({
            "hub": {"name": "gate", "sample_period": 60, "ratio": 0.5, "enabled": true},
            "channels": [{"slot": 1, "type": "voltage"}, {"slot": 2, "type": "none"}],
            "note": null
        }))
        .unwrap();

        let hub = node.get("hub").unwrap();
        assert_eq!(hub.get("name").unwrap().as_str(), Some("gate"));
        assert_eq!(
            hub.get("sample_period").unwrap().as_scalar(),
            Some(&Scalar::Int(60))
        );
        assert_eq!(hub.get("ratio").unwrap().as_scalar(), Some(&Scalar::Float(0.5)));
        assert_eq!(hub.get("enabled").unwrap().as_scalar(), Some(&Scalar::Bool(true)));
        assert_eq!(node.get("note").unwrap().as_scalar(), Some(&Scalar::Null));
        assert!(matches!(node.get("channels"), Some(SettingsNode::Array(v)) if v.len() == 2));
    }

    #[test]
    fn slot_id_prefers_slot_then_idx_then_actuator_slot() {
        let node = SettingsNode::from(json!({"actuator_slot": 9, "idx": 4}));
        assert_eq!(node.slot_id(), Some(&Scalar::Int(4)));

        let node = SettingsNode::from(json!({"actuator_slot": 9}));
        assert_eq!(node.slot_id(), Some(&Scalar::Int(9)));

        let node = SettingsNode::from(json!({"name": "x"}));
        assert_eq!(node.slot_id(), None);
    }

    #[test]
    fn loosely_eq_compares_numbers_by_value() {
        assert!(Scalar::Int(1).loosely_eq(&Scalar::Float(1.0)));
        assert!(!Scalar::Int(1).loosely_eq(&Scalar::Str("1".into())));
        assert!(Scalar::Str("a".into()).loosely_eq(&Scalar::Str("a".into())));
    }

    #[test]
    fn to_json_sorts_keys_recursively() {
        let node = SettingsNode::from(json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 2} ]}));
        let text = node.to_json().to_string();
        assert_eq!(text, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn render_leaves_without_quotes() {
        assert_eq!(SettingsNode::Leaf(Scalar::Str("on".into())).render(), "on");
        assert_eq!(SettingsNode::Leaf(Scalar::Int(7)).render(), "7");
        assert_eq!(SettingsNode::Leaf(Scalar::Float(7.5)).render(), "7.5");
        assert_eq!(SettingsNode::Leaf(Scalar::Float(9.0)).render(), "9.0");
        assert_eq!(SettingsNode::from(json!([1, 2])).render(), "[1,2]");
    }
}
