// ── Ingest payload types ──
//
// What a hub POSTs when it reports readings. Firmware 3.0 identifies
// itself with `channel_id`, 3.9 and later only send `key` (the api key).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Body of a data-ingest POST.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestPayload {
    #[serde(default)]
    pub key: Option<Value>,

    #[serde(default)]
    pub channel_id: Option<Value>,

    /// Buffered readings, oldest first. A hub that was offline replays
    /// everything it stored in one batch.
    #[serde(default, deserialize_with = "one_or_many")]
    pub updates: Option<Vec<UpdateElement>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IngestPayload {
    pub fn channel_id(&self) -> Option<String> {
        self.channel_id.as_ref().and_then(identifier)
    }

    pub fn key(&self) -> Option<String> {
        self.key.as_ref().and_then(identifier)
    }
}

/// One buffered reading: a timestamp plus any number of `fieldN` values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateElement {
    /// Hub-local time, `%Y-%m-%d %H:%M:%S`.
    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UpdateElement {
    /// Numeric value of a field, `None` when absent, null or not a number.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }
}

/// Non-empty string form of an identifier value.
fn identifier(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Accept either a list of updates or a single bare update object.
fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<UpdateElement>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<UpdateElement>),
        One(UpdateElement),
    }

    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|v| match v {
        OneOrMany::Many(list) => list,
        OneOrMany::One(single) => vec![single],
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_firmware_39_payload() {
        let payload: IngestPayload = serde_json::from_value(json!({
            "key": "test",
            "updates": [
                {"created_at": "2019-09-10 02:27:24", "field2": 2.571, "field4": 0.808}
            ]
        }))
        .unwrap();

        assert_eq!(payload.key().as_deref(), Some("test"));
        assert_eq!(payload.channel_id(), None);
        let updates = payload.updates.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].created_at.as_deref(), Some("2019-09-10 02:27:24"));
        assert_eq!(updates[0].number("field2"), Some(2.571));
        assert_eq!(updates[0].number("field5"), None);
    }

    #[test]
    fn single_update_object_becomes_a_batch_of_one() {
        let payload: IngestPayload =
            serde_json::from_value(json!({"channel_id": "gate", "updates": {"field1": 3.3}}))
                .unwrap();
        assert_eq!(payload.updates.unwrap().len(), 1);
    }

    #[test]
    fn empty_identifiers_are_ignored() {
        let payload: IngestPayload =
            serde_json::from_value(json!({"channel_id": "", "key": 42})).unwrap();
        assert_eq!(payload.channel_id(), None);
        assert_eq!(payload.key().as_deref(), Some("42"));
        assert!(payload.updates.is_none());
    }

    #[test]
    fn unknown_top_level_fields_are_kept() {
        let payload: IngestPayload =
            serde_json::from_value(json!({"key": "k", "battery": 9.1})).unwrap();
        assert_eq!(payload.extra.get("battery"), Some(&json!(9.1)));
    }
}
