// ── Passthrough processor ──

use serde_json::Value;

use super::{Publication, SensorProcessor};
use crate::model::UpdateElement;

/// Republishes every field of every update verbatim, `created_at`
/// included. For hubs the bridge has no decoder for.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawProcessor;

impl SensorProcessor for RawProcessor {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn process(&self, updates: &[UpdateElement]) -> Vec<Publication> {
        let mut out = Vec::new();
        for element in updates {
            if let Some(ref created_at) = element.created_at {
                out.push(Publication::new("created_at", created_at));
            }
            for (field, value) in &element.fields {
                out.push(Publication::new(field, render(value)));
            }
        }
        out
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
