// ── Sensor decoding ──
//
// Turns a batch of buffered hub readings into bus publications. Which
// decoding applies is a deployment choice, so processors sit behind a
// trait and are picked from configuration at startup.

pub mod gate;
pub mod raw;
pub mod readings;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::UpdateElement;

pub use gate::{GateEvent, GateFields, GateProcessor, GateSource, GateState};
pub use raw::RawProcessor;
pub use readings::{DEFAULT_IR_OFFSET, LightBand};

/// One message for the bus, relative to the hub's topic root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
}

impl Publication {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Decodes one ingest batch.
pub trait SensorProcessor: Send + Sync {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Publications for `updates`, oldest element first.
    fn process(&self, updates: &[UpdateElement]) -> Vec<Publication>;
}

/// Available processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    #[default]
    Gate,
    Raw,
}

/// Decoder settings, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    pub kind: ProcessorKind,
    pub fields: GateFields,
    pub ir_offset: f64,
    /// Offset added to hub `created_at` times. `None` uses the host's.
    pub utc_offset: Option<FixedOffset>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            kind: ProcessorKind::default(),
            fields: GateFields::default(),
            ir_offset: DEFAULT_IR_OFFSET,
            utc_offset: None,
        }
    }
}

/// Build the processor `config` names.
pub fn build_processor(config: &DecoderConfig) -> Box<dyn SensorProcessor> {
    match config.kind {
        ProcessorKind::Gate => Box::new(GateProcessor::new(
            config.fields.clone(),
            config.ir_offset,
            config.utc_offset,
        )),
        ProcessorKind::Raw => Box::new(RawProcessor),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn processor_kind_parses_case_insensitively() {
        assert_eq!(ProcessorKind::from_str("gate").unwrap(), ProcessorKind::Gate);
        assert_eq!(ProcessorKind::from_str("RAW").unwrap(), ProcessorKind::Raw);
        assert!(ProcessorKind::from_str("lamp").is_err());
        assert_eq!(ProcessorKind::Raw.to_string(), "raw");
    }

    #[test]
    fn build_processor_follows_kind() {
        let mut config = DecoderConfig::default();
        assert_eq!(build_processor(&config).name(), "gate");
        config.kind = ProcessorKind::Raw;
        assert_eq!(build_processor(&config).name(), "raw");
    }
}
