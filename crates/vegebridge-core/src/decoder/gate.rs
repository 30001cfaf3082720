// ── Gate sensor processor ──
//
// A hub wired to a gate contact, a light sensor and its own battery.
// The contact reads 0 V when the gate is open and 3.3 V when closed.
// Newer firmware reports the first trigger immediately and buffers the
// rest, so one POST can carry many gate readings: only the last matters.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::info;

use super::readings::{
    LIGHT_CLAMP_VOLTS, LightBand, battery_percent, format_reading, format_timestamp, light_band,
    lux,
};
use super::{Publication, SensorProcessor};
use crate::model::UpdateElement;

/// Which update fields carry which channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateFields {
    /// Interrupt-triggered gate channels, in precedence order (later wins).
    pub interrupt: Vec<String>,
    /// Periodic gate sample; overrides the interrupt channels.
    pub periodic: String,
    pub light: String,
    pub battery: String,
}

impl Default for GateFields {
    fn default() -> Self {
        Self {
            interrupt: vec!["field1".into(), "field3".into()],
            periodic: "field2".into(),
            light: "field4".into(),
            battery: "field5".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum GateState {
    Open,
    Closed,
}

impl GateState {
    /// Contact closed pulls the channel above 1 V.
    pub fn from_volts(volts: f64) -> Self {
        if volts > 1.0 { Self::Closed } else { Self::Open }
    }
}

/// What produced a gate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum GateSource {
    Sensor,
    Periodic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateEvent {
    pub state: GateState,
    pub source: GateSource,
    pub timestamp: String,
}

impl GateEvent {
    fn publications(&self) -> Vec<Publication> {
        vec![
            Publication::new(format!("{}/gate", self.source), self.state.to_string()),
            Publication::new(format!("{}/gate_last_update", self.source), &self.timestamp),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightReading {
    pub band: LightBand,
    /// Clamped to the sensor's saturation voltage.
    pub volts: f64,
    pub lux: f64,
    pub timestamp: String,
}

impl LightReading {
    fn publications(&self) -> Vec<Publication> {
        vec![
            Publication::new("light", self.band.to_string()),
            Publication::new("light_value", format_reading(self.volts)),
            Publication::new("light_lux", format_reading(self.lux)),
            Publication::new("light_last_update", &self.timestamp),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryReading {
    pub volts: f64,
    pub percent: u8,
    pub timestamp: String,
}

impl BatteryReading {
    fn publications(&self) -> Vec<Publication> {
        vec![
            Publication::new("battery_volts", format_reading(self.volts)),
            Publication::new("battery", self.percent.to_string()),
            Publication::new("battery_last_update", &self.timestamp),
        ]
    }
}

/// Decodes gate, light and battery channels.
#[derive(Debug, Clone)]
pub struct GateProcessor {
    fields: GateFields,
    ir_offset: f64,
    utc_offset: Option<FixedOffset>,
}

impl GateProcessor {
    pub fn new(fields: GateFields, ir_offset: f64, utc_offset: Option<FixedOffset>) -> Self {
        Self {
            fields,
            ir_offset,
            utc_offset,
        }
    }

    fn timestamp(&self, element: &UpdateElement) -> String {
        format_timestamp(element.created_at.as_deref(), self.utc_offset)
    }

    /// The gate state after the whole batch, if any element carried a
    /// gate reading.
    pub fn coalesce_gate(&self, updates: &[UpdateElement]) -> Option<GateEvent> {
        let mut latest = None;
        for element in updates {
            let mut reading = None;
            for field in &self.fields.interrupt {
                if let Some(volts) = element.number(field) {
                    reading = Some((volts, GateSource::Sensor));
                }
            }
            if let Some(volts) = element.number(&self.fields.periodic) {
                reading = Some((volts, GateSource::Periodic));
            }

            if let Some((volts, source)) = reading {
                latest = Some(GateEvent {
                    state: GateState::from_volts(volts),
                    source,
                    timestamp: self.timestamp(element),
                });
            }
        }
        latest
    }

    pub fn light(&self, element: &UpdateElement) -> Option<LightReading> {
        let volts = element.number(&self.fields.light)?.min(LIGHT_CLAMP_VOLTS);
        Some(LightReading {
            band: light_band(volts, self.ir_offset),
            volts,
            lux: lux(volts, self.ir_offset),
            timestamp: self.timestamp(element),
        })
    }

    pub fn battery(&self, element: &UpdateElement) -> Option<BatteryReading> {
        let volts = element.number(&self.fields.battery)?;
        Some(BatteryReading {
            volts,
            percent: battery_percent(volts),
            timestamp: self.timestamp(element),
        })
    }
}

impl SensorProcessor for GateProcessor {
    fn name(&self) -> &'static str {
        "gate"
    }

    fn process(&self, updates: &[UpdateElement]) -> Vec<Publication> {
        let mut out = Vec::new();

        if let Some(gate) = self.coalesce_gate(updates) {
            info!(state = %gate.state, source = %gate.source, at = %gate.timestamp, "gate");
            out.extend(gate.publications());
        }

        for element in updates {
            if let Some(light) = self.light(element) {
                info!(band = %light.band, volts = light.volts, lux = light.lux, at = %light.timestamp, "light");
                out.extend(light.publications());
            }
            if let Some(battery) = self.battery(element) {
                info!(percent = battery.percent, volts = battery.volts, at = %battery.timestamp, "battery");
                out.extend(battery.publications());
            }
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn processor() -> GateProcessor {
        GateProcessor::new(GateFields::default(), 0.67, FixedOffset::east_opt(0))
    }

    fn elements(value: serde_json::Value) -> Vec<UpdateElement> {
        serde_json::from_value(value).unwrap()
    }

    fn lookup<'a>(pubs: &'a [Publication], topic: &str) -> Option<&'a str> {
        pubs.iter()
            .find(|p| p.topic == topic)
            .map(|p| p.payload.as_str())
    }

    #[test]
    fn last_gate_reading_in_batch_wins() {
        let updates = elements(json!([{"field2": 3.3}, {"field1": 0.5}]));
        let gate = processor().coalesce_gate(&updates).unwrap();
        assert_eq!(gate.state, GateState::Open);
        assert_eq!(gate.source, GateSource::Sensor);
    }

    #[test]
    fn periodic_overrides_interrupt_within_one_element() {
        let updates = elements(json!([{"field1": 0.0, "field3": 0.1, "field2": 3.2}]));
        let gate = processor().coalesce_gate(&updates).unwrap();
        assert_eq!(gate.state, GateState::Closed);
        assert_eq!(gate.source, GateSource::Periodic);
    }

    #[test]
    fn null_readings_do_not_count() {
        let updates = elements(json!([
            {"field1": 3.3, "created_at": "2019-09-10 02:27:24"},
            {"field1": null, "field4": 1.0}
        ]));
        let gate = processor().coalesce_gate(&updates).unwrap();
        assert_eq!(gate.state, GateState::Closed);
        assert_eq!(gate.timestamp, "2019-09-10T02:27:24");
    }

    #[test]
    fn batch_without_gate_fields_has_no_gate_event() {
        let updates = elements(json!([{"field4": 2.0}]));
        assert!(processor().coalesce_gate(&updates).is_none());
    }

    #[test]
    fn gate_is_published_once_per_batch() {
        let updates = elements(json!([
            {"field2": 3.3, "created_at": "2019-09-10 02:27:20"},
            {"field1": 0.2, "created_at": "2019-09-10 02:27:24"}
        ]));
        let pubs = processor().process(&updates);
        let gates: Vec<&Publication> = pubs.iter().filter(|p| p.topic.ends_with("/gate")).collect();
        assert_eq!(gates.len(), 1);
        assert_eq!(gates[0].topic, "sensor/gate");
        assert_eq!(gates[0].payload, "OPEN");
        assert_eq!(
            lookup(&pubs, "sensor/gate_last_update"),
            Some("2019-09-10T02:27:24")
        );
    }

    #[test]
    fn light_is_clamped_and_banded() {
        let updates = elements(json!([{"field4": 3.6, "created_at": "2019-09-10 02:27:24"}]));
        let pubs = processor().process(&updates);
        assert_eq!(lookup(&pubs, "light"), Some("Very Bright"));
        assert_eq!(lookup(&pubs, "light_value"), Some("3.3"));
        assert_eq!(lookup(&pubs, "light_last_update"), Some("2019-09-10T02:27:24"));
        assert!(lookup(&pubs, "light_lux").is_some());
    }

    #[test]
    fn battery_readings_per_element() {
        let updates = elements(json!([{"field5": 9.0}, {"field5": 5.5}]));
        let pubs = processor().process(&updates);
        let percents: Vec<&str> = pubs
            .iter()
            .filter(|p| p.topic == "battery")
            .map(|p| p.payload.as_str())
            .collect();
        assert_eq!(percents, vec!["100", "0"]);
        assert_eq!(lookup(&pubs, "battery_volts"), Some("9.0"));
    }

    #[test]
    fn custom_fields_are_honoured() {
        let fields = GateFields {
            interrupt: vec!["field7".into()],
            periodic: "field8".into(),
            ..GateFields::default()
        };
        let p = GateProcessor::new(fields, 0.67, None);
        let updates = elements(json!([{"field1": 3.3, "field7": 3.3}]));
        let gate = p.coalesce_gate(&updates).unwrap();
        assert_eq!(gate.state, GateState::Closed);
        assert_eq!(gate.source, GateSource::Sensor);

        let updates = elements(json!([{"field1": 3.3}]));
        assert!(p.coalesce_gate(&updates).is_none());
    }
}
