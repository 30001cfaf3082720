// ── Physical readings ──
//
// Conversions from raw channel volts to the quantities we publish.

use chrono::{FixedOffset, Local, NaiveDateTime};
use strum::Display;

/// Light sensor output saturates here.
pub const LIGHT_CLAMP_VOLTS: f64 = 3.3;

/// Baseline the camera's IR illuminator adds to the light channel at night.
pub const DEFAULT_IR_OFFSET: f64 = 0.67;

/// Battery floor for both 9 V packs and 12 V supplies.
pub const BATTERY_MIN_VOLTS: f64 = 5.5;

/// Format hubs use for `created_at`.
pub const HUB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of every `*_last_update` payload.
pub const PUBLISHED_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Render a reading the way a JSON document would, so whole numbers keep
/// their decimal point (`9.0`, not `9`).
pub fn format_reading(value: f64) -> String {
    serde_json::Value::from(value).to_string()
}

/// Coarse brightness band of a light reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LightBand {
    #[strum(serialize = "Very Bright")]
    VeryBright,
    Bright,
    Daylight,
    Dusk,
    Dark,
}

/// Band for an already-clamped reading.
pub fn light_band(volts: f64, ir_offset: f64) -> LightBand {
    if volts > 3.1 {
        LightBand::VeryBright
    } else if volts > 2.7 {
        LightBand::Bright
    } else if volts > 1.17 {
        LightBand::Daylight
    } else if volts > ir_offset {
        LightBand::Dusk
    } else {
        LightBand::Dark
    }
}

/// Rough lux estimate, two decimals. Only loosely calibrated: 1.2 V reads
/// about 20 lux and 0.77 V about 5 lux with the IR illuminator on.
pub fn lux(volts: f64, ir_offset: f64) -> f64 {
    let raw = (10f64.powf((volts - ir_offset).max(0.0)) - 1.0) * 10.0;
    (raw * 100.0).round() / 100.0
}

/// Battery charge as a whole percentage.
///
/// The supply voltage is guessed from the reading: up to 9.5 V is taken as
/// a 9 V pack, anything above as a 12 V supply.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub fn battery_percent(volts: f64) -> u8 {
    let max = if volts <= 9.5 { 9.0 } else { 12.0 };
    let percent = ((volts - BATTERY_MIN_VOLTS) / (max - BATTERY_MIN_VOLTS) * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Timestamp for a reading: the hub's `created_at` shifted by `offset`, or
/// local now when the element has none or it does not parse.
///
/// With no `offset`, the host's current local offset is used.
pub fn format_timestamp(created_at: Option<&str>, offset: Option<FixedOffset>) -> String {
    let parsed = created_at.and_then(|text| {
        NaiveDateTime::parse_from_str(text.trim(), HUB_TIME_FORMAT)
            .map_err(|e| tracing::debug!(created_at = text, error = %e, "unparseable created_at"))
            .ok()
    });

    let local = match parsed {
        Some(naive) => {
            let offset = offset.unwrap_or_else(|| *Local::now().offset());
            naive + offset
        }
        None => Local::now().naive_local(),
    };
    local.format(PUBLISHED_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_percent_bounds() {
        assert_eq!(battery_percent(9.0), 100);
        assert_eq!(battery_percent(5.5), 0);
        assert_eq!(battery_percent(12.0), 100);
        assert_eq!(battery_percent(4.0), 0);
        assert_eq!(battery_percent(13.0), 100);
    }

    #[test]
    fn battery_percent_picks_supply_from_reading() {
        // 9.5 V is still a 9 V pack (capped), 9.6 V is a 12 V supply.
        assert_eq!(battery_percent(9.5), 100);
        assert_eq!(battery_percent(9.6), 63);
        assert_eq!(battery_percent(7.25), 50);
    }

    #[test]
    fn light_bands() {
        assert_eq!(light_band(3.2, DEFAULT_IR_OFFSET), LightBand::VeryBright);
        assert_eq!(light_band(3.0, DEFAULT_IR_OFFSET), LightBand::Bright);
        assert_eq!(light_band(2.0, DEFAULT_IR_OFFSET), LightBand::Daylight);
        assert_eq!(light_band(1.0, DEFAULT_IR_OFFSET), LightBand::Dusk);
        assert_eq!(light_band(DEFAULT_IR_OFFSET, DEFAULT_IR_OFFSET), LightBand::Dark);
        assert_eq!(light_band(0.1, DEFAULT_IR_OFFSET), LightBand::Dark);
    }

    #[test]
    fn light_band_names() {
        assert_eq!(LightBand::VeryBright.to_string(), "Very Bright");
        assert_eq!(LightBand::Dusk.to_string(), "Dusk");
    }

    #[test]
    fn lux_estimate() {
        assert!(lux(0.5, DEFAULT_IR_OFFSET).abs() < f64::EPSILON);
        assert!((lux(1.67, DEFAULT_IR_OFFSET) - 90.0).abs() < 1e-9);
        assert!((lux(0.77, DEFAULT_IR_OFFSET) - 2.59).abs() < 1e-9);
    }

    #[test]
    fn timestamp_applies_offset() {
        let offset = FixedOffset::east_opt(-4 * 3600);
        assert_eq!(
            format_timestamp(Some("2019-09-10 02:27:24"), offset),
            "2019-09-09T22:27:24"
        );
        assert_eq!(
            format_timestamp(Some("2019-09-10 02:27:24"), FixedOffset::east_opt(0)),
            "2019-09-10T02:27:24"
        );
    }

    #[test]
    fn bad_or_missing_timestamp_uses_now() {
        for input in [None, Some("yesterday")] {
            let ts = format_timestamp(input, None);
            assert!(NaiveDateTime::parse_from_str(&ts, PUBLISHED_TIME_FORMAT).is_ok());
        }
    }
}
