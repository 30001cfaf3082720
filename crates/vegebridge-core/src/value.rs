// ── Bus value coercion ──
//
// MQTT payloads arrive as text. Settings leaves are typed, so a command
// value is narrowed to the most specific scalar it parses as.

use crate::model::Scalar;

/// Coerce a raw bus string into a typed scalar.
///
/// Digits only becomes an integer, anything `f64` accepts becomes a float,
/// everything else stays a string.
pub fn coerce(raw: &str) -> Scalar {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(int) = raw.parse::<i64>() {
            return Scalar::Int(int);
        }
    }
    match raw.parse::<f64>() {
        Ok(float) => Scalar::Float(float),
        Err(_) => Scalar::Str(raw.to_owned()),
    }
}
