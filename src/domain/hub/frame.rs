//! Record-separated JSON framing used on the duplex channel.

use serde_json::Value;

/// Terminates every frame on the wire.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Appends the record separator to a serialized JSON value.
pub fn encode_frame(value: &Value) -> String {
    let mut frame = value.to_string();
    frame.push(RECORD_SEPARATOR);
    frame
}

/// Capability negotiation sent right after the socket opens.
pub fn handshake_frame() -> String {
    encode_frame(&serde_json::json!({"protocol": "json", "version": 1}))
}

/// Keep-alive ping.
pub fn heartbeat_frame() -> String {
    encode_frame(&serde_json::json!({"type": 6}))
}

/// Splits one transport message into its JSON units, in arrival order.
///
/// Empty units and units that do not parse as JSON objects are dropped.
pub fn decode_frames(text: &str) -> Vec<Value> {
    text.split(RECORD_SEPARATOR)
        .filter(|unit| !unit.trim().is_empty())
        .filter_map(|unit| match serde_json::from_str::<Value>(unit) {
            Ok(value @ Value::Object(_)) => Some(value),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "dropping unparsable frame unit");
                None
            }
        })
        .collect()
}

/// The handshake acknowledgement is an empty JSON object.
pub fn is_handshake_ack(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}
