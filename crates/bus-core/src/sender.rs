//! Sender extraction from structured payloads.
//!
//! A fixed, ordered list of candidate key names is scanned in a JSON
//! object payload; the first present value wins. Topic-structure
//! inference is a deliberate no-op: senders are only ever read from
//! payload content, never from topic segments.

/// Candidate key names, scanned in order.
const SENDER_KEYS: [&str; 6] = [
    "sender",
    "client_id",
    "clientId",
    "source",
    "from",
    "device_id",
];

/// Attempt to extract a sender identifier from a decoded payload.
///
/// Returns `None` when the payload is empty, is not a JSON object, or
/// contains none of the candidate keys. Malformed payloads yield
/// `None`, never an error.
pub fn extract_sender(_topic: &str, payload: &str) -> Option<String> {
    if payload.is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let map = value.as_object()?;
    for key in SENDER_KEYS {
        if let Some(v) = map.get(key) {
            return Some(match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
    }
    None
}
