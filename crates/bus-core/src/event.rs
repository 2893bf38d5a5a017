//! Core event types shared between the recorder daemon and the query
//! tool.
//!
//! # Payload encoding
//!
//! Payloads arrive as raw bytes and are stored as text. `decode_payload`
//! performs an exact UTF-8 translation; anything else becomes the
//! lowercase hex encoding of the raw bytes. The store does **not**
//! record which branch was taken — the fallback is lossless but not
//! self-describing.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// InboundEvent
// ---------------------------------------------------------------------------

/// One event as delivered by the bus connection layer, before any
/// decoding or persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Delivery-guarantee level tag carried with the message; stored,
    /// never interpreted.
    pub qos: u8,
    /// Whether the bus marked this message as a retained
    /// last-known-value message.
    pub retained: bool,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A recorded event row. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned, monotonically increasing. Storage ordering
    /// only; not a logical sequence number from the source.
    pub id: i64,
    /// Receipt time (not origination), RFC 3339 with local offset.
    pub timestamp: String,
    pub topic: String,
    pub sender: Option<String>,
    pub payload: String,
    pub qos: u8,
    pub retained: bool,
}

// ---------------------------------------------------------------------------
// Payload decoding
// ---------------------------------------------------------------------------

/// Decode a raw payload to text per the encoding policy above.
pub fn decode_payload(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_owned(),
        Err(_) => hex::encode(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_payload_passes_through_unchanged() {
        assert_eq!(decode_payload(b"{\"x\":1}"), "{\"x\":1}");
    }

    #[test]
    fn empty_payload_decodes_to_empty_string() {
        assert_eq!(decode_payload(b""), "");
    }

    #[test]
    fn non_utf8_payload_becomes_lowercase_hex() {
        assert_eq!(decode_payload(&[0xff, 0x00, 0xab]), "ff00ab");
    }

    #[test]
    fn hex_fallback_is_lossless() {
        let raw = [0x80, 0x81, 0xfe];
        let decoded = decode_payload(&raw);
        assert_eq!(hex::decode(&decoded).expect("round-trip hex"), raw);
    }
}
