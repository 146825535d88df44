//! Serialization and deserialization for the `BroadChat` wire format.
//!
//! Outbound envelopes are encoded as single-line JSON objects. Inbound
//! client payloads follow a permissive contract: the protocol does not
//! require structured input, so [`extract_text`] accepts any JSON value and
//! only rejects payloads that are not JSON at all.

use serde_json::Value;

use crate::envelope::Envelope;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization of an [`Envelope`] failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// An inbound payload could not be parsed as JSON.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// Encodes an [`Envelope`] into its JSON wire representation.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the envelope cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`Envelope`] from its JSON wire representation.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not a valid envelope.
pub fn decode(text: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Extracts the chat text from a raw inbound payload.
///
/// The payload is expected to be a JSON object with a `text` field, but the
/// contract is permissive:
///
/// - an object with a string `text` field yields that string;
/// - any other JSON value yields the whole value (a JSON string yields its
///   contents, anything else its JSON rendering).
///
/// # Errors
///
/// Returns `CodecError::InvalidFormat` if the payload is not valid JSON.
/// The caller reports this back to the sender and drops the payload.
pub fn extract_text(raw: &str) -> Result<String, CodecError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::InvalidFormat(e.to_string()))?;
    match value {
        Value::Object(ref fields) => match fields.get("text") {
            Some(Value::String(text)) => Ok(text.clone()),
            _ => Ok(value.to_string()),
        },
        Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}
