//! Wire format types for the `BroadChat` protocol.
//!
//! Every message exchanged between the relay server and its clients is a
//! single flat JSON object, the [`Envelope`], tagged by a `type` field.
//! Envelopes are serialized with `serde_json` and sent as UTF-8 text frames.

use serde::{Deserialize, Serialize};

/// Discriminates the kinds of envelope the relay server emits.
///
/// Serialized in lowercase as the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// Server-to-one-client notice, carries the assigned identity at accept.
    System,
    /// A relayed chat message from one client, fanned out to all clients.
    Message,
    /// Announcement that a new client entered the registry.
    Join,
    /// Announcement that a client left the registry.
    Leave,
    /// Reported back to a single sender when its payload could not be parsed.
    Error,
}

/// A server-generated timestamp, serialized as an ISO-8601 string with
/// millisecond precision and a trailing `Z` (e.g. `2026-08-07T12:34:56.789Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(chrono::DateTime<chrono::Utc>);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Creates a timestamp from an existing UTC datetime.
    #[must_use]
    pub const fn from_datetime(datetime: chrono::DateTime<chrono::Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner UTC datetime.
    #[must_use]
    pub const fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.0.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        )
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let parsed = chrono::DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))?;
        Ok(Self(parsed.with_timezone(&chrono::Utc)))
    }
}

/// The JSON object exchanged over the connection, tagged by [`EnvelopeKind`].
///
/// Optional fields are omitted from the serialized JSON when absent. Which
/// fields are present depends on the kind:
///
/// | kind      | `clientId` | `text` | `message` | `clientsCount` |
/// |-----------|------------|--------|-----------|----------------|
/// | `system`  | yes        | —      | yes       | yes            |
/// | `message` | yes        | yes    | —         | —              |
/// | `join`    | yes        | —      | yes       | yes            |
/// | `leave`   | yes        | —      | yes       | yes            |
/// | `error`   | —          | —      | yes       | —              |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope discriminant, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,

    /// Identity of the client this envelope is about (sender, joiner, leaver).
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Chat text, present on `message` envelopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Human-readable notice, present on `system`, `join`, `leave`, `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Server-generated emission time.
    pub timestamp: Timestamp,

    /// Registry size after the mutation that triggered this envelope.
    #[serde(rename = "clientsCount", skip_serializing_if = "Option::is_none")]
    pub clients_count: Option<usize>,
}

impl Envelope {
    /// Builds the `system` welcome envelope sent to a freshly accepted client.
    ///
    /// `clients_count` is the registry size after the new connection was
    /// inserted, so it includes the client itself.
    #[must_use]
    pub fn welcome(client_id: &str, clients_count: usize) -> Self {
        Self {
            kind: EnvelopeKind::System,
            client_id: Some(client_id.to_string()),
            text: None,
            message: Some(format!("Welcome! You are {client_id}")),
            timestamp: Timestamp::now(),
            clients_count: Some(clients_count),
        }
    }

    /// Builds the `join` announcement broadcast when a client is accepted.
    #[must_use]
    pub fn join(client_id: &str, clients_count: usize) -> Self {
        Self {
            kind: EnvelopeKind::Join,
            client_id: Some(client_id.to_string()),
            text: None,
            message: Some(format!("{client_id} joined the chat")),
            timestamp: Timestamp::now(),
            clients_count: Some(clients_count),
        }
    }

    /// Builds the `leave` announcement broadcast when a client disconnects.
    ///
    /// `clients_count` is the registry size after removal.
    #[must_use]
    pub fn leave(client_id: &str, clients_count: usize) -> Self {
        Self {
            kind: EnvelopeKind::Leave,
            client_id: Some(client_id.to_string()),
            text: None,
            message: Some(format!("{client_id} left the chat")),
            timestamp: Timestamp::now(),
            clients_count: Some(clients_count),
        }
    }

    /// Builds a relayed `message` envelope carrying a client's chat text.
    #[must_use]
    pub fn chat(client_id: &str, text: String) -> Self {
        Self {
            kind: EnvelopeKind::Message,
            client_id: Some(client_id.to_string()),
            text: Some(text),
            message: None,
            timestamp: Timestamp::now(),
            clients_count: None,
        }
    }

    /// Builds the `error` envelope sent back to the sender of an unparseable
    /// payload. The malformed payload itself is never relayed.
    #[must_use]
    pub fn invalid_format() -> Self {
        Self {
            kind: EnvelopeKind::Error,
            client_id: None,
            text: None,
            message: Some("Invalid message format".to_string()),
            timestamp: Timestamp::now(),
            clients_count: None,
        }
    }
}
