//! Wire types for the remote web-chat API.
//!
//! Responses are JSON objects carrying session identifiers, a transcript
//! cursor (`nextPosition`), and a `transcript` array of typed events. Events
//! are modeled as a closed enum so that rendering and filtering dispatch
//! exhaustively; an event type this crate does not know about deserializes
//! to [`TranscriptEvent::Unknown`] rather than being silently dropped.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// A participant in the chat, as reported by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Display name of the participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Server-assigned participant identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<u64>,

    /// Participant role, e.g. "Client" or "Agent".
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Fields common to every transcript event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    /// Position of the event in the server transcript. Unique per session
    /// and strictly increasing. Zero when the server omitted it.
    #[serde(default)]
    pub index: u64,

    /// Message or notice text, when the event carries any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// The participant the event originated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Participant>,
}

/// One event in the server-side conversation transcript.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TranscriptEvent {
    /// A chat message.
    Message(EventBody),
    /// A push URL was set for the session.
    PushUrl(EventBody),
    /// A participant joined the conversation.
    ParticipantJoined(EventBody),
    /// A participant left the conversation.
    ParticipantLeft(EventBody),
    /// A participant started typing.
    TypingStarted(EventBody),
    /// A participant stopped typing.
    TypingStopped(EventBody),
    /// An application-defined notice.
    CustomNotice(EventBody),
    /// The session was disconnected by the server.
    Disconnect(EventBody),
    /// An event type this client does not recognize. Carries the common
    /// body fields so it keeps its transcript position and flows to the
    /// reporter like any other event.
    Unknown(EventBody),
}

// Tagged deserialization with a body-preserving fallback: an unrecognized
// `type` string must not lose its `index`, or the cursor filter would drop
// the event.
impl<'de> Deserialize<'de> for TranscriptEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let body: EventBody = serde_json::from_value(value).map_err(D::Error::custom)?;
        Ok(match kind.as_str() {
            "Message" => TranscriptEvent::Message(body),
            "PushUrl" => TranscriptEvent::PushUrl(body),
            "ParticipantJoined" => TranscriptEvent::ParticipantJoined(body),
            "ParticipantLeft" => TranscriptEvent::ParticipantLeft(body),
            "TypingStarted" => TranscriptEvent::TypingStarted(body),
            "TypingStopped" => TranscriptEvent::TypingStopped(body),
            "CustomNotice" => TranscriptEvent::CustomNotice(body),
            "Disconnect" => TranscriptEvent::Disconnect(body),
            _ => TranscriptEvent::Unknown(body),
        })
    }
}

impl TranscriptEvent {
    /// Returns the transcript position of this event.
    pub fn index(&self) -> u64 {
        self.body().index
    }

    /// Returns the common body fields.
    pub fn body(&self) -> &EventBody {
        match self {
            TranscriptEvent::Message(body)
            | TranscriptEvent::PushUrl(body)
            | TranscriptEvent::ParticipantJoined(body)
            | TranscriptEvent::ParticipantLeft(body)
            | TranscriptEvent::TypingStarted(body)
            | TranscriptEvent::TypingStopped(body)
            | TranscriptEvent::CustomNotice(body)
            | TranscriptEvent::Disconnect(body)
            | TranscriptEvent::Unknown(body) => body,
        }
    }

    /// Returns true for agent-visible message events.
    pub fn is_message(&self) -> bool {
        matches!(self, TranscriptEvent::Message(_))
    }
}

/// An API-level error entry from the server's `errors` array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Server-defined error code.
    #[serde(default)]
    pub code: u16,

    /// Human-readable error message.
    #[serde(default)]
    pub message: String,

    /// Optional remediation advice from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
}

/// A parsed response from any chat endpoint.
///
/// Every field is optional on the wire; which ones are required depends on
/// the operation. [`ChatResponse::require`] extracts a mandatory field and
/// maps its absence to [`Error::MalformedResponse`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Opaque server-issued conversation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,

    /// Opaque credential required on every subsequent call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_key: Option<String>,

    /// Server-issued participant identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Server-issued participant alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// The transcript cursor after this operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_position: Option<u64>,

    /// New transcript events included with this response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<TranscriptEvent>,

    /// API-level errors, if the operation failed server-side.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiError>,

    /// Whether the server considers the chat ended.
    #[serde(default)]
    pub chat_ended: bool,
}

impl ChatResponse {
    /// Parses a response from a raw JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(Error::from)
    }

    /// Returns true if the server reported no API-level errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Extracts a required string field, mapping absence to
    /// [`Error::MalformedResponse`].
    pub fn require<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str> {
        value.as_deref().ok_or_else(|| Error::malformed(field))
    }

    /// Collapses the `errors` array into a single [`Error::ServerError`].
    pub fn server_error(&self) -> Option<Error> {
        let first = self.errors.first()?;
        let message = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Some(Error::server(first.code, message))
    }
}
