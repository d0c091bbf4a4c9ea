//! Message Records and Wire Payloads
//!
//! [`Message`] is one entry of the conversation history: the user's prompt and
//! the character's (possibly still growing) response. The remaining types are
//! the payloads exchanged with the dialogue service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::behavior::Behavior;
use crate::voice::ClipHandle;

/// One exchange in the conversation history
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// What the user said
    pub prompt: String,
    /// Accumulated response text
    pub response: String,
    /// Most recent response fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    /// Behaviors received with this response, in arrival order
    #[serde(default)]
    pub behaviors: Vec<Behavior>,
    /// Playback handle of the most recent voice chunk
    #[serde(skip)]
    pub voice_clip: Option<ClipHandle>,
    /// Failure reason if the message terminated with an exception
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl Message {
    /// Create a message for a freshly sent prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Whether the message terminated with an exception
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }

    /// First expression behavior of this message, if any
    #[must_use]
    pub fn first_expression(&self) -> Option<&crate::behavior::Expression> {
        self.behaviors.iter().find_map(Behavior::as_expression)
    }
}

/// A persisted history entry as returned by the dialogue service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// User prompt
    pub message: String,
    /// Character response
    #[serde(default)]
    pub response: String,
    /// Behaviors attached to the response
    #[serde(default)]
    pub behaviors: Vec<Behavior>,
}

impl From<HistoryRecord> for Message {
    fn from(record: HistoryRecord) -> Self {
        Self {
            prompt: record.message,
            response: record.response,
            behaviors: record.behaviors,
            ..Default::default()
        }
    }
}

/// Envelope of the message history fetch
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// History entries, oldest first
    #[serde(default)]
    pub data: Vec<HistoryRecord>,
}

/// Character description returned by the dialogue service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterInfo {
    /// Character identifier
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Any further fields the service sends
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One progress (or terminal) payload of a message stream
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Text delta
    #[serde(default)]
    pub text: String,
    /// Encoded audio for this chunk, present when voice is requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Raw behavior payload, decoded with [`Behavior::parse`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Value>,
}

impl MessageResponse {
    /// Text-only response fragment
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Attach encoded audio
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Attach a raw behavior payload
    #[must_use]
    pub fn with_behavior(mut self, behavior: Value) -> Self {
        self.behavior = Some(behavior);
        self
    }
}

/// Payload of the `character` fetch
#[derive(Clone, Debug, Serialize)]
pub struct CharacterInfoRequest<'a> {
    /// Character identifier
    pub id: &'a str,
}

/// Payload of the history fetches (`messagehistory`, `clearmessagehistory`)
#[derive(Clone, Debug, Serialize)]
pub struct HistoryRequest<'a> {
    /// Character identifier
    pub character: &'a str,
}

/// Payload of the `message` stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Character identifier
    pub character: String,
    /// User prompt
    pub message: String,
    /// Whether synthesized speech is requested
    pub voice: bool,
    /// Whether behaviors are requested
    pub behaviors: bool,
}
