//! Lifecycle Events
//!
//! Events published by the [`Character`](crate::Character) to observers. Each
//! message event carries a snapshot of the current message record;
//! `HistoryChange` carries the full ordered history.
//!
//! # Ordering
//!
//! For a single message the terminal events are always one of:
//! - `MessageTextComplete`, `MessageVoiceComplete`, `MessageComplete` (voice)
//! - `MessageTextComplete`, `MessageComplete` (text only)
//! - `MessageException` (failure)

use serde::Serialize;

use crate::messages::Message;

/// Events from the Character to observers
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CharacterEvent {
    /// A message was sent and appended to history
    MessageStart(Message),
    /// The current message received text or voice progress
    MessageProgress(Message),
    /// The text of the current message is complete
    MessageTextComplete(Message),
    /// Voice playback of the current message finished
    MessageVoiceComplete(Message),
    /// The current message finished successfully
    MessageComplete(Message),
    /// The current message failed
    MessageException(Message),
    /// The history changed
    HistoryChange(Vec<Message>),
}

impl CharacterEvent {
    /// Kind of this event, for filtering
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageStart(_) => EventKind::MessageStart,
            Self::MessageProgress(_) => EventKind::MessageProgress,
            Self::MessageTextComplete(_) => EventKind::MessageTextComplete,
            Self::MessageVoiceComplete(_) => EventKind::MessageVoiceComplete,
            Self::MessageComplete(_) => EventKind::MessageComplete,
            Self::MessageException(_) => EventKind::MessageException,
            Self::HistoryChange(_) => EventKind::HistoryChange,
        }
    }

    /// Message snapshot carried by this event (`None` for history changes)
    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::MessageStart(m)
            | Self::MessageProgress(m)
            | Self::MessageTextComplete(m)
            | Self::MessageVoiceComplete(m)
            | Self::MessageComplete(m)
            | Self::MessageException(m) => Some(m),
            Self::HistoryChange(_) => None,
        }
    }
}

/// Discriminant of [`CharacterEvent`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// See [`CharacterEvent::MessageStart`]
    MessageStart,
    /// See [`CharacterEvent::MessageProgress`]
    MessageProgress,
    /// See [`CharacterEvent::MessageTextComplete`]
    MessageTextComplete,
    /// See [`CharacterEvent::MessageVoiceComplete`]
    MessageVoiceComplete,
    /// See [`CharacterEvent::MessageComplete`]
    MessageComplete,
    /// See [`CharacterEvent::MessageException`]
    MessageException,
    /// See [`CharacterEvent::HistoryChange`]
    HistoryChange,
}

impl EventKind {
    /// Every event kind
    pub const ALL: [EventKind; 7] = [
        Self::MessageStart,
        Self::MessageProgress,
        Self::MessageTextComplete,
        Self::MessageVoiceComplete,
        Self::MessageComplete,
        Self::MessageException,
        Self::HistoryChange,
    ];

    /// Whether this kind ends a message lifecycle
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::MessageComplete | Self::MessageException)
    }

    /// Bit used by [`EventFilter`](crate::EventFilter)
    #[must_use]
    pub(crate) fn bit(self) -> u8 {
        1 << (self as u8)
    }
}
