//! Error Types
//!
//! Errors surfaced at the [`Character`](crate::Character) boundary. Stream
//! failures during a message are not errors here: they are reported to
//! observers as `MessageException` and recorded on the message itself.

use thiserror::Error;

use crate::config::ConfigError;
use crate::connection::TransportError;

/// Why the character refused an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    /// The connection reports it is not ready
    ConnectionNotReady,
    /// A message is already in flight
    MessageInProgress,
    /// The character was disposed
    Disposed,
}

impl std::fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionNotReady => write!(f, "connection not ready"),
            Self::MessageInProgress => write!(f, "a message is already in progress"),
            Self::Disposed => write!(f, "character disposed"),
        }
    }
}

/// Errors from character operations
#[derive(Debug, Error)]
pub enum CharacterError {
    /// Configuration was missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The character cannot accept the operation right now
    #[error("Not ready: {0}")]
    NotReady(NotReadyReason),

    /// A startup fetch failed
    #[error("Initialization failed at {step}: {source}")]
    Initialization {
        /// Which startup step failed
        step: &'static str,
        /// Underlying transport failure
        #[source]
        source: TransportError,
    },

    /// A remote call failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CharacterError {
    /// Whether this error was a readiness refusal
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_not_ready() {
        let err = CharacterError::NotReady(NotReadyReason::MessageInProgress);
        assert!(err.is_not_ready());
        assert_eq!(
            err.to_string(),
            "Not ready: a message is already in progress"
        );
    }

    #[test]
    fn test_initialization_keeps_step() {
        let err = CharacterError::Initialization {
            step: "messagehistory",
            source: TransportError::ConnectionClosed,
        };
        assert!(err.to_string().contains("messagehistory"));
        assert!(!err.is_not_ready());
    }
}
