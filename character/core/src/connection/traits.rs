//! Connection Traits
//!
//! The dialogue service is reached through two primitives:
//! - `fetch`: one request, one reply
//! - `stream`: one request, then zero or more progress events followed by
//!   exactly one terminal event (completion or exception)
//!
//! Both are event-name addressed with JSON payloads. Implementations handle
//! the actual transport (WebSocket, HTTP, in-process, ...).

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Event pushed by the service on a stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental payload
    Progress(Value),
    /// Terminal success with the final payload
    Complete(Value),
    /// Terminal failure
    Exception(String),
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Errors from connection operations
#[derive(Debug)]
pub enum TransportError {
    /// The connection is not ready to carry requests
    NotReady,
    /// The connection was closed
    ConnectionClosed,
    /// The service answered with an error
    Remote(String),
    /// A payload could not be encoded or decoded
    Serialization(serde_json::Error),
    /// No reply is available for the event (scripted connections)
    Unscripted(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "Connection not ready"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Remote(msg) => write!(f, "Remote error: {msg}"),
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Unscripted(event) => write!(f, "No scripted reply for '{event}'"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

/// Connection to the dialogue service
#[async_trait]
pub trait Connection: Send + Sync {
    /// Whether the connection can carry requests
    fn is_ready(&self) -> bool;

    /// Whether the service attaches behaviors to responses
    fn behaviors_enabled(&self) -> bool;

    /// One-shot request
    async fn fetch(&self, event: &str, payload: Value) -> Result<Value, TransportError>;

    /// Open a server-push stream
    ///
    /// The receiver yields progress events and then exactly one terminal
    /// event. A channel that closes before a terminal event is a failure.
    async fn stream(
        &self,
        event: &str,
        payload: Value,
    ) -> Result<mpsc::Receiver<StreamEvent>, TransportError>;
}

/// Fetch with typed request and reply
pub async fn fetch_json<T, P>(
    connection: &dyn Connection,
    event: &str,
    payload: &P,
) -> Result<T, TransportError>
where
    T: DeserializeOwned,
    P: Serialize + ?Sized,
{
    let payload = serde_json::to_value(payload)?;
    let reply = connection.fetch(event, payload).await?;
    Ok(serde_json::from_value(reply)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_event_wire_format() {
        let event: StreamEvent = serde_json::from_value(json!({ "progress": { "text": "he" } })).unwrap();
        assert_eq!(event, StreamEvent::Progress(json!({ "text": "he" })));
        assert!(!event.is_terminal());

        let event: StreamEvent = serde_json::from_value(json!({ "exception": "boom" })).unwrap();
        assert!(event.is_terminal());
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Remote("denied".to_string()).to_string(),
            "Remote error: denied"
        );
        assert_eq!(TransportError::ConnectionClosed.to_string(), "Connection closed");
    }
}
