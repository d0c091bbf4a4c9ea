//! Scripted In-Process Connection
//!
//! Replays configured replies without any network. Fetch replies are keyed by
//! event name and returned on every call; stream scripts are consumed in
//! order, one per `stream` call. Every request is recorded for inspection.
//!
//! # Script Files
//!
//! ```json
//! {
//!   "behaviors": true,
//!   "fetch": {
//!     "character": { "id": "npc-1", "name": "Ada" },
//!     "messagehistory": { "data": [] }
//!   },
//!   "streams": [
//!     [ { "progress": { "text": "Hel" } }, { "progress": { "text": "lo" } }, { "complete": {} } ]
//!   ]
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::events;
use super::traits::{Connection, StreamEvent, TransportError};

/// Capacity of live streams handed out by [`ScriptedConnection::with_live_stream`]
const LIVE_STREAM_CAPACITY: usize = 64;

enum FetchReply {
    Ok(Value),
    Err(String),
}

enum StreamScript {
    Events(Vec<StreamEvent>),
    Live(mpsc::Receiver<StreamEvent>),
    Fail(String),
}

/// On-disk script for a [`ScriptedConnection`]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScriptFile {
    /// Whether the connection reports ready (default: true)
    pub ready: Option<bool>,
    /// Whether behaviors are enabled
    pub behaviors: bool,
    /// Fetch replies by event name
    pub fetch: HashMap<String, Value>,
    /// Stream scripts, one per message
    pub streams: Vec<Vec<StreamEvent>>,
}

/// Connection replaying canned replies
pub struct ScriptedConnection {
    ready: AtomicBool,
    behaviors: AtomicBool,
    fetches: Mutex<HashMap<String, FetchReply>>,
    streams: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl Default for ScriptedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedConnection {
    /// Ready connection with empty character info and history
    #[must_use]
    pub fn new() -> Self {
        let mut fetches = HashMap::new();
        fetches.insert(events::CHARACTER.to_string(), FetchReply::Ok(json!({})));
        fetches.insert(
            events::MESSAGE_HISTORY.to_string(),
            FetchReply::Ok(json!({ "data": [] })),
        );
        fetches.insert(
            events::CLEAR_MESSAGE_HISTORY.to_string(),
            FetchReply::Ok(json!({})),
        );

        Self {
            ready: AtomicBool::new(true),
            behaviors: AtomicBool::new(false),
            fetches: Mutex::new(fetches),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Build a connection from a parsed script
    #[must_use]
    pub fn from_script(script: ScriptFile) -> Self {
        let mut connection = Self::new()
            .with_behaviors(script.behaviors)
            .with_ready(script.ready.unwrap_or(true));
        for (event, reply) in script.fetch {
            connection = connection.with_fetch(&event, reply);
        }
        for stream in script.streams {
            connection = connection.with_stream(stream);
        }
        connection
    }

    /// Reply to `event` with `reply`
    #[must_use]
    pub fn with_fetch(self, event: &str, reply: Value) -> Self {
        self.fetches
            .lock()
            .insert(event.to_string(), FetchReply::Ok(reply));
        self
    }

    /// Fail every fetch of `event`
    #[must_use]
    pub fn with_fetch_error(self, event: &str, message: impl Into<String>) -> Self {
        self.fetches
            .lock()
            .insert(event.to_string(), FetchReply::Err(message.into()));
        self
    }

    /// Queue a stream that replays `events` and then closes
    #[must_use]
    pub fn with_stream(self, events: Vec<StreamEvent>) -> Self {
        self.streams.lock().push_back(StreamScript::Events(events));
        self
    }

    /// Queue a stream that fails to open
    #[must_use]
    pub fn with_stream_error(self, message: impl Into<String>) -> Self {
        self.streams
            .lock()
            .push_back(StreamScript::Fail(message.into()));
        self
    }

    /// Queue a stream driven by the returned sender
    pub fn with_live_stream(&self) -> mpsc::Sender<StreamEvent> {
        let (tx, rx) = mpsc::channel(LIVE_STREAM_CAPACITY);
        self.streams.lock().push_back(StreamScript::Live(rx));
        tx
    }

    /// Set readiness
    #[must_use]
    pub fn with_ready(self, ready: bool) -> Self {
        self.set_ready(ready);
        self
    }

    /// Set whether behaviors are enabled
    #[must_use]
    pub fn with_behaviors(self, enabled: bool) -> Self {
        self.behaviors.store(enabled, Ordering::SeqCst);
        self
    }

    /// Change readiness at runtime
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Requests received so far, as `(event, payload)`
    #[must_use]
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }

    /// Payloads of requests for `event`
    #[must_use]
    pub fn requests_for(&self, event: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Number of stream scripts not yet consumed
    #[must_use]
    pub fn pending_streams(&self) -> usize {
        self.streams.lock().len()
    }

    fn record(&self, event: &str, payload: &Value) {
        self.requests
            .lock()
            .push((event.to_string(), payload.clone()));
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn behaviors_enabled(&self) -> bool {
        self.behaviors.load(Ordering::SeqCst)
    }

    async fn fetch(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
        self.record(event, &payload);
        tracing::debug!(event = %event, "Scripted fetch");

        match self.fetches.lock().get(event) {
            Some(FetchReply::Ok(reply)) => Ok(reply.clone()),
            Some(FetchReply::Err(message)) => Err(TransportError::Remote(message.clone())),
            None => Err(TransportError::Unscripted(event.to_string())),
        }
    }

    async fn stream(
        &self,
        event: &str,
        payload: Value,
    ) -> Result<mpsc::Receiver<StreamEvent>, TransportError> {
        self.record(event, &payload);

        let script = self.streams.lock().pop_front();
        match script {
            Some(StreamScript::Events(script)) => {
                tracing::debug!(event = %event, events = script.len(), "Scripted stream");
                let (tx, rx) = mpsc::channel(script.len().max(1));
                for stream_event in script {
                    tx.try_send(stream_event)
                        .map_err(|_| TransportError::ConnectionClosed)?;
                }
                Ok(rx)
            }
            Some(StreamScript::Live(rx)) => Ok(rx),
            Some(StreamScript::Fail(message)) => Err(TransportError::Remote(message)),
            None => Err(TransportError::Unscripted(event.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_fetch_replies_and_records() {
        let connection = ScriptedConnection::new().with_fetch("character", json!({ "id": "a" }));

        let reply = assert_ok!(connection.fetch("character", json!({ "id": "a" })).await);
        assert_eq!(reply, json!({ "id": "a" }));
        assert_eq!(connection.requests_for("character"), vec![json!({ "id": "a" })]);

        let err = assert_err!(connection.fetch("unknown", json!({})).await);
        assert!(matches!(err, TransportError::Unscripted(_)));
    }

    #[tokio::test]
    async fn test_fetch_error() {
        let connection = ScriptedConnection::new().with_fetch_error("messagehistory", "down");
        let err = assert_err!(connection.fetch("messagehistory", json!({})).await);
        assert_eq!(err.to_string(), "Remote error: down");
    }

    #[tokio::test]
    async fn test_streams_consumed_in_order() {
        let connection = ScriptedConnection::new()
            .with_stream(vec![
                StreamEvent::Progress(json!({ "text": "a" })),
                StreamEvent::Complete(json!({})),
            ])
            .with_stream_error("refused");

        let mut rx = assert_ok!(connection.stream("message", json!({})).await);
        assert_eq!(rx.recv().await, Some(StreamEvent::Progress(json!({ "text": "a" }))));
        assert_eq!(rx.recv().await, Some(StreamEvent::Complete(json!({}))));
        assert_eq!(rx.recv().await, None);

        assert_err!(connection.stream("message", json!({})).await);
        assert_eq!(connection.pending_streams(), 0);
        assert_err!(connection.stream("message", json!({})).await);
    }

    #[tokio::test]
    async fn test_live_stream() {
        let connection = ScriptedConnection::new();
        let tx = connection.with_live_stream();
        let mut rx = assert_ok!(connection.stream("message", json!({})).await);

        tx.send(StreamEvent::Exception("boom".to_string())).await.unwrap();
        assert_eq!(rx.recv().await, Some(StreamEvent::Exception("boom".to_string())));
    }

    #[test]
    fn test_from_script() {
        let script: ScriptFile = serde_json::from_value(json!({
            "behaviors": true,
            "fetch": { "character": { "id": "npc-1" } },
            "streams": [[{ "complete": {} }]]
        }))
        .unwrap();

        let connection = ScriptedConnection::from_script(script);
        assert!(connection.is_ready());
        assert!(connection.behaviors_enabled());
        assert_eq!(connection.pending_streams(), 1);
    }
}
