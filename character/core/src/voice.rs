//! Voice Playback Interface
//!
//! The voice subsystem decodes audio chunks, queues them for playback and
//! reports playback progress. This crate only consumes it through the
//! [`Voice`] trait; decoding and playback live elsewhere.
//!
//! For one message the voice channel emits, in order:
//! - zero or more [`VoiceEvent::Progress`] (a chunk was decoded and queued),
//! - one [`VoiceEvent::LastChunkStarted`] (the final chunk began playing),
//! - one [`VoiceEvent::Complete`] (the final chunk finished playing).
//!
//! `Complete` is only emitted after [`Voice::set_stream_complete`] was called.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::MessageResponse;

/// Opaque handle to a decoded audio clip owned by the playback subsystem
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClipHandle(pub u64);

/// A decoded voice chunk
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceChunk {
    /// Text spoken in this chunk
    pub text: String,
    /// Playback handle of the chunk
    pub clip: Option<ClipHandle>,
}

impl VoiceChunk {
    /// Create a chunk
    pub fn new(text: impl Into<String>, clip: Option<ClipHandle>) -> Self {
        Self {
            text: text.into(),
            clip,
        }
    }
}

/// Progress notifications from the voice subsystem
#[derive(Clone, Debug, PartialEq)]
pub enum VoiceEvent {
    /// A chunk was decoded and queued for playback
    Progress(VoiceChunk),
    /// The final chunk of the message started playing
    LastChunkStarted(VoiceChunk),
    /// The final chunk of the message finished playing
    Complete,
}

/// Voice ingestion and playback contract
#[async_trait]
pub trait Voice: Send + Sync {
    /// Whether speech synthesis is enabled
    fn enabled(&self) -> bool;

    /// Hand a streamed response carrying audio to the voice subsystem
    async fn add(&self, response: MessageResponse);

    /// No further chunks will be added for the current message
    fn set_stream_complete(&self);

    /// Drop queued audio and forget the current message
    fn reset(&self);

    /// Subscribe to voice events
    ///
    /// The orchestrator subscribes once, when it is built.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<VoiceEvent>;
}

/// Voice implementation for characters without speech
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledVoice;

#[async_trait]
impl Voice for DisabledVoice {
    fn enabled(&self) -> bool {
        false
    }

    async fn add(&self, _response: MessageResponse) {}

    fn set_stream_complete(&self) {}

    fn reset(&self) {}

    fn subscribe(&self) -> mpsc::UnboundedReceiver<VoiceEvent> {
        // Sender dropped immediately: the stream is closed from the start
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }
}
