//! Character - The Message Orchestrator
//!
//! The [`Character`] owns the conversation history and at most one in-flight
//! message. It merges the text stream from the [`Connection`] and the
//! playback stream from the [`Voice`] into one ordered event timeline,
//! applies expression behaviors immediately and hands every other behavior to
//! the serialized [`BehaviorQueue`].
//!
//! # Message State Machine
//!
//! ```text
//!   Idle ──send──▶ Sent ──progress──▶ Streaming ──▶ TextComplete ──▶ VoiceComplete ──▶ Complete
//!                   │                    │
//!                   └──────exception─────┴──────────────────────────────────────────▶ Failed
//! ```
//!
//! # Event Order
//!
//! | Path    | Terminal events                                               |
//! |---------|---------------------------------------------------------------|
//! | text    | `MessageTextComplete`, `MessageComplete`                      |
//! | voice   | `MessageTextComplete`, `MessageVoiceComplete`, `MessageComplete` |
//! | failure | `MessageException` (never `MessageComplete`)                  |
//!
//! # Driving
//!
//! The character does not spawn tasks for its own streams. The owner drives it
//! with [`Character::next_event`] (await one event), [`Character::poll`] (drain
//! what is ready without waiting) or [`Character::drive_to_completion`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::behavior::{Behavior, Expression};
use crate::config::CharacterConfig;
use crate::connection::{events, fetch_json, Connection, StreamEvent, TransportError};
use crate::error::{CharacterError, NotReadyReason};
use crate::events::CharacterEvent;
use crate::expression::{BlendShapeMesh, ExpressionEngine};
use crate::gesture::{Animator, GestureBridge};
use crate::messages::{
    CharacterInfo, CharacterInfoRequest, HistoryRequest, HistoryResponse, Message,
    MessageRequest, MessageResponse,
};
use crate::observers::{EventFilter, ObserverRegistry, Subscription};
use crate::queue::BehaviorQueue;
use crate::voice::{DisabledVoice, Voice, VoiceEvent};

/// Lifecycle phase of the current (or last) message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessagePhase {
    /// No message has been sent
    #[default]
    Idle,
    /// Sent, no progress yet
    Sent,
    /// Receiving text or voice progress
    Streaming,
    /// Text is complete; voice may still be playing
    TextComplete,
    /// Voice playback finished
    VoiceComplete,
    /// Finished successfully
    Complete,
    /// Terminated with an exception
    Failed,
}

impl MessagePhase {
    /// Whether the phase ends a message
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// The in-flight message
struct ActiveMessage {
    /// Working copy of the record
    record: Message,
    /// Position in history; `None` once history was cleared underneath it
    index: Option<usize>,
    /// Whether this message plays through the voice channel
    voice: bool,
    /// Open stream; dropped after the terminal event
    stream_rx: Option<mpsc::Receiver<StreamEvent>>,
    /// Expression whose `next` is applied at finalization
    pending_expression: Option<Expression>,
    text_complete_emitted: bool,
}

enum Incoming {
    Stream(Option<StreamEvent>),
    Voice(Option<VoiceEvent>),
}

// =============================================================================
// Builder
// =============================================================================

/// Two-phase constructor for [`Character`]
///
/// Collaborators are attached first; [`connect`](CharacterBuilder::connect)
/// then performs the initial fetches. There is no constructed-but-not-ready
/// character.
pub struct CharacterBuilder {
    config: CharacterConfig,
    connection: Arc<dyn Connection>,
    voice: Arc<dyn Voice>,
    mesh: Option<Box<dyn BlendShapeMesh>>,
    animator: Option<Arc<dyn Animator>>,
    observers: ObserverRegistry,
}

impl CharacterBuilder {
    /// Attach a voice channel (default: [`DisabledVoice`])
    #[must_use]
    pub fn with_voice(mut self, voice: Arc<dyn Voice>) -> Self {
        self.voice = voice;
        self
    }

    /// Attach the mesh expressions are applied to
    #[must_use]
    pub fn with_mesh(mut self, mesh: Box<dyn BlendShapeMesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Attach the animator gestures are played on
    #[must_use]
    pub fn with_animator(mut self, animator: Arc<dyn Animator>) -> Self {
        self.animator = Some(animator);
        self
    }

    /// Use an existing observer registry
    ///
    /// Subscribing before `connect` lets an observer see the initial
    /// `HistoryChange`.
    #[must_use]
    pub fn with_observers(mut self, observers: ObserverRegistry) -> Self {
        self.observers = observers;
        self
    }

    /// Validate configuration, fetch character info and history, and return
    /// a ready character
    ///
    /// # Errors
    ///
    /// - [`CharacterError::Configuration`] if the configuration is invalid
    /// - [`CharacterError::NotReady`] if the connection is not ready
    /// - [`CharacterError::Initialization`] if a startup fetch fails
    pub async fn connect(self) -> Result<Character, CharacterError> {
        self.config.validate()?;

        if !self.connection.is_ready() {
            return Err(CharacterError::NotReady(NotReadyReason::ConnectionNotReady));
        }

        let character_id = self.config.character_id.clone();

        let info: CharacterInfo = fetch_json(
            self.connection.as_ref(),
            events::CHARACTER,
            &CharacterInfoRequest { id: &character_id },
        )
        .await
        .map_err(|source| CharacterError::Initialization {
            step: events::CHARACTER,
            source,
        })?;

        let history: HistoryResponse = fetch_json(
            self.connection.as_ref(),
            events::MESSAGE_HISTORY,
            &HistoryRequest {
                character: &character_id,
            },
        )
        .await
        .map_err(|source| CharacterError::Initialization {
            step: events::MESSAGE_HISTORY,
            source,
        })?;
        let history: Vec<Message> = history.data.into_iter().map(Message::from).collect();

        let mut expressions = ExpressionEngine::new(self.config.expressions.clone());
        if let Some(mesh) = self.mesh {
            expressions.attach(mesh);
        }
        if self.connection.behaviors_enabled() {
            expressions.apply_last_expression(&history);
        }

        let gestures = GestureBridge::new(self.config.gestures.clone(), self.animator)
            .with_clip_trigger_prefix(self.config.clip_trigger_prefix.clone())
            .with_poll_interval(self.config.animation_poll_interval);

        let behavior_queue: BehaviorQueue<Behavior> = BehaviorQueue::new();
        if self.config.trigger_gestures {
            behavior_queue.register(Arc::new(gestures.clone()));
        }

        let voice_rx = self.voice.subscribe();

        tracing::info!(
            character_id = %character_id,
            history = history.len(),
            voice = self.voice.enabled(),
            behaviors = self.connection.behaviors_enabled(),
            "Character connected"
        );

        let character = Character {
            config: self.config,
            connection: self.connection,
            voice: self.voice,
            voice_rx: Some(voice_rx),
            expressions,
            gestures,
            behavior_queue,
            observers: self.observers,
            info,
            history,
            active: None,
            phase: MessagePhase::Idle,
            in_progress: false,
            speaking: false,
            current_response: String::new(),
            disposed: false,
        };
        character.emit_history();

        Ok(character)
    }
}

// =============================================================================
// Character
// =============================================================================

/// Streaming message orchestrator for one conversational character
pub struct Character {
    config: CharacterConfig,
    connection: Arc<dyn Connection>,
    voice: Arc<dyn Voice>,
    voice_rx: Option<mpsc::UnboundedReceiver<VoiceEvent>>,
    expressions: ExpressionEngine,
    gestures: GestureBridge,
    behavior_queue: BehaviorQueue<Behavior>,
    observers: ObserverRegistry,
    info: CharacterInfo,
    history: Vec<Message>,
    active: Option<ActiveMessage>,
    phase: MessagePhase,
    in_progress: bool,
    speaking: bool,
    current_response: String,
    disposed: bool,
}

impl Character {
    /// Start building a character
    pub fn builder(config: CharacterConfig, connection: Arc<dyn Connection>) -> CharacterBuilder {
        CharacterBuilder {
            config,
            connection,
            voice: Arc::new(DisabledVoice),
            mesh: None,
            animator: None,
            observers: ObserverRegistry::new(),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Send a user message and open its reply stream
    ///
    /// Returns once the stream is open; progress is processed by the driving
    /// methods. A stream that fails to open is reported as
    /// `MessageException`, not as an error.
    ///
    /// # Errors
    ///
    /// [`CharacterError::NotReady`] if the character is disposed, the
    /// connection is not ready, or a message is already in progress.
    pub async fn send(&mut self, text: &str) -> Result<(), CharacterError> {
        if self.disposed {
            return Err(CharacterError::NotReady(NotReadyReason::Disposed));
        }
        if !self.connection.is_ready() {
            return Err(CharacterError::NotReady(NotReadyReason::ConnectionNotReady));
        }
        if self.in_progress {
            return Err(CharacterError::NotReady(NotReadyReason::MessageInProgress));
        }

        // A closed voice channel can never report progress back
        let voice = self.voice.enabled() && self.voice_rx.is_some();
        let request = MessageRequest {
            character: self.config.character_id.clone(),
            message: text.to_string(),
            voice,
            behaviors: self.connection.behaviors_enabled(),
        };
        let payload = serde_json::to_value(&request).map_err(TransportError::from)?;

        if voice {
            self.voice.reset();
            self.discard_stale_voice_events();
        }

        let record = Message::new(text);
        self.history.push(record.clone());
        self.active = Some(ActiveMessage {
            record: record.clone(),
            index: Some(self.history.len() - 1),
            voice,
            stream_rx: None,
            pending_expression: None,
            text_complete_emitted: false,
        });
        self.in_progress = true;
        self.speaking = false;
        self.current_response.clear();
        self.phase = MessagePhase::Sent;

        tracing::info!(
            character_id = %self.config.character_id,
            voice,
            "Message sent"
        );

        self.emit(CharacterEvent::MessageStart(record));
        self.emit_history();

        match self.connection.stream(events::MESSAGE, payload).await {
            Ok(rx) => {
                if let Some(active) = self.active.as_mut() {
                    active.stream_rx = Some(rx);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open message stream");
                self.fail(e.to_string());
            }
        }

        Ok(())
    }

    /// Clear the remote and local history
    ///
    /// An in-flight message keeps streaming but is no longer part of history.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the remote clear fails; local history
    /// is left untouched in that case.
    pub async fn clear_history(&mut self) -> Result<(), CharacterError> {
        if self.disposed {
            return Err(CharacterError::NotReady(NotReadyReason::Disposed));
        }

        let _: serde_json::Value = fetch_json(
            self.connection.as_ref(),
            events::CLEAR_MESSAGE_HISTORY,
            &HistoryRequest {
                character: &self.config.character_id,
            },
        )
        .await?;

        self.history.clear();
        if let Some(active) = self.active.as_mut() {
            active.index = None;
        }

        tracing::info!(character_id = %self.config.character_id, "Message history cleared");
        self.emit_history();
        Ok(())
    }

    /// Apply an expression by name. Unknown names are logged and ignored.
    pub fn set_expression(&mut self, name: &str) -> bool {
        self.expressions.apply_expression(name)
    }

    /// Play a gesture now, bypassing the behavior queue, and wait for it
    pub async fn trigger_gesture(&self, name: &str) -> bool {
        self.gestures.trigger_gesture(name).await
    }

    /// Subscribe to this character's events
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.observers.subscribe(filter)
    }

    /// Release everything. Idempotent.
    ///
    /// Clears history, discards queued behaviors, detaches every observer and
    /// abandons any in-flight message without emitting further events.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.history.clear();
        self.behavior_queue.dispose();
        self.observers.clear();
        self.active = None;
        self.voice_rx = None;
        self.in_progress = false;
        self.speaking = false;
        self.current_response.clear();
        self.phase = MessagePhase::Idle;

        tracing::info!(character_id = %self.config.character_id, "Character disposed");
    }

    // =========================================================================
    // Driving
    // =========================================================================

    /// Wait for and process the next stream or voice event
    ///
    /// Returns `false` when there is nothing left to wait for (no message in
    /// flight).
    pub async fn next_event(&mut self) -> bool {
        let incoming = {
            let Some(active) = self.active.as_mut() else {
                return false;
            };
            let voice_rx = if active.voice {
                self.voice_rx.as_mut()
            } else {
                None
            };

            match (active.stream_rx.as_mut(), voice_rx) {
                (None, None) => return false,
                (Some(stream), None) => Incoming::Stream(stream.recv().await),
                (None, Some(voice)) => Incoming::Voice(voice.recv().await),
                (Some(stream), Some(voice)) => {
                    tokio::select! {
                        biased;
                        event = stream.recv() => Incoming::Stream(event),
                        event = voice.recv() => Incoming::Voice(event),
                    }
                }
            }
        };

        self.handle_incoming(incoming).await;
        true
    }

    /// Process every event that is ready without waiting
    ///
    /// Returns the number of events processed.
    pub async fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(incoming) = self.try_incoming() {
            self.handle_incoming(incoming).await;
            handled += 1;
        }
        handled
    }

    /// Process events until the current message completes or fails
    pub async fn drive_to_completion(&mut self) {
        while self.next_event().await {}
    }

    fn try_incoming(&mut self) -> Option<Incoming> {
        let active = self.active.as_mut()?;

        if let Some(stream) = active.stream_rx.as_mut() {
            match stream.try_recv() {
                Ok(event) => return Some(Incoming::Stream(Some(event))),
                Err(TryRecvError::Disconnected) => return Some(Incoming::Stream(None)),
                Err(TryRecvError::Empty) => {}
            }
        }

        if active.voice {
            if let Some(voice) = self.voice_rx.as_mut() {
                match voice.try_recv() {
                    Ok(event) => return Some(Incoming::Voice(Some(event))),
                    Err(TryRecvError::Disconnected) => return Some(Incoming::Voice(None)),
                    Err(TryRecvError::Empty) => {}
                }
            }
        }

        None
    }

    async fn handle_incoming(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Stream(Some(StreamEvent::Progress(value))) => {
                match serde_json::from_value::<MessageResponse>(value) {
                    Ok(response) => self.handle_progress(response).await,
                    Err(e) => tracing::warn!(error = %e, "Skipping undecodable progress"),
                }
            }
            Incoming::Stream(Some(StreamEvent::Complete(_))) => self.handle_stream_complete(),
            Incoming::Stream(Some(StreamEvent::Exception(reason))) => {
                tracing::warn!(reason = %reason, "Message stream failed");
                self.fail(reason);
            }
            Incoming::Stream(None) => {
                tracing::warn!("Message stream closed before completion");
                self.fail("stream closed before completion".to_string());
            }
            Incoming::Voice(Some(event)) => self.handle_voice_event(event),
            Incoming::Voice(None) => self.handle_voice_closed(),
        }
    }

    // =========================================================================
    // Stream Handling
    // =========================================================================

    /// Apply one stream progress payload
    ///
    /// Every decoded behavior is recorded in `message.behaviors`, expressions
    /// included, so that a reloaded history can restore the last expression
    /// at connect. Expressions are applied here and never queued; other
    /// behaviors are queued only while gesture playback is enabled, since
    /// nothing would ever drain them otherwise.
    async fn handle_progress(&mut self, response: MessageResponse) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        self.phase = MessagePhase::Streaming;

        if active.voice && response.voice.is_some() {
            tracing::debug!(text = %response.text, "Forwarding voice chunk");
            self.voice.add(response).await;
            return;
        }

        self.current_response.push_str(&response.text);
        active.record.response.clone_from(&self.current_response);
        active.record.chunk = Some(response.text);

        if let Some(raw) = response.behavior {
            let behavior = Behavior::parse(&raw);
            tracing::debug!(kind = %behavior.kind(), "Behavior received");

            match &behavior {
                Behavior::Expression(expression) => {
                    self.expressions.apply_expression(&expression.current);
                    active.pending_expression = Some(expression.clone());
                }
                _ if self.config.trigger_gestures => self.behavior_queue.add(behavior.clone()),
                _ => {
                    tracing::debug!(kind = %behavior.kind(), "Gesture playback disabled; not queued");
                }
            }
            active.record.behaviors.push(behavior);
        }

        self.speaking = true;
        sync_record(&mut self.history, active);
        let snapshot = active.record.clone();

        self.emit(CharacterEvent::MessageProgress(snapshot));
        self.emit_history();
    }

    fn handle_stream_complete(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.stream_rx = None;
        sync_record(&mut self.history, active);
        let voice = active.voice;

        tracing::debug!(voice, "Message stream complete");
        self.emit_history();

        if !voice {
            self.finalize(false);
        } else if self.voice_rx.is_some() {
            self.voice.set_stream_complete();
        } else {
            tracing::warn!("Voice channel closed; completing without voice");
            self.finalize(false);
        }
    }

    // =========================================================================
    // Voice Handling
    // =========================================================================

    fn handle_voice_event(&mut self, event: VoiceEvent) {
        let Some(active) = self.active.as_mut().filter(|a| a.voice) else {
            tracing::debug!(event = ?event, "Voice event without a voiced message");
            return;
        };

        match event {
            VoiceEvent::Progress(chunk) => {
                self.current_response.push_str(&chunk.text);
                active.record.response.clone_from(&self.current_response);
                active.record.chunk = Some(chunk.text);
                active.record.voice_clip = chunk.clip;
                self.speaking = true;
                self.phase = MessagePhase::Streaming;
                sync_record(&mut self.history, active);
                let snapshot = active.record.clone();

                self.emit(CharacterEvent::MessageProgress(snapshot));
                self.emit_history();
            }
            VoiceEvent::LastChunkStarted(chunk) => {
                if active.text_complete_emitted {
                    return;
                }
                active.text_complete_emitted = true;
                active.record.chunk = Some(chunk.text);
                active.record.voice_clip = chunk.clip;
                self.phase = MessagePhase::TextComplete;
                let snapshot = active.record.clone();

                self.emit(CharacterEvent::MessageTextComplete(snapshot));
            }
            VoiceEvent::Complete => self.finalize(true),
        }
    }

    fn handle_voice_closed(&mut self) {
        tracing::warn!("Voice channel closed");
        self.voice_rx = None;

        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.stream_rx.is_some() {
            // Remaining progress is treated as text
            active.voice = false;
        } else {
            self.finalize(false);
        }
    }

    // =========================================================================
    // Terminal Transitions
    // =========================================================================

    fn finalize(&mut self, voice_completed: bool) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        if let Some(expression) = active.pending_expression.take() {
            self.expressions.apply_expression(&expression.next);
        }

        self.in_progress = false;
        self.speaking = false;
        self.current_response.clear();
        sync_record(&mut self.history, &active);
        let record = active.record;

        if !active.text_complete_emitted {
            self.phase = MessagePhase::TextComplete;
            self.emit(CharacterEvent::MessageTextComplete(record.clone()));
        }
        if voice_completed {
            self.phase = MessagePhase::VoiceComplete;
            self.emit(CharacterEvent::MessageVoiceComplete(record.clone()));
        }

        self.phase = MessagePhase::Complete;
        tracing::info!(
            response_len = record.response.len(),
            behaviors = record.behaviors.len(),
            "Message complete"
        );
        self.emit(CharacterEvent::MessageComplete(record));
    }

    fn fail(&mut self, reason: String) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.record.exception = Some(reason);
        sync_record(&mut self.history, &active);

        self.in_progress = false;
        self.speaking = false;
        self.current_response.clear();
        self.phase = MessagePhase::Failed;
        if active.voice {
            self.voice.reset();
        }

        self.emit(CharacterEvent::MessageException(active.record));
        self.emit_history();
    }

    fn discard_stale_voice_events(&mut self) {
        if let Some(voice) = self.voice_rx.as_mut() {
            let mut discarded = 0;
            while voice.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                tracing::debug!(discarded, "Discarded stale voice events");
            }
        }
    }

    fn emit(&self, event: CharacterEvent) {
        self.observers.publish(&event);
    }

    fn emit_history(&self) {
        self.emit(CharacterEvent::HistoryChange(self.history.clone()));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Character description fetched at startup
    #[must_use]
    pub fn info(&self) -> &CharacterInfo {
        &self.info
    }

    /// Conversation history, oldest first
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Whether a message is in flight
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Whether the character is currently producing its reply
    #[must_use]
    pub fn speaking(&self) -> bool {
        self.speaking
    }

    /// Text accumulated for the in-flight message
    #[must_use]
    pub fn current_response(&self) -> &str {
        &self.current_response
    }

    /// Phase of the current (or last) message
    #[must_use]
    pub fn phase(&self) -> MessagePhase {
        self.phase
    }

    /// The serialized behavior queue
    #[must_use]
    pub fn behavior_queue(&self) -> &BehaviorQueue<Behavior> {
        &self.behavior_queue
    }

    /// The expression engine
    #[must_use]
    pub fn expressions(&self) -> &ExpressionEngine {
        &self.expressions
    }

    /// The observer registry
    #[must_use]
    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    /// Whether [`dispose`](Self::dispose) was called
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for Character {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Character {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Character")
            .field("character_id", &self.config.character_id)
            .field("history", &self.history.len())
            .field("phase", &self.phase)
            .field("in_progress", &self.in_progress)
            .field("speaking", &self.speaking)
            .finish_non_exhaustive()
    }
}

/// Write the working copy back into history, if it is still part of it
fn sync_record(history: &mut [Message], active: &ActiveMessage) {
    if let Some(slot) = active.index.and_then(|i| history.get_mut(i)) {
        slot.clone_from(&active.record);
    }
}
