//! Character Core - Streaming Message Orchestration for Conversational Characters
//!
//! This crate drives a conversational character: it sends a user utterance to a
//! remote dialogue service, receives an incrementally streamed reply (text and,
//! optionally, synthesized speech), and publishes that reply to UI and animation
//! layers as a single ordered event timeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Observers (UI, animation, lip-sync)             │
//! │                               ▲                                  │
//! │                      CharacterEvent (ordered)                    │
//! └───────────────────────────────┼──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                          Character                               │
//! │  ┌────────────┐  ┌─────────────┐  ┌──────────────┐  ┌─────────┐  │
//! │  │ Expression │  │  Behavior   │  │   Gesture    │  │ History │  │
//! │  │   Engine   │  │   Queue     │──▶│   Bridge     │  │         │  │
//! │  └────────────┘  └─────────────┘  └──────────────┘  └─────────┘  │
//! │         ▲                ▲                                        │
//! │         └──── behaviors ─┴──── text progress ◀──┐                 │
//! │                                                  │                │
//! │             voice progress / last chunk / done ◀─┼── Voice        │
//! └──────────────────────────────────────────────────┼───────────────┘
//!                                                    │
//!                                          Connection (fetch, stream)
//! ```
//!
//! # Key Types
//!
//! - [`Character`]: The orchestrator that owns the current message and history
//! - [`CharacterEvent`]: Lifecycle events published to observers
//! - [`BehaviorQueue`]: Serialized asynchronous FIFO for gestures
//! - [`ExpressionEngine`]: Reset-then-set blend shape expressions
//! - [`Connection`] / [`Voice`] / [`Animator`] / [`BlendShapeMesh`]: collaborator seams
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use character_core::{Character, CharacterConfig, EventFilter, ObserverRegistry};
//! use character_core::connection::ScriptedConnection;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CharacterConfig::with_id("npc-42");
//!     let connection = Arc::new(ScriptedConnection::new());
//!     let observers = ObserverRegistry::new();
//!     let mut events = observers.subscribe(EventFilter::all());
//!
//!     let mut character = Character::builder(config, connection)
//!         .with_observers(observers)
//!         .connect()
//!         .await?;
//!
//!     character.send("hi").await?;
//!     character.drive_to_completion().await;
//!
//!     while let Some(event) = events.try_recv() {
//!         println!("{:?}", event.kind());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`behavior`]: Behavior payloads (expressions, gestures, unknown)
//! - [`character`]: The message orchestrator state machine
//! - [`config`]: TOML/env configuration for a character
//! - [`connection`]: Dialogue service interface and a scripted implementation
//! - [`error`]: Error types at the orchestrator boundary
//! - [`events`]: Lifecycle events
//! - [`expression`]: Expression tables and the blend shape engine
//! - [`gesture`]: Gesture tables and the animation bridge
//! - [`messages`]: Message records and wire payloads
//! - [`observers`]: Typed publish/subscribe with scoped subscriptions
//! - [`queue`]: The serialized behavior queue
//! - [`voice`]: Voice playback interface

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod behavior;
pub mod character;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod expression;
pub mod gesture;
pub mod messages;
pub mod observers;
pub mod queue;
pub mod voice;

// Re-exports for convenience
pub use behavior::{Behavior, Expression, Gesture};
pub use character::{Character, CharacterBuilder, MessagePhase};
pub use config::{
    default_config_path, load_config, load_config_from_path, CharacterConfig, CharacterToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
pub use connection::{Connection, ScriptedConnection, StreamEvent, TransportError};
pub use error::{CharacterError, NotReadyReason};
pub use events::{CharacterEvent, EventKind};
pub use expression::{
    BlendShapeMesh, BlendShapeWeight, ExpressionConfig, ExpressionEngine, ExpressionTable,
};
pub use gesture::{Animator, GestureBridge, GestureConfig, GestureTable};
pub use messages::{CharacterInfo, HistoryRecord, Message, MessageRequest, MessageResponse};
pub use observers::{EventFilter, ObserverRegistry, SubscriberId, Subscription};
pub use queue::{BehaviorConsumer, BehaviorQueue};
pub use voice::{ClipHandle, DisabledVoice, Voice, VoiceChunk, VoiceEvent};
