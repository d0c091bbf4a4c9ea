//! Connection Layer
//!
//! Abstraction over the dialogue service. The orchestrator only depends on
//! the [`Connection`] trait; [`ScriptedConnection`] replays canned replies
//! in-process for tests and the command-line driver.

mod scripted;
mod traits;

pub use scripted::{ScriptedConnection, ScriptFile};
pub use traits::{fetch_json, Connection, StreamEvent, TransportError};

/// Event names understood by the dialogue service
pub mod events {
    /// Fetch character info
    pub const CHARACTER: &str = "character";
    /// Fetch message history
    pub const MESSAGE_HISTORY: &str = "messagehistory";
    /// Clear message history
    pub const CLEAR_MESSAGE_HISTORY: &str = "clearmessagehistory";
    /// Stream a reply to a message
    pub const MESSAGE: &str = "message";
}
