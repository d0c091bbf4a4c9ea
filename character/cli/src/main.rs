//! Character CLI - Scripted Conversation Runner
//!
//! Connects a character to a scripted, in-process connection, sends each
//! message given on the command line, and prints every character event as a
//! JSON line on stdout. Useful for checking event ordering and behavior
//! dispatch without a dialogue service.
//!
//! # Usage
//!
//! ```bash
//! # Two messages against a script file
//! character-cli --script conversation.json "Hello" "How are you?"
//!
//! # Custom configuration and character id
//! character-cli --config ./character.toml --character-id npc-7 --script s.json "Hi"
//!
//! # Verbose logging
//! RUST_LOG=debug character-cli --script s.json "Hi"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use character_core::connection::ScriptFile;
use character_core::{
    load_config_from_path, Animator, Character, ConfigOverrides, EventFilter, ObserverRegistry,
    ScriptedConnection, Subscription,
};

/// Character CLI - Run scripted conversations against the orchestrator
#[derive(Parser, Debug)]
#[command(name = "character-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHARACTER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Character id (overrides the configuration)
    #[arg(short = 'i', long, value_name = "ID")]
    character_id: Option<String>,

    /// JSON script replayed by the connection
    #[arg(short = 's', long, env = "CHARACTER_SCRIPT", value_name = "FILE")]
    script: Option<PathBuf>,

    /// Do not play gestures
    #[arg(long)]
    no_gestures: bool,

    /// Clear the conversation history before sending
    #[arg(long)]
    clear_history: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CHARACTER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Messages to send, in order
    messages: Vec<String>,
}

/// Animator that logs triggers and reports every clip as finished
struct TracingAnimator;

impl Animator for TracingAnimator {
    fn set_trigger(&self, trigger: &str) {
        info!(trigger = %trigger, "Animation trigger");
    }

    fn normalized_time(&self) -> f32 {
        1.0
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so stdout carries only events.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("character_cli={level},character_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Read a script file
fn read_script(path: &Path) -> Result<ScriptFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script file: {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid script file: {path:?}"))
}

/// Print every event waiting on the subscription as a JSON line
fn print_events(subscription: &mut Subscription) -> Result<()> {
    for event in subscription.drain() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(id) = args.character_id.clone() {
        overrides = overrides.with_character_id(id);
    }
    if args.no_gestures {
        overrides = overrides.with_trigger_gestures(false);
    }
    overrides.apply(&mut config);

    let script = match args.script {
        Some(ref path) => read_script(path)?,
        None => {
            warn!("No script given; messages will fail to stream");
            ScriptFile::default()
        }
    };
    let connection = Arc::new(ScriptedConnection::from_script(script));

    let observers = ObserverRegistry::new();
    let mut subscription = observers.subscribe(EventFilter::all());

    let mut character = Character::builder(config, connection)
        .with_animator(Arc::new(TracingAnimator))
        .with_observers(observers)
        .connect()
        .await
        .context("Failed to connect character")?;
    print_events(&mut subscription)?;

    if args.clear_history {
        character
            .clear_history()
            .await
            .context("Failed to clear history")?;
        print_events(&mut subscription)?;
    }

    for message in &args.messages {
        character
            .send(message)
            .await
            .with_context(|| format!("Failed to send message: {message:?}"))?;
        character.drive_to_completion().await;
        print_events(&mut subscription)?;
    }

    let history = finish(character).await;
    info!(history, "Conversation finished");
    Ok(())
}

/// Let queued gestures play out, then dispose
///
/// Returns the history length as it was before disposal cleared it.
async fn finish(mut character: Character) -> usize {
    character.behavior_queue().wait_idle().await;
    let history = character.history().len();
    character.dispose();
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use character_core::StreamEvent;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_args_parse_messages_and_flags() {
        let args = Args::parse_from([
            "character-cli",
            "--character-id",
            "npc-7",
            "--no-gestures",
            "Hello",
            "Bye",
        ]);
        assert_eq!(args.character_id.as_deref(), Some("npc-7"));
        assert!(args.no_gestures);
        assert!(!args.clear_history);
        assert_eq!(args.messages, vec!["Hello", "Bye"]);
    }

    #[test]
    fn test_read_script() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "behaviors": true,
                "fetch": { "character": { "id": "npc-7", "name": "Ada" } },
                "streams": [[ { "progress": { "text": "Hi" } }, { "complete": {} } ]]
            }"#,
        )
        .unwrap();

        let script = read_script(file.path()).unwrap();
        assert!(script.behaviors);
        assert_eq!(script.ready, None);
        assert_eq!(script.streams.len(), 1);
        assert_eq!(script.streams[0].len(), 2);
    }

    #[tokio::test]
    async fn test_finish_reports_history_before_dispose() {
        let connection = ScriptedConnection::new().with_stream(vec![
            StreamEvent::Progress(serde_json::json!({ "text": "Hi" })),
            StreamEvent::Complete(serde_json::json!({})),
        ]);
        let config = character_core::CharacterConfig::with_id("npc-7");
        let mut character = Character::builder(config, Arc::new(connection))
            .connect()
            .await
            .unwrap();
        character.send("Hello").await.unwrap();
        character.drive_to_completion().await;

        assert_eq!(finish(character).await, 1);
    }

    #[test]
    fn test_read_script_rejects_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = read_script(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid script file"));
    }
}
