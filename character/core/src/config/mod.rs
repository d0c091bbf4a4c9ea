//! TOML Configuration File Support
//!
//! Configuration for a character, loaded from a TOML file at
//! `~/.config/character/character.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/character/character.toml` (typically `~/.config/character/character.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [character]
//! id = "npc-42"
//!
//! [behaviors]
//! trigger_gestures = true
//! clip_trigger_prefix = "Gesture"
//!
//! [animation]
//! poll_interval_ms = 16
//!
//! [[expressions]]
//! name = "smile"
//! blend_shapes = [
//!     { name = "mouthSmile", weight = 80.0 },
//!     { name = "cheekRaise", weight = 30.0 },
//! ]
//!
//! [[gestures]]
//! name = "wave"
//! clip = "Wave.anim"
//!
//! [[gestures]]
//! name = "nod"
//! trigger = "NodTrigger"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expression::{ExpressionConfig, ExpressionTable};
use crate::gesture::{GestureConfig, GestureTable, DEFAULT_CLIP_TRIGGER_PREFIX, DEFAULT_POLL_INTERVAL};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Character section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterSectionToml {
    /// Character identifier on the dialogue service
    pub id: Option<String>,
}

/// Behaviors section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorsToml {
    /// Whether gesture behaviors are played
    pub trigger_gestures: Option<bool>,

    /// Prefix of animator triggers for clip gestures
    pub clip_trigger_prefix: Option<String>,
}

/// Animation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationToml {
    /// Interval between animator polls while waiting for a gesture, in milliseconds
    pub poll_interval_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterToml {
    /// Character section
    pub character: CharacterSectionToml,

    /// Behaviors section
    pub behaviors: BehaviorsToml,

    /// Animation section
    pub animation: AnimationToml,

    /// Expression table
    pub expressions: Vec<ExpressionConfig>,

    /// Gesture table
    pub gestures: Vec<GestureConfig>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Configuration of a character
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct CharacterConfig {
    /// Character identifier on the dialogue service
    pub character_id: String,

    /// Whether gesture behaviors are played
    pub trigger_gestures: bool,

    /// Prefix of animator triggers for clip gestures
    pub clip_trigger_prefix: String,

    /// Interval between animator polls while waiting for a gesture
    pub animation_poll_interval: Duration,

    /// Expression table
    pub expressions: ExpressionTable,

    /// Gesture table
    pub gestures: GestureTable,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            character_id: String::new(),
            trigger_gestures: true,
            clip_trigger_prefix: DEFAULT_CLIP_TRIGGER_PREFIX.to_string(),
            animation_poll_interval: DEFAULT_POLL_INTERVAL,
            expressions: ExpressionTable::default(),
            gestures: GestureTable::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CharacterConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration for a character id
    pub fn with_id(character_id: impl Into<String>) -> Self {
        Self {
            character_id: character_id.into(),
            ..Self::default()
        }
    }

    /// Set the expression table
    #[must_use]
    pub fn with_expressions(mut self, expressions: impl Into<ExpressionTable>) -> Self {
        self.expressions = expressions.into();
        self
    }

    /// Set the gesture table
    #[must_use]
    pub fn with_gestures(mut self, gestures: impl Into<GestureTable>) -> Self {
        self.gestures = gestures.into();
        self
    }

    /// Enable or disable gesture playback
    #[must_use]
    pub fn with_trigger_gestures(mut self, enabled: bool) -> Self {
        self.trigger_gestures = enabled;
        self
    }

    /// Set the animator poll interval
    #[must_use]
    pub fn with_animation_poll_interval(mut self, interval: Duration) -> Self {
        self.animation_poll_interval = interval;
        self
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that the configuration can drive a character
    ///
    /// # Errors
    ///
    /// Returns a validation error if the character id is empty or the poll
    /// interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.character_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "character id is required".to_string(),
            ));
        }
        if self.animation_poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "animation poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/character/character.toml` or
/// `~/.config/character/character.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("character").join("character.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<CharacterConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CharacterConfig, ConfigError> {
    let mut config = CharacterConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CharacterToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut CharacterConfig, toml: CharacterToml) {
    if let Some(id) = toml.character.id {
        config.character_id = id;
    }

    if let Some(enabled) = toml.behaviors.trigger_gestures {
        config.trigger_gestures = enabled;
    }
    if let Some(prefix) = toml.behaviors.clip_trigger_prefix {
        config.clip_trigger_prefix = prefix;
    }

    if let Some(ms) = toml.animation.poll_interval_ms {
        config.animation_poll_interval = Duration::from_millis(ms);
    }

    config.expressions = ExpressionTable::new(toml.expressions);
    config.gestures = GestureTable::new(toml.gestures);
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut CharacterConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(id) = var("CHARACTER_ID") {
        config.character_id = id;
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = var("CHARACTER_TRIGGER_GESTURES") {
        config.trigger_gestures = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(interval) = var("CHARACTER_ANIMATION_POLL_MS") {
        if let Ok(ms) = interval.parse::<u64>() {
            config.animation_poll_interval = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(prefix) = var("CHARACTER_CLIP_TRIGGER_PREFIX") {
        config.clip_trigger_prefix = prefix;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Character id override
    pub character_id: Option<String>,

    /// Gesture playback override
    pub trigger_gestures: Option<bool>,

    /// Animator poll interval override (milliseconds)
    pub animation_poll_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set character id override
    #[must_use]
    pub fn with_character_id(mut self, id: String) -> Self {
        self.character_id = Some(id);
        self
    }

    /// Set gesture playback override
    #[must_use]
    pub fn with_trigger_gestures(mut self, enabled: bool) -> Self {
        self.trigger_gestures = Some(enabled);
        self
    }

    /// Set animator poll interval override
    #[must_use]
    pub fn with_animation_poll_interval_ms(mut self, ms: u64) -> Self {
        self.animation_poll_interval_ms = Some(ms);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CharacterConfig) {
        if self.character_id.is_some()
            || self.trigger_gestures.is_some()
            || self.animation_poll_interval_ms.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref id) = self.character_id {
            config.character_id = id.clone();
        }
        if let Some(enabled) = self.trigger_gestures {
            config.trigger_gestures = enabled;
        }
        if let Some(ms) = self.animation_poll_interval_ms {
            config.animation_poll_interval = Duration::from_millis(ms);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = CharacterConfig::default();

        assert!(config.character_id.is_empty());
        assert!(config.trigger_gestures);
        assert_eq!(config.clip_trigger_prefix, "Gesture");
        assert_eq!(config.animation_poll_interval, Duration::from_millis(16));
        assert!(config.expressions.is_empty());
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("character"));
            assert!(p.to_string_lossy().ends_with("character.toml"));
        }
    }

    #[test]
    fn test_validate() {
        let err = CharacterConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        assert!(CharacterConfig::with_id("npc-1").validate().is_ok());

        let config = CharacterConfig::with_id("npc-1").with_animation_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let toml_content = r#"
[character]
id = "npc-42"

[behaviors]
trigger_gestures = false
clip_trigger_prefix = "Body"

[animation]
poll_interval_ms = 5

[[expressions]]
name = "smile"
blend_shapes = [
    { name = "mouthSmile", weight = 80.0 },
    { name = "cheekRaise", weight = 30.0 },
]

[[expressions]]
name = "neutral"

[[gestures]]
name = "wave"
clip = "Wave.anim"

[[gestures]]
name = "nod"
trigger = "NodTrigger"
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.character_id, "npc-42");
        assert!(!config.trigger_gestures);
        assert_eq!(config.clip_trigger_prefix, "Body");
        assert_eq!(config.animation_poll_interval, Duration::from_millis(5));
        assert_eq!(config.expressions.len(), 2);
        assert_eq!(
            config.expressions.get("smile").map(|e| e.blend_shapes.len()),
            Some(2)
        );
        assert_eq!(
            config.gestures.get("nod").and_then(|g| g.trigger.as_deref()),
            Some("NodTrigger")
        );
        assert_eq!(config.source(), ConfigSource::File);
        assert!(config.config_file_path.is_some());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[character]\nid = \"a\"\n").unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.character_id, "a");
        assert!(config.trigger_gestures);
        assert_eq!(config.clip_trigger_prefix, "Gesture");
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[character\nid = ").unwrap();

        let err = load_config_from_path(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            load_config_from_path(Some(PathBuf::from("/nonexistent/character.toml"))).unwrap();
        assert!(config.config_file_path.is_none());
    }

    // =========================================================================
    // Environment and CLI Override Tests
    // =========================================================================

    #[test]
    fn test_env_overrides() {
        let mut config = CharacterConfig::with_id("from-file");
        apply_env_config(
            &mut config,
            env(&[
                ("CHARACTER_ID", "from-env"),
                ("CHARACTER_TRIGGER_GESTURES", "false"),
                ("CHARACTER_ANIMATION_POLL_MS", "40"),
                ("CHARACTER_CLIP_TRIGGER_PREFIX", "Anim"),
            ]),
        );

        assert_eq!(config.character_id, "from-env");
        assert!(!config.trigger_gestures);
        assert_eq!(config.animation_poll_interval, Duration::from_millis(40));
        assert_eq!(config.clip_trigger_prefix, "Anim");
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_invalid_number_is_ignored() {
        let mut config = CharacterConfig::default();
        apply_env_config(&mut config, env(&[("CHARACTER_ANIMATION_POLL_MS", "soon")]));

        assert_eq!(config.animation_poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = CharacterConfig::with_id("npc-1");
        ConfigOverrides::new()
            .with_character_id("npc-2".to_string())
            .with_trigger_gestures(false)
            .with_animation_poll_interval_ms(2)
            .apply(&mut config);

        assert_eq!(config.character_id, "npc-2");
        assert!(!config.trigger_gestures);
        assert_eq!(config.animation_poll_interval, Duration::from_millis(2));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = CharacterConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
