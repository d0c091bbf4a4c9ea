//! Gesture Bridge
//!
//! Maps gesture names to animator triggers and plays them one at a time.
//! The bridge is the step registered with the
//! [`BehaviorQueue`](crate::BehaviorQueue): each gesture triggers its
//! animation and then waits, without blocking the runtime, until the animator
//! reports that the animation state finished a full cycle.
//!
//! # Trigger Resolution
//!
//! - a gesture mapped to an animation clip fires `"{prefix}-{gesture}Trigger"`
//! - a gesture mapped to an animator trigger fires that trigger
//! - anything else is a no-op

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::queue::BehaviorConsumer;

/// Default prefix of clip triggers
pub const DEFAULT_CLIP_TRIGGER_PREFIX: &str = "Gesture";

/// Default interval between animator polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Animation mapped to a gesture name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureConfig {
    /// Gesture name, as sent by the dialogue service
    pub name: String,
    /// Animation clip reference; takes priority over `trigger`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<String>,
    /// Animator trigger name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl GestureConfig {
    /// Gesture played from an animation clip
    pub fn clip(name: impl Into<String>, clip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clip: Some(clip.into()),
            trigger: None,
        }
    }

    /// Gesture played by an animator trigger
    pub fn trigger(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clip: None,
            trigger: Some(trigger.into()),
        }
    }

    /// Resolve the animator trigger this gesture fires
    #[must_use]
    pub fn resolve_trigger(&self, clip_trigger_prefix: &str) -> Option<String> {
        if self.clip.is_some() {
            return Some(format!("{clip_trigger_prefix}-{}Trigger", self.name));
        }
        self.trigger
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

/// Immutable table of configured gestures
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureTable(Vec<GestureConfig>);

impl GestureTable {
    /// Build a table from gestures
    #[must_use]
    pub fn new(gestures: Vec<GestureConfig>) -> Self {
        Self(gestures)
    }

    /// Look up a gesture by name (first match wins)
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&GestureConfig> {
        self.0.iter().find(|g| g.name == name)
    }

    /// Number of gestures
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<GestureConfig>> for GestureTable {
    fn from(gestures: Vec<GestureConfig>) -> Self {
        Self::new(gestures)
    }
}

/// Animation controller driving the character's body
pub trait Animator: Send + Sync {
    /// Fire an animator trigger
    fn set_trigger(&self, name: &str);

    /// Normalized time of the current animation state (1.0 = one full cycle)
    fn normalized_time(&self) -> f32;
}

/// Plays gestures on an animator
#[derive(Clone)]
pub struct GestureBridge {
    table: Arc<GestureTable>,
    animator: Option<Arc<dyn Animator>>,
    clip_trigger_prefix: String,
    poll_interval: Duration,
}

impl GestureBridge {
    /// Create a bridge with default trigger prefix and poll interval
    #[must_use]
    pub fn new(table: GestureTable, animator: Option<Arc<dyn Animator>>) -> Self {
        Self {
            table: Arc::new(table),
            animator,
            clip_trigger_prefix: DEFAULT_CLIP_TRIGGER_PREFIX.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the prefix of clip triggers
    #[must_use]
    pub fn with_clip_trigger_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.clip_trigger_prefix = prefix.into();
        self
    }

    /// Set the interval between animator polls
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The gesture table
    #[must_use]
    pub fn table(&self) -> &GestureTable {
        &self.table
    }

    /// Play a gesture by name and wait for its animation to finish
    ///
    /// Returns `false` if the gesture is unknown or maps to nothing.
    pub async fn trigger_gesture(&self, name: &str) -> bool {
        let Some(gesture) = self.table.get(name) else {
            tracing::warn!(gesture = %name, "Gesture not found");
            return false;
        };

        match gesture.resolve_trigger(&self.clip_trigger_prefix) {
            Some(trigger) => {
                tracing::debug!(gesture = %name, trigger = %trigger, "Triggering gesture");
                self.trigger_animation(&trigger).await
            }
            None => {
                tracing::debug!(gesture = %name, "Gesture has no clip or trigger");
                false
            }
        }
    }

    /// Fire an animator trigger and wait for the animation to finish
    ///
    /// Returns `false` if no animator is attached.
    pub async fn trigger_animation(&self, trigger: &str) -> bool {
        let Some(animator) = &self.animator else {
            tracing::debug!(trigger = %trigger, "No animator attached");
            return false;
        };

        animator.set_trigger(trigger);
        self.wait_until_animation_finished(animator.as_ref()).await;
        true
    }

    async fn wait_until_animation_finished(&self, animator: &dyn Animator) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if animator.normalized_time() >= 1.0 {
                return;
            }
        }
    }
}

impl std::fmt::Debug for GestureBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureBridge")
            .field("gestures", &self.table.len())
            .field("has_animator", &self.animator.is_some())
            .field("clip_trigger_prefix", &self.clip_trigger_prefix)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[async_trait]
impl BehaviorConsumer<Behavior> for GestureBridge {
    async fn consume(&self, item: Behavior) {
        match item {
            Behavior::Gesture(gesture) => {
                self.trigger_gesture(&gesture.name).await;
            }
            other => {
                tracing::debug!(kind = %other.kind(), "Skipping non-gesture behavior");
            }
        }
    }
}
