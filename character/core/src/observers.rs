//! Observer Registry - Typed Publish/Subscribe for Character Events
//!
//! Any number of observers (UI panels, lip-sync, animation layers) subscribe
//! to the character's lifecycle events. Each subscriber owns an unbounded
//! channel so that publishing never blocks the orchestrator and every
//! subscriber sees events in exactly the order they were published.
//!
//! # Architecture
//!
//! ```text
//!                   ObserverRegistry
//!          ┌──────────────────────────────────────────┐
//!          │ HashMap<SubscriberId, (EventFilter, tx)> │
//!          │   - wrapped in Arc<RwLock<>>             │
//!          └───────────────┬──────────────────────────┘
//!                          │ publish(CharacterEvent)
//!          ┌───────────────┼──────────────────┐
//!          │               │                  │
//!    ┌─────▼─────┐   ┌─────▼─────┐      ┌─────▼─────┐
//!    │ Chat UI   │   │ Lip Sync  │      │ Logger    │
//!    │  sub-1    │   │  sub-2    │      │  sub-3    │
//!    └───────────┘   └───────────┘      └───────────┘
//! ```
//!
//! # Lifetime
//!
//! [`Subscription`] is a scoped handle: dropping it unregisters the
//! subscriber. [`ObserverRegistry::clear`] detaches everyone at once (used when
//! the character is disposed); existing subscriptions then drain whatever was
//! already delivered and report the channel as closed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::events::{CharacterEvent, EventKind};

/// Unique identifier of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Set of event kinds a subscriber is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter(u8);

impl EventFilter {
    /// Every event kind
    #[must_use]
    pub fn all() -> Self {
        EventKind::ALL.iter().copied().collect()
    }

    /// No event kinds
    #[must_use]
    pub fn none() -> Self {
        Self(0)
    }

    /// Only the given kinds
    #[must_use]
    pub fn only(kinds: &[EventKind]) -> Self {
        kinds.iter().copied().collect()
    }

    /// Add a kind to the filter
    #[must_use]
    pub fn with(self, kind: EventKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Whether the filter accepts the given kind
    #[must_use]
    pub fn accepts(&self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<EventKind> for EventFilter {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::UnboundedSender<CharacterEvent>,
}

type SubscriberMap = HashMap<SubscriberId, Subscriber>;

/// Registry of event subscribers
///
/// Cheap to clone; clones share the same subscriber set.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<RwLock<SubscriberMap>>,
}

impl ObserverRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events accepted by `filter`
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let id = SubscriberId::next();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().insert(id, Subscriber { filter, tx });
        tracing::debug!(subscriber_id = %id, "Observer subscribed");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        remove_subscriber(&self.inner, id)
    }

    /// Deliver an event to every interested subscriber. Returns the number of
    /// deliveries.
    ///
    /// Subscribers whose receiving end is gone are pruned.
    pub fn publish(&self, event: &CharacterEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let inner = self.inner.read();
            for (id, subscriber) in inner.iter() {
                if !subscriber.filter.accepts(kind) {
                    continue;
                }
                if subscriber.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            let mut inner = self.inner.write();
            for id in closed {
                inner.remove(&id);
                tracing::debug!(subscriber_id = %id, "Pruned closed observer");
            }
        }

        delivered
    }

    /// Detach every subscriber
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let count = inner.len();
        inner.clear();
        if count > 0 {
            tracing::debug!(count, "Observers cleared");
        }
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether a subscriber is registered
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.inner.read().contains_key(&id)
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("subscribers", &self.count())
            .finish()
    }
}

fn remove_subscriber(inner: &RwLock<SubscriberMap>, id: SubscriberId) -> bool {
    let removed = inner.write().remove(&id).is_some();
    if removed {
        tracing::debug!(subscriber_id = %id, "Observer unsubscribed");
    }
    removed
}

/// Scoped subscription handle
///
/// Receives events in publish order. Dropping the handle unregisters it.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<CharacterEvent>,
    registry: Weak<RwLock<SubscriberMap>>,
}

impl Subscription {
    /// Identifier of this subscription
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the registry dropped or
    /// cleared this subscriber and every delivered event was read.
    pub async fn recv(&mut self) -> Option<CharacterEvent> {
        self.rx.recv().await
    }

    /// Take the next delivered event without waiting
    pub fn try_recv(&mut self) -> Option<CharacterEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every delivered event without waiting
    pub fn drain(&mut self) -> Vec<CharacterEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            remove_subscriber(&inner, self.id);
        }
    }
}
