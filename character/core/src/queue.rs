//! Behavior Queue - Serialized Asynchronous FIFO
//!
//! A single-consumer work queue. Producers [`add`](BehaviorQueue::add) items
//! without waiting; one worker task hands them, oldest first, to the registered
//! [`BehaviorConsumer`] and waits for each step to finish before starting the
//! next one.
//!
//! # Guarantees
//!
//! - Items are stepped in insertion order, including items added while a step
//!   is running
//! - At most one step runs at any time
//! - No item is dropped or stepped twice (until the queue is disposed)
//! - A step that never finishes stalls the queue; later items stay pending
//!
//! # Lifecycle
//!
//! ```text
//!   new() ──▶ add()* ──▶ register(consumer) ──▶ worker spawned
//!                                                   │
//!                 ┌─────────── pop front ◀──────────┤◀── notify on add()
//!                 ▼                                 │
//!         consumer.consume(item).await ─────────────┘
//!
//!   dispose(): pending cleared, worker aborted, add() ignored
//! ```
//!
//! Items added before a consumer is registered are kept and stepped once one
//! is registered.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A step executed for every queued item
///
/// The queue advances when the returned future resolves.
#[async_trait]
pub trait BehaviorConsumer<T>: Send + Sync {
    /// Process one item
    async fn consume(&self, item: T);
}

struct QueueShared<T> {
    pending: Mutex<VecDeque<T>>,
    consumer: RwLock<Option<Arc<dyn BehaviorConsumer<T>>>>,
    /// Wakes the worker when items arrive
    wake: Notify,
    /// Wakes `wait_idle` callers after each step
    idle: Notify,
    busy: AtomicBool,
    disposed: AtomicBool,
    processed: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Serialized asynchronous FIFO
///
/// Cheap to clone; clones share the same queue.
pub struct BehaviorQueue<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> Clone for BehaviorQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Default for BehaviorQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> BehaviorQueue<T> {
    /// Create an empty queue without a consumer
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(QueueShared {
                pending: Mutex::new(VecDeque::new()),
                consumer: RwLock::new(None),
                wake: Notify::new(),
                idle: Notify::new(),
                busy: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                processed: AtomicU64::new(0),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Set the step executed for every item
    ///
    /// The first registration spawns the worker on the current tokio runtime;
    /// later registrations replace the consumer for the following steps.
    pub fn register(&self, consumer: Arc<dyn BehaviorConsumer<T>>) {
        if self.is_disposed() {
            tracing::debug!("Ignoring consumer registration on disposed queue");
            return;
        }

        *self.shared.consumer.write() = Some(consumer);

        let mut worker = self.shared.worker.lock();
        if worker.is_some() {
            tracing::debug!("Behavior queue consumer replaced");
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                *worker = Some(handle.spawn(run_worker(shared)));
                tracing::debug!("Behavior queue worker started");
            }
            Err(e) => {
                tracing::warn!(error = %e, "No tokio runtime; behavior queue will not run");
            }
        }
        drop(worker);

        // Items queued before registration
        self.shared.wake.notify_one();
    }

    /// Enqueue an item. Returns immediately.
    pub fn add(&self, item: T) {
        if self.is_disposed() {
            tracing::debug!("Dropping item added to disposed queue");
            return;
        }
        self.shared.pending.lock().push_back(item);
        self.shared.wake.notify_one();
    }

    /// Discard pending items and stop the worker. Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let discarded = {
            let mut pending = self.shared.pending.lock();
            let n = pending.len();
            pending.clear();
            n
        };

        if let Some(worker) = self.shared.worker.lock().take() {
            worker.abort();
        }
        *self.shared.consumer.write() = None;
        self.shared.busy.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
        self.shared.idle.notify_waiters();

        tracing::debug!(discarded, "Behavior queue disposed");
    }

    /// Number of items waiting to be stepped
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Whether no items are waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a step is currently running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Whether a consumer is registered
    #[must_use]
    pub fn has_consumer(&self) -> bool {
        self.shared.consumer.read().is_some()
    }

    /// Whether the queue was disposed
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Number of completed steps
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::SeqCst)
    }

    /// Whether nothing is pending and no step is running
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let pending = self.shared.pending.lock();
        pending.is_empty() && !self.shared.busy.load(Ordering::SeqCst)
    }

    /// Wait until the queue is idle or disposed
    ///
    /// Never returns while a step is stalled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() || self.is_disposed() {
                return;
            }
            notified.await;
        }
    }
}

impl<T> fmt::Debug for BehaviorQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorQueue")
            .field("pending", &self.shared.pending.lock().len())
            .field("busy", &self.shared.busy.load(Ordering::SeqCst))
            .field("processed", &self.shared.processed.load(Ordering::SeqCst))
            .finish()
    }
}

async fn run_worker<T: Send + 'static>(shared: Arc<QueueShared<T>>) {
    loop {
        if shared.disposed.load(Ordering::SeqCst) {
            break;
        }

        // Pop and mark busy under the same lock so `is_idle` never observes
        // an item that is neither pending nor running.
        let item = {
            let mut pending = shared.pending.lock();
            let item = pending.pop_front();
            if item.is_some() {
                shared.busy.store(true, Ordering::SeqCst);
            }
            item
        };

        let Some(item) = item else {
            shared.idle.notify_waiters();
            shared.wake.notified().await;
            continue;
        };

        let consumer = shared.consumer.read().clone();
        if let Some(consumer) = consumer {
            consumer.consume(item).await;
            shared.processed.fetch_add(1, Ordering::SeqCst);
        }

        shared.busy.store(false, Ordering::SeqCst);
        shared.idle.notify_waiters();
    }
}
