//! In-process change feed for scrape job rows.
//!
//! The scrape job repository publishes every insert, update and delete here.
//! Subscribers are scoped to one owner and receive changes through a callback
//! until they unsubscribe.
//!
//! Delivery is at-least-once from the consumer's point of view: a lagging
//! subscriber skips the changes it missed, so consumers should re-derive state
//! from a full fetch rather than patching incrementally.

use std::cell::Cell;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::ScrapeJob;

/// Default number of buffered changes per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// A row-level change to the scrape_jobs table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScrapeJobChange {
    Inserted(ScrapeJob),
    Updated(ScrapeJob),
    Deleted { id: String, owner_id: String },
}

impl ScrapeJobChange {
    pub fn owner_id(&self) -> &str {
        match self {
            Self::Inserted(job) | Self::Updated(job) => &job.owner_id,
            Self::Deleted { owner_id, .. } => owner_id,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Self::Inserted(job) | Self::Updated(job) => &job.id,
            Self::Deleted { id, .. } => id,
        }
    }
}

/// Broadcast hub for scrape job changes. Cloning shares the channel.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ScrapeJobChange>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Publish a change. No-op if nobody is listening.
    pub fn publish(&self, change: ScrapeJobChange) {
        // Ignore send errors (no active receivers)
        let _ = self.tx.send(change);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Call `on_change` for every change to `owner_id`'s scrape jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, owner_id: &str, on_change: F) -> Subscription
    where
        F: Fn(ScrapeJobChange) + Send + Sync + 'static,
    {
        self.listen(owner_id, |change| async move { Some(change) }, on_change)
    }

    /// Listen for `owner_id`'s changes, turning each into a value with
    /// `prepare` before handing it to `deliver`.
    ///
    /// `prepare` may suspend (for example to re-fetch state). Returning `None`
    /// drops the notification.
    pub fn listen<T, P, Fut, D>(&self, owner_id: &str, mut prepare: P, deliver: D) -> Subscription
    where
        T: Send + 'static,
        P: FnMut(ScrapeJobChange) -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        let mut rx = self.tx.subscribe();
        let owner_id = owner_id.to_string();
        let gate = Arc::new(Gate::new());
        let task_gate = gate.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if change.owner_id() != owner_id || !task_gate.is_open() {
                            continue;
                        }
                        let Some(value) = prepare(change).await else {
                            continue;
                        };
                        if !task_gate.deliver(|| deliver(value)) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            "Change feed subscriber for {} lagged, skipped {} changes",
                            owner_id, skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Change feed listener for {} stopped", owner_id);
        });

        Subscription { gate, task }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    /// Gate whose callback is running on this thread, or 0.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Serializes callback delivery against unsubscribe.
struct Gate {
    open: AtomicBool,
    delivery: Mutex<()>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            delivery: Mutex::new(()),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn id(&self) -> usize {
        self as *const Gate as usize
    }

    /// Run `f` unless the gate has closed. Returns false once closed.
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let _lock = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_open() {
            return false;
        }
        let previous = DELIVERING.with(|d| d.replace(self.id()));
        f();
        DELIVERING.with(|d| d.set(previous));
        true
    }

    /// Close the gate and wait for an in-flight callback to finish, unless
    /// that callback is the caller.
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if DELIVERING.with(|d| d.get()) != self.id() {
            drop(self.delivery.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }
}

/// Handle for a change feed listener. Dropping it unsubscribes.
pub struct Subscription {
    gate: Arc<Gate>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivery. Idempotent; once this returns no callback runs.
    pub fn unsubscribe(&self) {
        if self.gate.is_open() {
            debug!("Unsubscribing change feed listener");
        }
        self.gate.close();
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
