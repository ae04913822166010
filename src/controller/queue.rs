//! # Batching Queue
//!
//! Bounded buffer between the watch task and the batch loop.
//!
//! Items are coalesced per resource: a resource that changes several times
//! before the next drain is reconciled once, at the position of its first
//! pending change, with the latest request. Exceeding the capacity is fatal:
//! the queue stops and signals process shutdown instead of dropping work.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::ControllerConfig;
use crate::crd::{KafkaTopic, ResourceRef};
use crate::observability::metrics;

/// One pending change notification
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    /// Resource added or modified; the engine reads its latest state
    Upsert(ResourceRef),
    /// Resource removed from the store, with its last known state
    Delete(KafkaTopic),
}

impl WorkItem {
    pub fn resource_ref(&self) -> ResourceRef {
        match self {
            WorkItem::Upsert(id) => id.clone(),
            WorkItem::Delete(topic) => topic.resource_ref(),
        }
    }
}

/// Items handed to the engine in one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub items: Vec<WorkItem>,
    /// Reconcile every resource in the store, not only `items`
    pub full_resync: bool,
}

impl Batch {
    pub fn full_resync() -> Self {
        Self {
            items: Vec::new(),
            full_resync: true,
        }
    }

    pub fn of(items: Vec<WorkItem>) -> Self {
        Self {
            items,
            full_resync: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && !self.full_resync
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error(
        "Queue length {0} exceeded, stopping operator. Please increase MAX_QUEUE_SIZE environment variable."
    )]
    Overflow(usize),
    #[error("Batching queue is stopped")]
    Stopped,
}

#[derive(Debug, Default)]
struct Inner {
    order: VecDeque<ResourceRef>,
    pending: HashMap<ResourceRef, WorkItem>,
    full_resync: bool,
    stopped: bool,
}

impl Inner {
    fn has_work(&self) -> bool {
        !self.order.is_empty() || self.full_resync
    }
}

pub struct BatchingQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    max_batch_size: usize,
    linger: Duration,
    ready: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for BatchingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingQueue")
            .field("capacity", &self.capacity)
            .field("max_batch_size", &self.max_batch_size)
            .field("linger", &self.linger)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl BatchingQueue {
    pub fn new(capacity: usize, max_batch_size: usize, linger: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            max_batch_size: max_batch_size.max(1),
            linger,
            ready: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.max_queue_size,
            config.max_batch_size,
            config.max_batch_linger(),
        )
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a change, replacing any pending request for the same resource
    pub fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        let id = item.resource_ref();
        let length = {
            let mut inner = self.inner();
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            if !inner.pending.contains_key(&id) {
                if inner.order.len() >= self.capacity {
                    drop(inner);
                    return Err(self.overflow());
                }
                inner.order.push_back(id.clone());
            }
            inner.pending.insert(id, item);
            inner.order.len()
        };
        metrics::set_queue_length(length);
        self.notify.notify_one();
        Ok(())
    }

    /// Make the next batch reconcile everything
    pub fn enqueue_full_resync(&self) -> Result<(), QueueError> {
        {
            let mut inner = self.inner();
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            inner.full_resync = true;
        }
        self.notify.notify_one();
        Ok(())
    }

    fn overflow(&self) -> QueueError {
        let err = QueueError::Overflow(self.capacity);
        error!("{err}");
        self.stop();
        self.shutdown.send_replace(true);
        err
    }

    /// Wait for work and take the next batch
    ///
    /// The batch is a full resync once `deadline` has passed, with or without
    /// pending work. Returns `None` once the queue is stopped.
    pub async fn drain_until(&self, deadline: Instant) -> Option<Batch> {
        let mut woken_by_deadline = false;
        loop {
            {
                let inner = self.inner();
                if inner.stopped {
                    return None;
                }
                if inner.has_work() {
                    break;
                }
            }
            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep_until(deadline) => {
                    woken_by_deadline = true;
                    break;
                }
            }
        }

        // Pending work never postpones a due full resync
        let due = woken_by_deadline || Instant::now() >= deadline;
        let full = self.len() >= self.max_batch_size;
        if !woken_by_deadline && !full && !self.linger.is_zero() {
            tokio::time::sleep(self.linger).await;
        }

        let (batch, remaining) = {
            let mut inner = self.inner();
            if inner.stopped {
                return None;
            }
            let take = inner.order.len().min(self.max_batch_size);
            let ids: Vec<ResourceRef> = inner.order.drain(..take).collect();
            let items = ids
                .iter()
                .filter_map(|id| inner.pending.remove(id))
                .collect();
            let full_resync = std::mem::take(&mut inner.full_resync) || due;
            (Batch { items, full_resync }, inner.order.len())
        };
        metrics::set_queue_length(remaining);
        debug!(
            items = batch.len(),
            full_resync = batch.full_resync,
            remaining,
            "Drained batch"
        );
        Some(batch)
    }

    /// Stop draining; pending items are abandoned
    pub fn stop(&self) {
        self.inner().stopped = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_alive(&self) -> bool {
        !self.inner().stopped
    }

    /// Set once the initial resource list has been queued
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.is_alive()
    }

    /// Number of distinct resources waiting
    pub fn len(&self) -> usize {
        self.inner().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flips to `true` when the queue overflowed and the process must exit
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
