//! # Batch Loop
//!
//! Single consumer of the batching queue. Each batch is fully reconciled,
//! broker calls and status writes included, before the next drain starts.
//! When no full resync happened for one interval, the drain deadline turns
//! the next batch into one so drift made outside the controller is corrected.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, Instrument};

use crate::controller::queue::{Batch, BatchingQueue};
use crate::controller::reconciler::{BatchSummary, Reconciler};
use crate::observability::metrics;

pub struct BatchLoop {
    queue: Arc<BatchingQueue>,
    reconciler: Reconciler,
    full_reconciliation_interval: Duration,
    batches: u64,
}

impl std::fmt::Debug for BatchLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoop")
            .field("full_reconciliation_interval", &self.full_reconciliation_interval)
            .field("batches", &self.batches)
            .finish_non_exhaustive()
    }
}

impl BatchLoop {
    pub fn new(
        queue: Arc<BatchingQueue>,
        reconciler: Reconciler,
        full_reconciliation_interval: Duration,
    ) -> Self {
        Self {
            queue,
            reconciler,
            full_reconciliation_interval,
            batches: 0,
        }
    }

    /// Run until the queue is stopped, then hand back the reconciler
    pub async fn run(mut self) -> Reconciler {
        info!("Starting batch loop...");
        let mut next_resync = Instant::now() + self.full_reconciliation_interval;
        while let Some(batch) = self.queue.drain_until(next_resync).await {
            if batch.full_resync {
                next_resync = Instant::now() + self.full_reconciliation_interval;
            }
            self.process(batch).await;
        }
        info!(batches = self.batches, "Batch loop stopped");
        self.reconciler
    }

    /// Reconcile one batch and log its summary
    pub async fn process(&mut self, batch: Batch) -> Option<BatchSummary> {
        self.batches += 1;
        let id = self.batches;
        let span = tracing::span!(
            tracing::Level::INFO,
            "controller.batch",
            batch.id = id,
            batch.full_resync = batch.full_resync
        );
        let items = batch.len();
        let full_resync = batch.full_resync;
        let start = std::time::Instant::now();

        let result = self.reconciler.reconcile_batch(batch).instrument(span.clone()).await;
        let elapsed = start.elapsed();
        let _guard = span.enter();
        match result {
            Ok(summary) => {
                metrics::record_batch(summary.resources, elapsed.as_secs_f64());
                info!(
                    items,
                    full_resync,
                    resources = summary.resources,
                    ready = summary.ready,
                    failed = summary.failed,
                    paused = summary.paused,
                    unmanaged = summary.unmanaged,
                    ignored = summary.ignored,
                    deleted = summary.deleted,
                    status_writes = summary.status_writes,
                    duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "[Batch #{id}] Batch reconciliation completed"
                );
                Some(summary)
            }
            Err(e) => {
                error!(
                    items,
                    full_resync,
                    error = %e,
                    "[Batch #{id}] Batch reconciliation failed, will retry on next full reconciliation"
                );
                None
            }
        }
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }
}
