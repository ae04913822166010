//! # Controller
//!
//! Core controller modules for the Kafka Topic Controller.
//!
//! - `queue`: bounded, coalescing batching queue fed by the watch
//! - `batch_loop`: single consumer draining the queue into reconciliation batches
//! - `reconciler`: batch reconciliation engine
//! - `server`: HTTP server for metrics and health checks

pub mod batch_loop;
pub mod queue;
pub mod reconciler;
pub mod server;
