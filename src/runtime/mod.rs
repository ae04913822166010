//! # Runtime
//!
//! Controller runtime: initialization, the watch feeding the batching queue,
//! and watch error handling.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, init_tracing, review_cluster_config, InitializationResult};
pub use watch_loop::run_watch_loop;
