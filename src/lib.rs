//! Kafka Topic Controller Library
//!
//! This library provides the core functionality for the Kafka Topic Controller:
//! a batching reconciliation engine that keeps Kafka topics in line with
//! `KafkaTopic` resources.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use kafka_topic_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod kafka;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
