//! # Configuration
//!
//! Controller and HTTP server settings, loaded from environment variables.
//!
//! - `controller`: batching, selector, Kafka connection and watch settings
//! - `server`: metrics/probe server settings

mod controller;
mod server;

pub use controller::{parse_label_selector, ConfigError, ControllerConfig, LogFormat};
pub use server::ServerConfig;
