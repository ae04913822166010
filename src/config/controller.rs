//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::collections::BTreeMap;
use std::time::Duration;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid label selector '{0}': expected comma separated key=value pairs")]
    InvalidSelector(String),
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
    #[error("MAX_BATCH_SIZE ({batch}) must not exceed MAX_QUEUE_SIZE ({queue})")]
    BatchLargerThanQueue { batch: usize, queue: usize },
}

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace watched for KafkaTopic resources
    /// `None` watches all namespaces
    pub namespace: Option<String>,
    /// Label equality selector a KafkaTopic must match to be reconciled
    pub resource_labels: BTreeMap<String, String>,
    /// Kafka bootstrap servers (comma separated host:port list)
    pub bootstrap_servers: String,
    /// Client id used by the Kafka admin client
    pub kafka_client_id: String,
    /// Timeout for a single broker admin operation (milliseconds)
    pub kafka_operation_timeout_ms: u64,
    /// Hold a finalizer on managed resources so broker topics are deleted
    /// before the resource disappears from the store
    pub use_finalizer: bool,
    /// Maximum number of distinct pending items in the queue
    /// Exceeding it shuts the controller down
    pub max_queue_size: usize,
    /// Maximum number of items reconciled in one batch
    pub max_batch_size: usize,
    /// Time a batch waits to fill up after the first item arrived (milliseconds)
    pub max_batch_linger_ms: u64,
    /// Interval between full resyncs of every selected resource (milliseconds)
    pub full_reconciliation_interval_ms: u64,
    /// Watch stream restart delay after errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Log format (json, text)
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            namespace: None,
            resource_labels: BTreeMap::new(),
            bootstrap_servers: DEFAULT_BOOTSTRAP_SERVERS.to_string(),
            kafka_client_id: DEFAULT_KAFKA_CLIENT_ID.to_string(),
            kafka_operation_timeout_ms: DEFAULT_KAFKA_OPERATION_TIMEOUT_MS,
            use_finalizer: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_linger_ms: DEFAULT_MAX_BATCH_LINGER_MS,
            full_reconciliation_interval_ms: DEFAULT_FULL_RECONCILIATION_INTERVAL_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            log_format: LogFormat::Text,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// Fails when `RESOURCE_LABELS` is malformed or a size/interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        use crate::constants::*;
        let namespace = env_var_or_default_str("WATCH_NAMESPACE", "");
        let config = Self {
            namespace: (!namespace.trim().is_empty()).then(|| namespace.trim().to_string()),
            resource_labels: parse_label_selector(&env_var_or_default_str("RESOURCE_LABELS", ""))?,
            bootstrap_servers: env_var_or_default_str(
                "KAFKA_BOOTSTRAP_SERVERS",
                DEFAULT_BOOTSTRAP_SERVERS,
            ),
            kafka_client_id: env_var_or_default_str("KAFKA_CLIENT_ID", DEFAULT_KAFKA_CLIENT_ID),
            kafka_operation_timeout_ms: env_var_or_default(
                "KAFKA_OPERATION_TIMEOUT_MS",
                DEFAULT_KAFKA_OPERATION_TIMEOUT_MS,
            ),
            use_finalizer: env_var_or_default_bool("USE_FINALIZERS", true),
            max_queue_size: env_var_or_default("MAX_QUEUE_SIZE", DEFAULT_MAX_QUEUE_SIZE),
            max_batch_size: env_var_or_default("MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE),
            max_batch_linger_ms: env_var_or_default(
                "MAX_BATCH_LINGER_MS",
                DEFAULT_MAX_BATCH_LINGER_MS,
            ),
            full_reconciliation_interval_ms: env_var_or_default(
                "FULL_RECONCILIATION_INTERVAL_MS",
                DEFAULT_FULL_RECONCILIATION_INTERVAL_MS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "text")),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the batching loop cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::MustBePositive("MAX_QUEUE_SIZE"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::MustBePositive("MAX_BATCH_SIZE"));
        }
        if self.full_reconciliation_interval_ms == 0 {
            return Err(ConfigError::MustBePositive("FULL_RECONCILIATION_INTERVAL_MS"));
        }
        if self.kafka_operation_timeout_ms == 0 {
            return Err(ConfigError::MustBePositive("KAFKA_OPERATION_TIMEOUT_MS"));
        }
        if self.max_batch_size > self.max_queue_size {
            return Err(ConfigError::BatchLargerThanQueue {
                batch: self.max_batch_size,
                queue: self.max_queue_size,
            });
        }
        Ok(())
    }

    /// Get full resync interval duration
    pub fn full_reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.full_reconciliation_interval_ms)
    }

    /// Get batch linger duration
    pub fn max_batch_linger(&self) -> Duration {
        Duration::from_millis(self.max_batch_linger_ms)
    }

    /// Get Kafka operation timeout duration
    pub fn kafka_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka_operation_timeout_ms)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Render the selector the way `kubectl -l` accepts it
    pub fn label_selector_string(&self) -> String {
        self.resource_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse a `key=value,key2=value2` label selector
///
/// An empty string yields an empty selector, which matches every resource.
pub fn parse_label_selector(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut labels = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ConfigError::InvalidSelector(raw.to_string()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidSelector(raw.to_string()));
        }
        labels.insert(key.to_string(), value.trim().to_string());
    }
    Ok(labels)
}

/// Read environment variable or return default value
pub(super) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
