//! # Error Policy
//!
//! Classification and backoff for watch stream errors. Reconciliation
//! failures never reach this layer: they end up in resource status and are
//! retried by the periodic full reconciliation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{error, warn};

/// Kind of watch stream failure, from the rendered error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    /// Resource version too old; normal after restarts
    Expired,
    /// API server storage reinitializing or throttling
    Throttled,
    /// CRD missing or resource deleted mid-watch
    NotFound,
    Other,
}

/// What the watch loop does after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Continue,
    Restart,
}

pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    // 404 first: a plain text 404 body surfaces as a serde error mentioning WatchFailed
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found {
        return WatchErrorKind::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorKind::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorKind::Throttled;
    }
    if is_not_found {
        return WatchErrorKind::NotFound;
    }
    WatchErrorKind::Other
}

/// Next throttling backoff, doubled and capped
pub fn next_backoff_ms(current_ms: u64, max_backoff_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(max_backoff_ms)
}

/// Handle a watch stream error with classification and backoff
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> StreamAction {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
            );
            error!("Verify the controller can still list KafkaTopics:");
            error!(
                "  kubectl auth can-i list kafkatopics.kafka.octopilot.io --as=system:serviceaccount:<namespace>:kafka-topic-controller"
            );
            warn!(
                "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            StreamAction::Restart
        }
        WatchErrorKind::Expired => {
            warn!(
                "Watch resource version expired (410) - this is normal during pod restarts, watch will restart"
            );
            StreamAction::Restart
        }
        WatchErrorKind::Throttled => {
            let current = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff.store(next_backoff_ms(current, max_backoff_ms), Ordering::Relaxed);
            StreamAction::Restart
        }
        WatchErrorKind::NotFound => {
            warn!(
                "KafkaTopic not found (404) - this may be normal if a resource was deleted or the CRD is missing. Error: {}",
                error_string
            );
            StreamAction::Continue
        }
        WatchErrorKind::Other => {
            error!("Watch stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            StreamAction::Restart
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(
            classify_watch_error("ApiError: Unauthorized (401)"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(
            classify_watch_error("WatchFailed: invalid type: integer `404`"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            classify_watch_error("connection reset by peer"),
            WatchErrorKind::Other
        );
    }

    #[test]
    fn test_not_found_wins_over_unauthorized_text() {
        assert_eq!(
            classify_watch_error("ObjectNotFound after 401 retry"),
            WatchErrorKind::NotFound
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(next_backoff_ms(1_000, 30_000), 2_000);
        assert_eq!(next_backoff_ms(20_000, 30_000), 30_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_grows_backoff() {
        let backoff = AtomicU64::new(1_000);
        let action =
            handle_watch_stream_error("429 TooManyRequests", &backoff, 30_000, Duration::ZERO)
                .await;
        assert_eq!(action, StreamAction::Restart);
        assert_eq!(backoff.load(Ordering::Relaxed), 2_000);
    }
}
