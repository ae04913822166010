//! # Watch Loop
//!
//! Watches `KafkaTopic` resources and feeds change notifications into the
//! batching queue. The watch never reconciles anything itself.
//!
//! The watch runs without a label selector: a resource relabelled out of the
//! selector must still reach the engine so its claim and finalizer are
//! released, and a `Delete` event must mean the resource is really gone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::watcher;
use tracing::{debug, info, warn, Instrument};

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_WATCH_BACKOFF_MAX_MS, DEFAULT_WATCH_BACKOFF_START_MS};
use crate::controller::queue::{BatchingQueue, QueueError, WorkItem};
use crate::controller::server::ServerState;
use crate::crd::KafkaTopic;
use crate::runtime::error_policy::{handle_watch_stream_error, StreamAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchEnd {
    /// Stream finished on its own
    Ended,
    /// Error classified as needing a fresh watch
    Restart,
    /// Queue stopped; no point watching further
    Stopped,
}

/// Translate one watch event into queue operations
///
/// Objects listed during the initial (re)list are not queued one by one:
/// the full resync queued when the list completes covers all of them.
pub fn enqueue_event(
    queue: &BatchingQueue,
    event: watcher::Event<KafkaTopic>,
) -> Result<(), QueueError> {
    match event {
        watcher::Event::Apply(topic) => queue.enqueue(WorkItem::Upsert(topic.resource_ref())),
        watcher::Event::Delete(topic) => queue.enqueue(WorkItem::Delete(topic)),
        watcher::Event::Init => {
            debug!("Watch is listing KafkaTopic resources");
            Ok(())
        }
        watcher::Event::InitApply(_) => Ok(()),
        watcher::Event::InitDone => {
            debug!("Watch list complete, queueing full reconciliation");
            let result = queue.enqueue_full_resync();
            queue.mark_ready();
            result
        }
    }
}

/// Run the watch until shutdown
///
/// Returns an error when the queue overflowed, which must stop the process.
pub async fn run_watch_loop(
    topics: Api<KafkaTopic>,
    queue: Arc<BatchingQueue>,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
) -> Result<()> {
    info!("Starting controller watch loop...");
    let backoff = AtomicU64::new(DEFAULT_WATCH_BACKOFF_START_MS);

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) || !queue.is_alive() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        let end = watch_once(&topics, &queue, &backoff, &config)
            .instrument(watch_span)
            .await?;

        match end {
            WatchEnd::Stopped => break,
            WatchEnd::Restart => debug!("Restarting watch"),
            WatchEnd::Ended => {
                let delay = config.watch_restart_delay_after_end_duration();
                warn!(
                    "Controller watch stream ended, restarting in {} seconds...",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    info!("Controller watch loop stopped");
    Ok(())
}

async fn watch_once(
    topics: &Api<KafkaTopic>,
    queue: &BatchingQueue,
    backoff: &AtomicU64,
    config: &ControllerConfig,
) -> Result<WatchEnd> {
    let mut stream = watcher(topics.clone(), watcher::Config::default()).boxed();
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                backoff.store(DEFAULT_WATCH_BACKOFF_START_MS, Ordering::Relaxed);
                match enqueue_event(queue, event) {
                    Ok(()) => {}
                    Err(QueueError::Stopped) => return Ok(WatchEnd::Stopped),
                    Err(e @ QueueError::Overflow(_)) => return Err(e.into()),
                }
            }
            Err(e) => {
                let action = handle_watch_stream_error(
                    &format!("{e:?}"),
                    backoff,
                    DEFAULT_WATCH_BACKOFF_MAX_MS,
                    config.watch_restart_delay_duration(),
                )
                .await;
                if action == StreamAction::Restart {
                    return Ok(WatchEnd::Restart);
                }
            }
        }
    }
    Ok(WatchEnd::Ended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KafkaTopicSpec, ResourceRef};
    use std::time::Duration;

    fn queue() -> BatchingQueue {
        BatchingQueue::new(10, 10, Duration::ZERO)
    }

    fn topic(name: &str) -> KafkaTopic {
        KafkaTopic::new("ns", name, KafkaTopicSpec::default())
    }

    #[tokio::test]
    async fn test_apply_and_delete_are_queued() {
        let queue = queue();
        enqueue_event(&queue, watcher::Event::Apply(topic("a"))).unwrap();
        enqueue_event(&queue, watcher::Event::Delete(topic("b"))).unwrap();

        let batch = queue
            .drain_until(tokio::time::Instant::now() + Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            batch.items,
            vec![
                WorkItem::Upsert(ResourceRef::new("ns", "a")),
                WorkItem::Delete(topic("b"))
            ]
        );
    }

    #[test]
    fn test_initial_list_becomes_one_full_resync() {
        let queue = queue();
        enqueue_event(&queue, watcher::Event::Init).unwrap();
        enqueue_event(&queue, watcher::Event::InitApply(topic("a"))).unwrap();
        enqueue_event(&queue, watcher::Event::InitApply(topic("b"))).unwrap();
        assert!(queue.is_empty());
        assert!(!queue.is_ready());

        enqueue_event(&queue, watcher::Event::InitDone).unwrap();
        assert!(queue.is_ready());
    }
}
