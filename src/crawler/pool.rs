//! Dequeue loop shared by every worker pool

use super::queue::{Claim, WorkQueue};
use super::shutdown::{ShutdownReason, ShutdownSignal};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-worker wait settings
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Bounded wait on the input queue between shutdown checks
    pub poll_interval: Duration,
    /// Queue-empty time after which the pool raises shutdown itself
    pub idle_timeout: Option<Duration>,
}

/// A worker's view of its input queue
pub(crate) struct Inbox<T> {
    pool: &'static str,
    queue: Arc<WorkQueue<T>>,
    shutdown: ShutdownSignal,
    settings: PoolSettings,
    idle_since: Instant,
}

impl<T> Inbox<T> {
    pub(crate) fn new(
        pool: &'static str,
        queue: Arc<WorkQueue<T>>,
        shutdown: ShutdownSignal,
        settings: PoolSettings,
    ) -> Self {
        Self {
            pool,
            queue,
            shutdown,
            settings,
            idle_since: Instant::now(),
        }
    }

    /// Waits for the next item, or `None` once the worker should exit
    ///
    /// The shutdown signal is checked before every dequeue attempt, so a
    /// worker finishes its current item and then stops.
    pub(crate) async fn next(&mut self) -> Option<Claim<T>> {
        loop {
            if self.shutdown.is_raised() {
                return None;
            }

            if let Some(claim) = self.queue.pop_timeout(self.settings.poll_interval).await {
                self.idle_since = Instant::now();
                return Some(claim);
            }

            if let Some(limit) = self.settings.idle_timeout {
                if self.idle_since.elapsed() >= limit {
                    if self.shutdown.raise(ShutdownReason::IdleTimeout { pool: self.pool }) {
                        tracing::info!(
                            "{} queue idle for {:?}, raising shutdown",
                            self.queue.name(),
                            limit
                        );
                    }
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(idle: Option<Duration>) -> PoolSettings {
        PoolSettings {
            poll_interval: Duration::from_millis(10),
            idle_timeout: idle,
        }
    }

    #[tokio::test]
    async fn test_returns_items_then_stops_on_signal() {
        let queue = Arc::new(WorkQueue::new("links"));
        let shutdown = ShutdownSignal::new();
        queue.push(1u32);

        let mut inbox = Inbox::new("filter", Arc::clone(&queue), shutdown.clone(), settings(None));
        assert_eq!(*inbox.next().await.unwrap(), 1);

        shutdown.raise(ShutdownReason::Drained);
        queue.push(2);
        assert!(inbox.next().await.is_none());
    }

    #[tokio::test]
    async fn test_idle_timeout_raises_signal() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new("fetch"));
        let shutdown = ShutdownSignal::new();
        let mut inbox = Inbox::new(
            "fetcher",
            queue,
            shutdown.clone(),
            settings(Some(Duration::from_millis(30))),
        );

        assert!(inbox.next().await.is_none());
        assert_eq!(
            shutdown.reason(),
            Some(ShutdownReason::IdleTimeout { pool: "fetcher" })
        );
    }
}
