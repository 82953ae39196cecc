//! One-shot shutdown signal shared by the driver and every worker

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Why the pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "reason")]
pub enum ShutdownReason {
    /// Frontier, Link and Fetch queues all reported zero outstanding items
    Drained,
    /// A pool saw its queue empty for longer than the idle threshold
    IdleTimeout { pool: &'static str },
    /// The caller's overall timeout expired
    Timeout,
    /// Interrupted from outside (Ctrl-C)
    Interrupted,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Drained => write!(f, "all queues drained"),
            ShutdownReason::IdleTimeout { pool } => write!(f, "{} pool idle", pool),
            ShutdownReason::Timeout => write!(f, "timeout expired"),
            ShutdownReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Coordinator state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Running,
    Terminating,
}

/// Broadcast, idempotent, one-shot cancellation token
///
/// Clones share the same underlying channel; raising through any clone is
/// observed by all of them. Only the first raise sticks, and its reason is
/// what every observer sees.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the signal
    ///
    /// Returns true if this call was the one that raised it.
    pub fn raise(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn is_raised(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The reason the signal was raised with, if it has been
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    pub fn state(&self) -> CoordinatorState {
        if self.is_raised() {
            CoordinatorState::Terminating
        } else {
            CoordinatorState::Running
        }
    }

    /// Resolves once the signal is raised
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives as long as `self`, so this only fails if it was dropped
            if rx.changed().await.is_err() {
                return self.reason().unwrap_or(ShutdownReason::Interrupted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_starts_running() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_raised());
        assert_eq!(signal.state(), CoordinatorState::Running);
        assert_eq!(signal.reason(), None);
    }

    #[test]
    fn test_raise_is_one_shot() {
        let signal = ShutdownSignal::new();
        assert!(signal.raise(ShutdownReason::Drained));
        assert!(!signal.raise(ShutdownReason::Timeout));
        assert_eq!(signal.reason(), Some(ShutdownReason::Drained));
        assert_eq!(signal.state(), CoordinatorState::Terminating);
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ShutdownSignal::new();
        let sibling = signal.clone();
        sibling.raise(ShutdownReason::Interrupted);
        assert!(signal.is_raised());
        assert_eq!(signal.reason(), Some(ShutdownReason::Interrupted));
    }

    #[tokio::test]
    async fn test_wait_wakes_every_waiter() {
        let signal = ShutdownSignal::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.raise(ShutdownReason::Timeout);

        for waiter in waiters {
            let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reason, ShutdownReason::Timeout);
        }
    }

    #[tokio::test]
    async fn test_wait_after_raise_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.raise(ShutdownReason::Drained);
        assert_eq!(signal.wait().await, ShutdownReason::Drained);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            ShutdownReason::IdleTimeout { pool: "fetcher" }.to_string(),
            "fetcher pool idle"
        );
    }
}
