//! Work queues connecting the worker pools
//!
//! A [`WorkQueue`] tracks two numbers: how many items are waiting (`len`)
//! and how many were pushed but not yet finished (`outstanding`). An item
//! stays outstanding while a worker holds its [`Claim`], so an empty queue
//! with busy consumers is never mistaken for a finished one.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// FIFO queue shared by one producer side and one consumer pool
#[derive(Debug)]
pub struct WorkQueue<T> {
    name: &'static str,
    items: Mutex<VecDeque<T>>,
    available: Notify,
    outstanding: AtomicUsize,
}

impl<T> WorkQueue<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends an item and wakes one waiting consumer
    pub fn push(&self, item: T) {
        // Count before the item becomes visible so `outstanding` never under-reports
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.lock().push_back(item);
        self.available.notify_one();
    }

    /// Takes the next item without waiting
    pub fn try_pop(self: &Arc<Self>) -> Option<Claim<T>> {
        let item = self.lock().pop_front()?;
        Some(Claim {
            queue: Arc::clone(self),
            item,
        })
    }

    /// Takes the next item, waiting at most `wait` for one to arrive
    ///
    /// Returns `None` on timeout so callers can re-check the shutdown signal.
    pub async fn pop_timeout(self: &Arc<Self>, wait: Duration) -> Option<Claim<T>> {
        let deadline = Instant::now() + wait;
        loop {
            // A push between the check and the await leaves a permit behind
            let notified = self.available.notified();
            if let Some(claim) = self.try_pop() {
                return Some(claim);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Items waiting to be claimed
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items pushed and not yet marked done, whether waiting or claimed
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn task_done(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive hold on one dequeued item
///
/// Dropping the claim marks the item done, whatever happened to it.
/// Anything the holder produces from the item must be pushed downstream
/// before the claim is dropped.
#[derive(Debug)]
pub struct Claim<T> {
    queue: Arc<WorkQueue<T>>,
    item: T,
}

impl<T> Deref for Claim<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T> Drop for Claim<T> {
    fn drop(&mut self) {
        self.queue.task_done();
    }
}
