use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, Notify};

/// Deduplicated FIFO of controller keys.
///
/// A key is queued at most once. While a key is being processed (handed
/// out by [`get`](Self::get) but not yet [`done`](Self::done)), further
/// adds mark it dirty instead of queueing it, and [`done`](Self::done)
/// re-enqueues it at the tail. This serializes processing per key without
/// dropping updates that arrive mid-reconcile.
pub struct WorkQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

struct Inner {
    queue: VecDeque<String>,
    // keys needing processing, queued or not
    dirty: HashSet<String>,
    // keys currently handed out to a worker
    processing: HashSet<String>,
    shutting_down: bool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue `key` unless it is already pending. No-op after shutdown.
    pub async fn add(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        if inner.shutting_down || inner.dirty.contains(key) {
            return;
        }
        inner.dirty.insert(key.to_string());
        if !inner.processing.contains(key) {
            inner.queue.push_back(key.to_string());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Block until a key is available or the queue shuts down. Returns
    /// `None` on shutdown once the queue has drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    if !inner.queue.is_empty() {
                        // wake the next waiter; a single stored permit does
                        // not cover multiple queued items
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark processing of `key` complete. Re-enqueues the key if it was
    /// added while in flight.
    pub async fn done(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty.contains(key) {
            inner.queue.push_back(key.to_string());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Reject further adds and unblock all pending getters.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
