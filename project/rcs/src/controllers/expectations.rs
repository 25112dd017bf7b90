use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Pending creates/deletes a controller has issued but not yet observed
/// through watch events.
#[derive(Debug)]
pub struct PodExpectations {
    adds: AtomicI64,
    dels: AtomicI64,
    timestamp: Instant,
}

impl PodExpectations {
    fn new(adds: i64, dels: i64) -> Self {
        Self {
            adds: AtomicI64::new(adds),
            dels: AtomicI64::new(dels),
            timestamp: Instant::now(),
        }
    }

    /// Counters may go negative when extra observations arrive after the
    /// record was re-armed for a smaller batch; `<= 0` means fulfilled.
    pub fn fulfilled(&self) -> bool {
        self.adds.load(Ordering::SeqCst) <= 0 && self.dels.load(Ordering::SeqCst) <= 0
    }

    pub fn counts(&self) -> (i64, i64) {
        (
            self.adds.load(Ordering::SeqCst),
            self.dels.load(Ordering::SeqCst),
        )
    }
}

/// TTL-indexed map from controller key to pending action counters.
///
/// Counters are decremented by observation callbacks racing with the
/// reconcile loop; records older than the TTL count as satisfied so a lost
/// watch event cannot wedge a controller forever.
pub struct ExpectationStore {
    ttl: Duration,
    entries: DashMap<String, PodExpectations>,
}

impl ExpectationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Overwrite the record for `key` with fresh counters and timestamp.
    pub fn set_expectations(&self, key: &str, adds: i64, dels: i64) {
        self.entries
            .insert(key.to_string(), PodExpectations::new(adds, dels));
    }

    pub fn creation_observed(&self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            entry.adds.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn deletion_observed(&self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            entry.dels.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Current `(adds, dels)` counters, or `None` when no record exists.
    pub fn get_expectations(&self, key: &str) -> Option<(i64, i64)> {
        self.entries.get(key).map(|entry| entry.counts())
    }

    /// True when the controller may act: no record, counters drained, or
    /// the record outlived the TTL. Expired records are evicted lazily.
    pub fn satisfied_expectations(&self, key: &str) -> bool {
        let expired = match self.entries.get(key) {
            None => return true,
            Some(entry) => {
                if entry.fulfilled() {
                    return true;
                }
                entry.timestamp.elapsed() > self.ttl
            }
        };
        if expired {
            self.entries.remove(key);
        }
        expired
    }

    /// Drop the record for `key`, typically when the controller is gone.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
