//! Per-pod dispatch layer serializing sync work onto one worker per UID.
//!
//! Every pod UID gets a dedicated long-lived worker task fed through a
//! one-slot channel. Updates arriving while the worker is busy collapse
//! into a single pending slot: only the newest survives, and the `on_done`
//! callback of a superseded update is dropped without being invoked.
//! Callers must not rely on `on_done` firing once per call.

use crate::daemon::runtime::{RuntimeCache, RuntimePod, find_pod_by_uid};
use anyhow::Result;
use common::{EventRecorder, Pod};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, error};
use uuid::Uuid;

/// Completion callback attached to a work update. Not invoked when the
/// update is superseded before delivery.
pub type OnDone = Box<dyn FnOnce() + Send + 'static>;

pub type SyncPodFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Pod sync function supplied by the caller. Must tolerate concurrent
/// invocations for distinct pods; invocations for one pod never overlap.
pub type SyncPodFn = Arc<dyn Fn(Pod, Option<Pod>, RuntimePod) -> SyncPodFuture + Send + Sync>;

/// One unit of work for a pod worker.
pub struct WorkUpdate {
    /// The pod state to reflect.
    pub pod: Pod,
    /// Read-only shadow of the pod from an external source, if any.
    pub mirror_pod: Option<Pod>,
    /// Called when this update has been processed.
    pub on_done: OnDone,
}

#[derive(Debug, Error)]
enum SyncFailure {
    #[error("refreshing runtime cache: {0:#}")]
    RuntimeCache(anyhow::Error),
    #[error("listing runtime pods: {0:#}")]
    ListPods(anyhow::Error),
    #[error("syncing pod: {0:#}")]
    Sync(anyhow::Error),
}

struct WorkerTable {
    // channel feeding each per-pod worker; one buffered slot is enough
    // because only an idle-state send or the worker's own handoff writes it
    pod_updates: HashMap<Uuid, mpsc::Sender<WorkUpdate>>,
    is_working: HashMap<Uuid, bool>,
    // newest update that arrived while the worker was busy
    last_undelivered: HashMap<Uuid, WorkUpdate>,
}

/// Dispatcher owning one worker task per observed pod UID.
pub struct PodWorkers {
    table: Mutex<WorkerTable>,
    runtime_cache: Arc<dyn RuntimeCache>,
    sync_pod_fn: SyncPodFn,
    recorder: Arc<dyn EventRecorder>,
}

impl PodWorkers {
    pub fn new(
        runtime_cache: Arc<dyn RuntimeCache>,
        sync_pod_fn: SyncPodFn,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            table: Mutex::new(WorkerTable {
                pod_updates: HashMap::new(),
                is_working: HashMap::new(),
                last_undelivered: HashMap::new(),
            }),
            runtime_cache,
            sync_pod_fn,
            recorder,
        }
    }

    /// Route `pod` to its worker, spawning one on first sight of the UID.
    /// If the worker is busy the update parks in the pending slot,
    /// replacing (and silently dropping) whatever was parked before.
    pub async fn update_pod(self: &Arc<Self>, pod: Pod, mirror_pod: Option<Pod>, on_done: OnDone) {
        let uid = pod.metadata.uid;
        let mut table = self.table.lock().await;

        let tx = match table.pod_updates.get(&uid) {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = mpsc::channel(1);
                table.pod_updates.insert(uid, tx.clone());
                let workers = Arc::clone(self);
                tokio::spawn(async move { workers.manage_pod_loop(uid, rx).await });
                tx
            }
        };

        let update = WorkUpdate {
            pod,
            mirror_pod,
            on_done,
        };
        if !table.is_working.get(&uid).copied().unwrap_or(false) {
            table.is_working.insert(uid, true);
            if tx.try_send(update).is_err() {
                // cannot happen while the invariant above holds
                error!(%uid, "pod worker channel unexpectedly unavailable");
            }
        } else {
            table.last_undelivered.insert(uid, update);
        }
    }

    /// Drop workers for every UID not in `desired_uids`. Their channels
    /// close, terminating the worker after any in-flight sync, and parked
    /// updates are discarded.
    pub async fn forget_non_existing(&self, desired_uids: &HashSet<Uuid>) {
        let mut table = self.table.lock().await;
        table.pod_updates.retain(|uid, _| desired_uids.contains(uid));
        table.is_working.retain(|uid, _| desired_uids.contains(uid));
        table
            .last_undelivered
            .retain(|uid, _| desired_uids.contains(uid));
    }

    async fn manage_pod_loop(&self, uid: Uuid, mut updates: mpsc::Receiver<WorkUpdate>) {
        // the runtime cache must be at least as fresh as the end of the
        // previous sync for this pod
        let mut min_cache_time: Option<Instant> = None;

        while let Some(work) = updates.recv().await {
            let WorkUpdate {
                pod,
                mirror_pod,
                on_done,
            } = work;

            match self.sync_once(&pod, mirror_pod, min_cache_time).await {
                Ok(()) => {
                    min_cache_time = Some(Instant::now());
                }
                Err(failure @ SyncFailure::Sync(_)) => {
                    error!(pod = %pod.metadata.key(), %uid, "error syncing pod, skipping: {failure}");
                    self.recorder.event(
                        &pod.metadata,
                        "failedSync",
                        &format!("Error syncing pod, skipping: {failure}"),
                    );
                }
                Err(failure) => {
                    error!(pod = %pod.metadata.key(), %uid, "{failure}");
                }
            }

            on_done();
            self.check_for_updates(uid).await;
        }
        debug!(%uid, "pod worker exiting");
    }

    async fn sync_once(
        &self,
        pod: &Pod,
        mirror_pod: Option<Pod>,
        min_cache_time: Option<Instant>,
    ) -> Result<(), SyncFailure> {
        self.runtime_cache
            .refresh_if_stale_since(min_cache_time)
            .await
            .map_err(SyncFailure::RuntimeCache)?;
        let runtime_pods = self
            .runtime_cache
            .get_pods()
            .await
            .map_err(SyncFailure::ListPods)?;
        let runtime_pod = find_pod_by_uid(&runtime_pods, pod.metadata.uid);

        (self.sync_pod_fn)(pod.clone(), mirror_pod, runtime_pod)
            .await
            .map_err(SyncFailure::Sync)
    }

    /// Post-sync handoff: deliver the parked update if one exists (the
    /// channel is empty since this worker just drained it), otherwise mark
    /// the worker idle.
    async fn check_for_updates(&self, uid: Uuid) {
        let mut table = self.table.lock().await;
        if let Some(work) = table.last_undelivered.remove(&uid) {
            if let Some(tx) = table.pod_updates.get(&uid)
                && tx.try_send(work).is_err()
            {
                error!(%uid, "pod worker channel unexpectedly unavailable");
            }
        } else if table.pod_updates.contains_key(&uid) {
            table.is_working.insert(uid, false);
        } else {
            // the UID was forgotten while this worker was busy
            table.is_working.remove(&uid);
        }
    }
}
