use crate::api::{ApiClient, EventStream, WatchEvent};
use crate::config::ReplicationConfig;
use crate::controllers::expectations::ExpectationStore;
use crate::controllers::pod_control::{PodControl, RealPodControl};
use crate::controllers::store::Store;
use crate::controllers::workqueue::WorkQueue;
use anyhow::{Result, anyhow};
use common::{EventRecorder, Pod, PodPhase, ReplicationController, selector_matches};
use log::{debug, error, info};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Watch-driven control loop keeping replica pods aligned with each
/// replication controller's desired count.
///
/// Watch handlers map events onto controller keys and feed the work queue;
/// a pool of workers drains the queue through
/// [`sync_replication_controller`](Self::sync_replication_controller). The
/// expectation store keeps the loop from re-acting to creations and
/// deletions it has already issued but not yet observed.
pub struct ReplicationManager {
    client: Arc<dyn ApiClient>,
    pod_control: Arc<dyn PodControl>,
    rc_store: Arc<Store<ReplicationController>>,
    pod_store: Arc<Store<Pod>>,
    expectations: Arc<ExpectationStore>,
    queue: Arc<WorkQueue>,
    worker_count: usize,
    burst_replicas: usize,
    reconcile_period: Duration,
    stop_tx: watch::Sender<bool>,
}

impl ReplicationManager {
    pub fn new(
        client: Arc<dyn ApiClient>,
        recorder: Arc<dyn EventRecorder>,
        config: ReplicationConfig,
    ) -> Self {
        let pod_control = Arc::new(RealPodControl::new(client.clone(), recorder));
        Self::with_pod_control(client, pod_control, config)
    }

    /// Construct with a caller-supplied [`PodControl`], e.g. a recording
    /// fake in tests.
    pub fn with_pod_control(
        client: Arc<dyn ApiClient>,
        pod_control: Arc<dyn PodControl>,
        config: ReplicationConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            client,
            pod_control,
            rc_store: Arc::new(Store::new()),
            pod_store: Arc::new(Store::new()),
            expectations: Arc::new(ExpectationStore::new(config.expectations_ttl())),
            queue: Arc::new(WorkQueue::new()),
            worker_count: config.worker_count,
            burst_replicas: config.burst_replicas,
            reconcile_period: config.reconcile_period(),
            stop_tx,
        }
    }

    /// Cache of known replication controllers, fed by the watch stream.
    pub fn rc_store(&self) -> &Arc<Store<ReplicationController>> {
        &self.rc_store
    }

    /// Cache of known pods, fed by the watch stream.
    pub fn pod_store(&self) -> &Arc<Store<Pod>> {
        &self.pod_store
    }

    pub fn expectations(&self) -> &Arc<ExpectationStore> {
        &self.expectations
    }

    pub fn work_queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Prime the caches and spawn informer tasks, the reconcile worker
    /// pool, and the periodic resync ticker. Returns once everything is
    /// running; [`shutdown`](Self::shutdown) stops all of it.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        info!(
            "starting replication manager with {} workers",
            self.worker_count
        );

        // snapshot the pods first so early reconciles see current state,
        // then follow the watch streams for everything else
        let pods = self.client.list_pods("", &HashMap::new()).await?;
        for pod in pods {
            self.pod_store.add(pod).await;
        }

        let rc_events = self.client.watch_replication_controllers().await?;
        let pod_events = self.client.watch_pods().await?;

        let manager = self.clone();
        let stop = self.stop_tx.subscribe();
        tokio::spawn(async move { manager.run_rc_informer(rc_events, stop).await });

        let manager = self.clone();
        let stop = self.stop_tx.subscribe();
        tokio::spawn(async move { manager.run_pod_informer(pod_events, stop).await });

        for _ in 0..self.worker_count {
            let manager = self.clone();
            tokio::spawn(async move { manager.worker().await });
        }

        let manager = self.clone();
        let stop = self.stop_tx.subscribe();
        tokio::spawn(async move { manager.run_resync(stop).await });

        Ok(())
    }

    /// Stop informers, the resync ticker, and the worker pool.
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        self.queue.shutdown().await;
    }

    async fn worker(&self) {
        while let Some(key) = self.queue.get().await {
            let result = self.sync_replication_controller(&key).await;
            self.queue.done(&key).await;
            if let Err(err) = result {
                error!("error syncing replication controller {key}: {err:#}");
                self.queue.add(&key).await;
            }
        }
    }

    async fn run_rc_informer(
        &self,
        mut events: EventStream<ReplicationController>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                event = events.recv() => {
                    match event {
                        Some(WatchEvent::Added(rc)) => {
                            self.rc_store.add(rc.clone()).await;
                            self.enqueue_controller(&rc).await;
                        }
                        Some(WatchEvent::Modified(rc)) => {
                            self.rc_store.update(rc.clone()).await;
                            self.enqueue_controller(&rc).await;
                        }
                        Some(WatchEvent::Deleted(rc)) => {
                            self.rc_store.delete(&rc.metadata.key()).await;
                            self.enqueue_controller(&rc).await;
                        }
                        None => {
                            info!("replication controller watch stream closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn run_pod_informer(&self, mut events: EventStream<Pod>, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                event = events.recv() => {
                    match event {
                        Some(WatchEvent::Added(pod)) => {
                            self.pod_store.add(pod.clone()).await;
                            self.add_pod(&pod).await;
                        }
                        Some(WatchEvent::Modified(pod)) => {
                            let old = self.pod_store.get_by_key(&pod.metadata.key()).await;
                            self.pod_store.update(pod.clone()).await;
                            match old {
                                Some(old) => self.update_pod(&old, &pod).await,
                                None => self.add_pod(&pod).await,
                            }
                        }
                        Some(WatchEvent::Deleted(pod)) => {
                            self.pod_store.delete(&pod.metadata.key()).await;
                            self.delete_pod(&pod).await;
                        }
                        None => {
                            info!("pod watch stream closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn run_resync(&self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.reconcile_period);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    for rc in self.rc_store.list().await {
                        self.queue.add(&rc.metadata.key()).await;
                    }
                }
            }
        }
    }

    pub async fn enqueue_controller(&self, rc: &ReplicationController) {
        self.queue.add(&rc.metadata.key()).await;
    }

    /// First controller in the pod's namespace whose selector matches the
    /// pod's labels. Overlapping selectors are a misconfiguration; the
    /// first match in cache order wins.
    pub async fn get_pod_controller(&self, pod: &Pod) -> Option<ReplicationController> {
        if pod.metadata.labels.is_empty() {
            return None;
        }
        self.rc_store.list().await.into_iter().find(|rc| {
            rc.metadata.namespace == pod.metadata.namespace
                && selector_matches(&rc.spec.selector, &pod.metadata.labels)
        })
    }

    pub async fn add_pod(&self, pod: &Pod) {
        if let Some(rc) = self.get_pod_controller(pod).await {
            self.expectations.creation_observed(&rc.metadata.key());
            self.enqueue_controller(&rc).await;
        }
    }

    /// Relabeling can move a pod between controllers, so both the old and
    /// the new owner get a sync.
    pub async fn update_pod(&self, old: &Pod, cur: &Pod) {
        let cur_rc = self.get_pod_controller(cur).await;
        if let Some(rc) = &cur_rc {
            self.enqueue_controller(rc).await;
        }
        if old.metadata.labels != cur.metadata.labels
            && let Some(old_rc) = self.get_pod_controller(old).await
            && cur_rc.as_ref().map(|rc| rc.metadata.key()) != Some(old_rc.metadata.key())
        {
            self.enqueue_controller(&old_rc).await;
        }
    }

    pub async fn delete_pod(&self, pod: &Pod) {
        if let Some(rc) = self.get_pod_controller(pod).await {
            self.expectations.deletion_observed(&rc.metadata.key());
            self.enqueue_controller(&rc).await;
        }
    }

    /// One reconcile pass for the controller under `key`.
    ///
    /// Replica management is suppressed while expectations are pending,
    /// but the status update still runs so observers see the current count
    /// during dormancy. Errors are aggregated; the worker requeues the key
    /// on any failure.
    pub async fn sync_replication_controller(&self, key: &str) -> Result<()> {
        let Some(rc) = self.rc_store.get_by_key(key).await else {
            debug!("replication controller {key} has been deleted");
            self.expectations.remove(key);
            return Ok(());
        };

        let pods = self
            .pod_store
            .list_by_selector(&rc.metadata.namespace, &rc.spec.selector)
            .await;
        let active = filter_active_pods(pods);

        let mut errors = Vec::new();
        if self.expectations.satisfied_expectations(key) {
            if let Err(err) = self.manage_replicas(&active, &rc).await {
                errors.push(err);
            }
        } else {
            debug!("{key} waiting on expectations, skipping replica management");
        }

        if active.len() as i32 != rc.status.replicas {
            let mut updated = rc.clone();
            updated.status.replicas = active.len() as i32;
            match self
                .client
                .update_replication_controller_status(updated)
                .await
            {
                Ok(_) => debug!("updated status.replicas of {key} to {}", active.len()),
                Err(err) => errors.push(err.context(format!("unable to update status of {key}"))),
            }
        }

        aggregate_errors(errors)
    }

    /// Issue the creates or deletes needed to close the gap between the
    /// active pod count and the desired replica count, at most
    /// `burst_replicas` per pass.
    async fn manage_replicas(&self, active: &[Pod], rc: &ReplicationController) -> Result<()> {
        let key = rc.metadata.key();
        let diff = active.len() as i64 - rc.spec.replicas as i64;

        if diff < 0 {
            let creates = ((-diff) as usize).min(self.burst_replicas);
            self.expectations.set_expectations(&key, creates as i64, 0);
            info!("{key} has too few replicas, creating {creates}");

            let mut batch = JoinSet::new();
            for _ in 0..creates {
                let pod_control = self.pod_control.clone();
                let expectations = self.expectations.clone();
                let rc = rc.clone();
                let key = key.clone();
                batch.spawn(async move {
                    let result = pod_control.create_replica(&rc.metadata.namespace, &rc).await;
                    if result.is_err() {
                        // the create never happened; un-count it so the
                        // expectation reflects actual outcomes
                        expectations.creation_observed(&key);
                    }
                    result
                });
            }
            collect_batch(batch).await
        } else if diff > 0 {
            let deletes = (diff as usize).min(self.burst_replicas);
            self.expectations.set_expectations(&key, 0, deletes as i64);
            info!("{key} has too many replicas, deleting {deletes}");

            // delete the least useful pods first
            let mut victims = active.to_vec();
            victims.sort_by(pod_deletion_order);

            let mut batch = JoinSet::new();
            for pod in victims.into_iter().take(deletes) {
                let pod_control = self.pod_control.clone();
                let expectations = self.expectations.clone();
                let namespace = rc.metadata.namespace.clone();
                let key = key.clone();
                batch.spawn(async move {
                    let result = pod_control.delete_pod(&namespace, &pod.metadata.name).await;
                    if result.is_err() {
                        expectations.deletion_observed(&key);
                    }
                    result
                });
            }
            collect_batch(batch).await
        } else {
            Ok(())
        }
    }
}

impl Drop for ReplicationManager {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Pods still counted against the desired replica total.
pub fn filter_active_pods(pods: Vec<Pod>) -> Vec<Pod> {
    pods.into_iter().filter(|pod| pod.is_active()).collect()
}

/// Stable "least useful first" ordering for scale-down.
///
/// Unscheduled pods sort before scheduled ones, then Pending before
/// Unknown before Running, then not-ready before ready, with the pod name
/// as a deterministic tie-break.
pub fn pod_deletion_order(a: &Pod, b: &Pod) -> Ordering {
    fn rank(pod: &Pod) -> (u8, u8, u8) {
        let phase = match pod.status.phase {
            PodPhase::Pending => 0,
            PodPhase::Unknown => 1,
            PodPhase::Running => 2,
            PodPhase::Succeeded | PodPhase::Failed => 3,
        };
        (pod.is_scheduled() as u8, phase, pod.is_ready() as u8)
    }
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.metadata.name.cmp(&b.metadata.name))
}

fn aggregate_errors(mut errors: Vec<anyhow::Error>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        n => {
            let first = errors.remove(0);
            Err(anyhow!("{n} errors, first: {first:#}"))
        }
    }
}

async fn collect_batch(mut batch: JoinSet<Result<()>>) -> Result<()> {
    let mut errors = Vec::new();
    while let Some(joined) = batch.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(err),
            Err(err) => errors.push(anyhow!("batch task panicked: {err}")),
        }
    }
    aggregate_errors(errors)
}
