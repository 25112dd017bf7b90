use anyhow::Result;
use async_trait::async_trait;
use common::{Pod, ReplicationController};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// A watch event delivered on an [`EventStream`].
///
/// The initial state of a watched collection arrives as one `Added` event
/// per object, followed by incremental `Modified`/`Deleted` events.
/// `Deleted` is delivered exactly once per object lifetime.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

/// Stream of watch events for one resource kind. A closed stream means the
/// watch session ended; reconnecting is the producer's concern.
pub type EventStream<T> = mpsc::Receiver<WatchEvent<T>>;

/// Control-plane API surface the reconcile core depends on. No transport
/// is mandated; implementations are injected at construction time.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// List pods in `namespace` whose labels match `selector`. An empty
    /// namespace spans all namespaces; an empty selector matches all pods.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> Result<Vec<Pod>>;

    async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// PUT an updated controller status subresource.
    async fn update_replication_controller_status(
        &self,
        rc: ReplicationController,
    ) -> Result<ReplicationController>;

    async fn watch_replication_controllers(&self) -> Result<EventStream<ReplicationController>>;

    async fn watch_pods(&self) -> Result<EventStream<Pod>>;
}
