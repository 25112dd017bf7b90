use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

/// A container as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeContainer {
    pub id: String,
    pub name: String,
}

/// Runtime view of a pod: the containers actually running under a UID.
/// A default value (nil UID, no containers) stands for "nothing running".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimePod {
    pub uid: Uuid,
    pub name: String,
    pub containers: Vec<RuntimeContainer>,
}

/// Cache over the container runtime's view of running pods.
///
/// Refreshing is the cache's own business; callers only demand a lower
/// bound on freshness before reading.
#[async_trait]
pub trait RuntimeCache: Send + Sync {
    /// Re-list from the runtime if the cached snapshot is older than
    /// `min_cache_time`. `None` accepts whatever the cache holds.
    async fn refresh_if_stale_since(&self, min_cache_time: Option<Instant>) -> Result<()>;

    async fn get_pods(&self) -> Result<Vec<RuntimePod>>;
}

/// The runtime pod with the given UID, or the empty value when nothing is
/// running under it.
pub fn find_pod_by_uid(pods: &[RuntimePod], uid: Uuid) -> RuntimePod {
    pods.iter()
        .find(|pod| pod.uid == uid)
        .cloned()
        .unwrap_or_default()
}
