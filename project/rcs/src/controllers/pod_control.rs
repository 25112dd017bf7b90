use crate::api::ApiClient;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use common::{EventRecorder, ObjectMeta, Pod, ReplicationController};
use log::debug;
use std::sync::Arc;

/// Issues replica create and pod delete commands against the control
/// plane. Callers own expectations bookkeeping; errors are returned, not
/// retried.
#[async_trait]
pub trait PodControl: Send + Sync {
    /// Render a pod from the controller's template and POST it.
    async fn create_replica(&self, namespace: &str, rc: &ReplicationController) -> Result<()>;

    async fn delete_pod(&self, namespace: &str, pod_name: &str) -> Result<()>;
}

pub struct RealPodControl {
    client: Arc<dyn ApiClient>,
    recorder: Arc<dyn EventRecorder>,
}

impl RealPodControl {
    pub fn new(client: Arc<dyn ApiClient>, recorder: Arc<dyn EventRecorder>) -> Self {
        Self { client, recorder }
    }
}

#[async_trait]
impl PodControl for RealPodControl {
    async fn create_replica(&self, namespace: &str, rc: &ReplicationController) -> Result<()> {
        let template = &rc.spec.template;
        let pod = Pod {
            api_version: rc.api_version.clone(),
            kind: "Pod".to_string(),
            metadata: ObjectMeta {
                generate_name: format!("{}-", rc.metadata.name),
                namespace: namespace.to_string(),
                labels: template.metadata.labels.clone(),
                annotations: template.metadata.annotations.clone(),
                ..Default::default()
            },
            spec: template.spec.clone(),
            ..Default::default()
        };
        if pod.metadata.labels.is_empty() {
            bail!(
                "unable to create pod replica for {}, no labels on pod template",
                rc.metadata.key()
            );
        }

        match self.client.create_pod(namespace, pod).await {
            Ok(created) => {
                debug!(
                    "controller {} created pod {}",
                    rc.metadata.name, created.metadata.name
                );
                self.recorder.event(
                    &rc.metadata,
                    "successfulCreate",
                    &format!("Created pod: {}", created.metadata.name),
                );
                Ok(())
            }
            Err(err) => {
                self.recorder.event(
                    &rc.metadata,
                    "failedCreate",
                    &format!("Error creating: {err}"),
                );
                Err(err).with_context(|| {
                    format!("unable to create pod replica for {}", rc.metadata.key())
                })
            }
        }
    }

    async fn delete_pod(&self, namespace: &str, pod_name: &str) -> Result<()> {
        self.client
            .delete_pod(namespace, pod_name)
            .await
            .with_context(|| format!("unable to delete pod {namespace}/{pod_name}"))
    }
}
