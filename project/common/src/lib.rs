use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    /// Prefix the server completes into a unique name when `name` is empty.
    #[serde(rename = "generateName", default)]
    pub generate_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub uid: Uuid,
    #[serde(rename = "resourceVersion", default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ObjectMeta {
    /// Cache key of the object, `namespace/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Phase of a pod lifecycle as reported by the node agent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PodConditionType {
    Ready,
    PodScheduled,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: PodConditionType,
    pub status: ConditionStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Port {
    #[serde(rename = "containerPort")]
    pub container_port: i32,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PodSpec {
    /// Node the pod is scheduled onto; `None` until the scheduler binds it.
    #[serde(rename = "nodeName", default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
    #[serde(rename = "podIP", default)]
    pub pod_ip: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Pod {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    /// A pod is active while its phase is not terminal.
    pub fn is_active(&self) -> bool {
        !matches!(self.status.phase, PodPhase::Succeeded | PodPhase::Failed)
    }

    /// Whether the pod reports a `Ready` condition with status `True`.
    pub fn is_ready(&self) -> bool {
        self.status.conditions.iter().any(|c| {
            c.condition_type == PodConditionType::Ready && c.status == ConditionStatus::True
        })
    }

    /// Whether the scheduler has bound the pod to a node.
    pub fn is_scheduled(&self) -> bool {
        !self.spec.node_name.as_deref().unwrap_or("").is_empty()
    }
}

/// Pod template a controller stamps out replicas from.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ReplicationControllerSpec {
    #[serde(default)]
    pub replicas: i32,
    /// Label selector; a pod belongs to this controller when its labels
    /// are a superset of the selector.
    #[serde(default)]
    pub selector: HashMap<String, String>,
    #[serde(default)]
    pub template: PodTemplateSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ReplicationControllerStatus {
    /// Most recently observed number of active replicas.
    #[serde(default)]
    pub replicas: i32,
}

/// Desired-state object declaring a replica count, pod selector, and pod
/// template.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ReplicationController {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ReplicationControllerSpec,
    #[serde(default)]
    pub status: ReplicationControllerStatus,
}

/// True when every selector entry is present in `labels` with the same
/// value. An empty label set never matches.
pub fn selector_matches(
    selector: &HashMap<String, String>,
    labels: &HashMap<String, String>,
) -> bool {
    if labels.is_empty() {
        return false;
    }
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|val| val == v))
}

/// Fire-and-forget event sink for controller actions.
pub trait EventRecorder: Send + Sync {
    fn event(&self, object: &ObjectMeta, reason: &str, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selector_matches_superset() {
        let selector = labels(&[("app", "web")]);
        assert!(selector_matches(
            &selector,
            &labels(&[("app", "web"), ("tier", "frontend")])
        ));
        assert!(!selector_matches(&selector, &labels(&[("app", "db")])));
        assert!(!selector_matches(&selector, &labels(&[("tier", "frontend")])));
    }

    #[test]
    fn empty_pod_labels_never_match() {
        let selector = labels(&[("app", "web")]);
        assert!(!selector_matches(&selector, &HashMap::new()));
        assert!(!selector_matches(&HashMap::new(), &HashMap::new()));
    }

    #[test]
    fn pod_activity_by_phase() {
        let mut pod = Pod::default();
        for (phase, active) in [
            (PodPhase::Pending, true),
            (PodPhase::Running, true),
            (PodPhase::Unknown, true),
            (PodPhase::Succeeded, false),
            (PodPhase::Failed, false),
        ] {
            pod.status.phase = phase;
            assert_eq!(pod.is_active(), active, "phase {phase:?}");
        }
    }

    #[test]
    fn object_key_is_namespace_and_name() {
        let meta = ObjectMeta {
            name: "foobar".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };
        assert_eq!(meta.key(), "default/foobar");
    }
}
