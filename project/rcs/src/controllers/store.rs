use common::{Pod, ReplicationController, selector_matches};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// An object held in a [`Store`], addressable by `namespace/name` key and
/// filterable by labels.
pub trait StoreObject: Clone + Send + Sync + 'static {
    fn store_key(&self) -> String;
    fn namespace(&self) -> &str;
    fn labels(&self) -> &HashMap<String, String>;
}

impl StoreObject for Pod {
    fn store_key(&self) -> String {
        self.metadata.key()
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    fn labels(&self) -> &HashMap<String, String> {
        &self.metadata.labels
    }
}

impl StoreObject for ReplicationController {
    fn store_key(&self) -> String {
        self.metadata.key()
    }

    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    fn labels(&self) -> &HashMap<String, String> {
        &self.metadata.labels
    }
}

/// In-memory cache of watched objects, keyed by `namespace/name`.
///
/// The map is ordered so iteration (and therefore first-match selector
/// lookups) is deterministic. Listing hands out clones; the store owns the
/// cached copies and callers must not rely on seeing later mutations.
pub struct Store<T> {
    objects: RwLock<BTreeMap<String, T>>,
}

impl<T: StoreObject> Store<T> {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn add(&self, obj: T) {
        self.objects.write().await.insert(obj.store_key(), obj);
    }

    pub async fn update(&self, obj: T) {
        self.objects.write().await.insert(obj.store_key(), obj);
    }

    pub async fn delete(&self, key: &str) {
        self.objects.write().await.remove(key);
    }

    pub async fn get_by_key(&self, key: &str) -> Option<T> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn list(&self) -> Vec<T> {
        self.objects.read().await.values().cloned().collect()
    }

    /// Snapshot of the objects in `namespace` whose labels match
    /// `selector`. Linear scan; the cache is small enough that a secondary
    /// label index has not been worth it.
    pub async fn list_by_selector(
        &self,
        namespace: &str,
        selector: &HashMap<String, String>,
    ) -> Vec<T> {
        self.objects
            .read()
            .await
            .values()
            .filter(|obj| obj.namespace() == namespace && selector_matches(selector, obj.labels()))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl<T: StoreObject> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ObjectMeta;

    fn pod(name: &str, namespace: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_get_delete_roundtrip() {
        let store = Store::new();
        store.add(pod("web-1", "default", &[("app", "web")])).await;

        assert!(store.get_by_key("default/web-1").await.is_some());
        assert_eq!(store.len().await, 1);

        store.delete("default/web-1").await;
        assert!(store.get_by_key("default/web-1").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn selector_listing_is_namespace_scoped() {
        let store = Store::new();
        store.add(pod("web-1", "default", &[("app", "web")])).await;
        store.add(pod("web-2", "default", &[("app", "web")])).await;
        store.add(pod("web-3", "other", &[("app", "web")])).await;
        store.add(pod("db-1", "default", &[("app", "db")])).await;

        let selector: HashMap<String, String> =
            [("app".to_string(), "web".to_string())].into_iter().collect();
        let matched = store.list_by_selector("default", &selector).await;
        let names: Vec<&str> = matched.iter().map(|p| p.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["web-1", "web-2"]);
    }

    #[tokio::test]
    async fn listing_returns_a_snapshot() {
        let store = Store::new();
        store.add(pod("web-1", "default", &[("app", "web")])).await;

        let mut listed = store.list().await;
        listed[0].metadata.name = "mutated".to_string();

        let cached = store.get_by_key("default/web-1").await.unwrap();
        assert_eq!(cached.metadata.name, "web-1");
    }
}
