//! In-memory [`KvStore`] implementation for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;

use super::{KvStore, Namespace};

/// Namespaces held in a `HashMap` behind a `RwLock`.
pub struct InMemoryKvStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Number of namespaces that have been saved at least once.
    pub fn namespace_count(&self) -> usize {
        self.namespaces
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn load(&self, namespace: &str) -> Result<Namespace, StoreError> {
        let guard = self.namespaces.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.get(namespace).cloned().unwrap_or_default())
    }

    async fn save(&self, namespace: &str, entries: &Namespace) -> Result<(), StoreError> {
        let mut guard = self.namespaces.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(namespace.to_string(), entries.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_namespace_is_empty() {
        let store = InMemoryKvStore::new();
        assert!(store.load("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_namespace() {
        let store = InMemoryKvStore::new();
        let mut first = Namespace::new();
        first.insert("a".into(), json!(1));
        first.insert("b".into(), json!(2));
        store.save("ns", &first).await.unwrap();

        let mut second = Namespace::new();
        second.insert("c".into(), json!(3));
        store.save("ns", &second).await.unwrap();

        let loaded = store.load("ns").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["c"], json!(3));
        assert_eq!(store.namespace_count(), 1);
    }
}
