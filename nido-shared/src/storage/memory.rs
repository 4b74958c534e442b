/// In-memory object store
///
/// Backs unit tests and local development without a bucket. Keys map to
/// byte vectors behind an `RwLock`; prefix operations scan the map.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{ObjectMeta, ObjectStore, StorageError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.write().remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut objects = self.write();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StorageError> {
        let mut objects = self.write();
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok((before - objects.len()) as u64)
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let mut metas: Vec<ObjectMeta> = self
            .read()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, bytes)| ObjectMeta {
                key: key.clone(),
                size: bytes.len() as i64,
            })
            .collect();

        metas.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(metas)
    }

    async fn presign_get(&self, key: &str, expires_secs: u64) -> Result<String, StorageError> {
        if !self.read().contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(format!("memory://{key}?expires={expires_secs}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();

        store
            .put("a/b/c.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();

        assert_eq!(store.get("a/b/c.jpg").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            store.get("a/b/missing.jpg").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();

        store.put("x", vec![0], "image/jpeg").await.unwrap();
        store.delete("x").await.unwrap();
        store.delete("x").await.unwrap();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_prefix_counts_removed() {
        let store = MemoryStore::new();

        store.put("p/1", vec![0], "image/jpeg").await.unwrap();
        store.put("p/2", vec![0], "image/jpeg").await.unwrap();
        store.put("q/1", vec![0], "image/jpeg").await.unwrap();

        let removed = store.delete_prefix("p/").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("q/1").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_prefix_reports_sizes() {
        let store = MemoryStore::new();

        store.put("p/a", vec![0; 10], "image/jpeg").await.unwrap();
        store.put("p/b", vec![0; 20], "image/jpeg").await.unwrap();

        let metas = store.list_prefix("p/").await.unwrap();

        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].key, "p/a");
        assert_eq!(metas[0].size, 10);
        assert_eq!(metas[1].size, 20);
    }

    #[tokio::test]
    async fn test_presign_requires_existing_key() {
        let store = MemoryStore::new();

        store.put("k", vec![1], "image/jpeg").await.unwrap();

        let url = store.presign_get("k", 300).await.unwrap();
        assert!(url.contains("expires=300"));

        assert!(store.presign_get("missing", 300).await.is_err());
    }
}
