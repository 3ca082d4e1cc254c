//! In-memory object store
//!
//! Test double for the S3 store. Also handy for exercising the engine
//! locally without network access. Timestamps are strictly monotonic per
//! key so overwrite ordering is observable even within one millisecond.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use granary_common::{IngestError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{ObjectMetadata, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    metadata: ObjectMetadata,
}

/// Object store holding everything in a process-local map
#[derive(Default, Clone)]
pub struct MemoryStore {
    objects: Arc<Mutex<HashMap<(String, String), StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(key: &str, body: Vec<u8>, previous: Option<&ObjectMetadata>) -> StoredObject {
        let mut now = Utc::now();
        if let Some(prev) = previous {
            if now <= prev.last_modified {
                now = prev.last_modified + Duration::milliseconds(1);
            }
        }
        StoredObject {
            metadata: ObjectMetadata {
                key: key.to_string(),
                size: body.len() as i64,
                last_modified: now,
            },
            body,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let id = (bucket.to_string(), key.to_string());
        let previous = objects.get(&id).map(|o| o.metadata.clone());
        objects.insert(id, Self::stored(key, body, previous.as_ref()));
        Ok(())
    }

    async fn put_if_absent(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<bool> {
        let mut objects = self.objects.lock().unwrap();
        let id = (bucket.to_string(), key.to_string());
        if objects.contains_key(&id) {
            return Ok(false);
        }
        objects.insert(id, Self::stored(key, body, None));
        Ok(true)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| {
                IngestError::storage(format!("NoSuchKey: s3://{}/{}", bucket, key))
            })
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.metadata.clone()))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMetadata>> {
        let objects = self.objects.lock().unwrap();
        let mut matches: Vec<ObjectMetadata> = objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|(_, o)| o.metadata.clone())
            .collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(matches)
    }

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let body = objects
            .get(&(source_bucket.to_string(), source_key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| {
                IngestError::storage(format!(
                    "NoSuchKey: s3://{}/{}",
                    source_bucket, source_key
                ))
            })?;
        let id = (dest_bucket.to_string(), dest_key.to_string());
        let previous = objects.get(&id).map(|o| o.metadata.clone());
        objects.insert(id, Self::stored(dest_key, body, previous.as_ref()));
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("b", "k", b"data".to_vec()).await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_head_absent_is_none() {
        let store = MemoryStore::new();
        assert!(store.head("b", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_if_absent_respects_existing() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent("b", "k", b"one".to_vec()).await.unwrap());
        assert!(!store.put_if_absent("b", "k", b"two".to_vec()).await.unwrap());
        assert_eq!(store.get("b", "k").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_overwrite_bumps_last_modified() {
        let store = MemoryStore::new();
        store.put("b", "k", b"one".to_vec()).await.unwrap();
        let first = store.head("b", "k").await.unwrap().unwrap();
        store.put("b", "k", b"two".to_vec()).await.unwrap();
        let second = store.head("b", "k").await.unwrap().unwrap();
        assert!(second.last_modified > first.last_modified);
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix_and_bucket() {
        let store = MemoryStore::new();
        store.put("b", "dir/a", b"1".to_vec()).await.unwrap();
        store.put("b", "dir/b", b"2".to_vec()).await.unwrap();
        store.put("b", "other/c", b"3".to_vec()).await.unwrap();
        store.put("x", "dir/d", b"4".to_vec()).await.unwrap();

        let listed = store.list("b", "dir/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["dir/a", "dir/b"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("b", "k", b"data".to_vec()).await.unwrap();
        store.delete("b", "k").await.unwrap();
        store.delete("b", "k").await.unwrap();
        assert!(store.head("b", "k").await.unwrap().is_none());
    }
}
