//! S3 protocol adapter
//!
//! The provider's host names the source bucket on the object store.
//! Staging overrides the default fetch-then-put with a server-side copy,
//! so bytes never transit the worker when both ends are object-store
//! locations.

use async_trait::async_trait;
use granary_common::types::{GranuleFile, Provider};
use granary_common::Result;
use std::sync::Arc;
use tracing::debug;

use super::{ProtocolAdapter, RemoteEntry};
use crate::store::ObjectStore;

pub struct S3Adapter {
    store: Arc<dyn ObjectStore>,
    source_bucket: String,
}

impl S3Adapter {
    pub fn new(provider: &Provider, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            source_bucket: provider.host.clone(),
        }
    }

    fn source_key(file: &GranuleFile) -> String {
        file.source_path().trim_start_matches('/').to_string()
    }
}

#[async_trait]
impl ProtocolAdapter for S3Adapter {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let prefix = path.trim_start_matches('/');
        let objects = self.store.list(&self.source_bucket, prefix).await?;

        Ok(objects
            .into_iter()
            .map(|meta| {
                let name = meta
                    .key
                    .rsplit('/')
                    .next()
                    .unwrap_or(&meta.key)
                    .to_string();
                RemoteEntry {
                    path: meta.key,
                    name,
                    size: Some(meta.size as u64),
                    is_directory: false,
                }
            })
            .collect())
    }

    async fn fetch(&self, file: &GranuleFile) -> Result<Vec<u8>> {
        self.store
            .get(&self.source_bucket, &Self::source_key(file))
            .await
    }

    // Server-side copy fast path: both ends live on the object store
    async fn stage(
        &self,
        file: &GranuleFile,
        store: &dyn ObjectStore,
        bucket: &str,
        key: &str,
    ) -> Result<()> {
        let source_key = Self::source_key(file);
        debug!(
            "Copying s3://{}/{} to s3://{}/{}",
            self.source_bucket, source_key, bucket, key
        );
        store
            .copy(&self.source_bucket, &source_key, bucket, key)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use granary_common::types::Protocol;

    fn provider(bucket: &str) -> Provider {
        Provider {
            id: None,
            protocol: Protocol::S3,
            host: bucket.to_string(),
            port: None,
            username: None,
            password: None,
        }
    }

    fn file(path: &str, name: &str) -> GranuleFile {
        GranuleFile {
            name: name.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_reads_source_bucket() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("source", "pub/granule.h5", b"bytes".to_vec())
            .await
            .unwrap();

        let adapter = S3Adapter::new(&provider("source"), store);
        let data = adapter.fetch(&file("pub", "granule.h5")).await.unwrap();
        assert_eq!(data, b"bytes");
    }

    #[tokio::test]
    async fn test_stage_uses_server_side_copy() {
        let store = Arc::new(MemoryStore::new());
        store
            .put("source", "pub/granule.h5", b"bytes".to_vec())
            .await
            .unwrap();

        let adapter = S3Adapter::new(&provider("source"), store.clone());
        adapter
            .stage(&file("pub", "granule.h5"), &*store, "staging", "dest/key")
            .await
            .unwrap();

        assert_eq!(store.get("staging", "dest/key").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_list_maps_object_metadata() {
        let store = Arc::new(MemoryStore::new());
        store.put("source", "pub/a.h5", b"aa".to_vec()).await.unwrap();
        store.put("source", "pub/b.h5", b"b".to_vec()).await.unwrap();

        let adapter = S3Adapter::new(&provider("source"), store);
        let entries = adapter.list("pub/").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.h5");
        assert_eq!(entries[0].size, Some(2));
    }
}
