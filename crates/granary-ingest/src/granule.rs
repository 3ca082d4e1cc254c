//! Granule ingest orchestrator
//!
//! Composes the resolver, distributed lock, protocol adapters, and
//! duplicate resolver into one ingest pass: per file, resolve the
//! destination, stage via the provider's adapter, apply the duplicate
//! policy, and validate the checksum. Files are processed strictly
//! sequentially; the first failure releases the lock and aborts the
//! remaining batch.

use granary_common::types::{
    build_s3_uri, join_keys, parse_s3_uri, BucketsConfig, CollectionConfig, DuplicateHandling,
    GranuleFile, Provider,
};
use granary_common::{IngestError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::collection::{resolve_bucket_and_path, validate_checksum};
use crate::duplicate::{self, DuplicateDecision};
use crate::lock;
use crate::protocol::{self, ProtocolAdapter};
use crate::store::{ObjectMetadata, ObjectStore};

/// One granule ingest pass against a single provider and collection
pub struct Ingest {
    store: Arc<dyn ObjectStore>,
    buckets: BucketsConfig,
    collection: CollectionConfig,
    provider: Provider,
    file_staging_dir: String,
    force_download: bool,
    duplicate_handling: DuplicateHandling,
}

impl Ingest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        buckets: BucketsConfig,
        collection: CollectionConfig,
        provider: Provider,
        file_staging_dir: impl Into<String>,
        force_download: bool,
        duplicate_handling: DuplicateHandling,
    ) -> Self {
        Self {
            store,
            buckets,
            collection,
            provider,
            file_staging_dir: file_staging_dir.into(),
            force_download,
            duplicate_handling,
        }
    }

    /// Staging key for a file: `<staging dir>/<collection id>/<name>`,
    /// leading slashes trimmed
    fn staging_key(&self, file: &GranuleFile) -> String {
        let dir = self.file_staging_dir.trim_start_matches('/');
        let collection_id = self.collection.id();
        let prefix = if collection_id.is_empty() {
            dir.to_string()
        } else {
            join_keys(dir, &collection_id)
        };
        join_keys(&prefix, &file.name)
    }

    /// Ingest a batch of files into `download_bucket`.
    ///
    /// The download lock is scoped to the batch's first file path; all
    /// files of the batch share it. Returns the resolved descriptors,
    /// which can outnumber the inputs when the `version` policy kept
    /// old objects alongside new ones.
    pub async fn ingest_granule(
        &self,
        download_bucket: &str,
        files: &[GranuleFile],
    ) -> Result<Vec<GranuleFile>> {
        let Some(first) = files.first() else {
            return Ok(Vec::new());
        };

        let adapter = protocol::adapter_for(&self.provider, self.store.clone())?;
        let resource = first.source_path();

        debug!(
            bucket = %download_bucket,
            provider = %self.provider.lock_id(),
            resource = %resource,
            "Acquiring download lock"
        );
        if !lock::proceed(&*self.store, download_bucket, &self.provider, &resource).await? {
            return Err(IngestError::ResourcesLocked { resource });
        }

        let mut updated = Vec::new();
        for file in files {
            match self.ingest_file(&*adapter, download_bucket, file).await {
                Ok(mut descriptors) => updated.append(&mut descriptors),
                Err(e) => {
                    // Lock must be released before the error surfaces
                    if let Err(unlock_err) = lock::remove_lock(
                        &*self.store,
                        download_bucket,
                        self.provider.lock_id(),
                        &resource,
                    )
                    .await
                    {
                        warn!("Failed to release download lock: {}", unlock_err);
                    }
                    return Err(e);
                },
            }
        }

        lock::remove_lock(
            &*self.store,
            download_bucket,
            self.provider.lock_id(),
            &resource,
        )
        .await?;

        info!(
            count = updated.len(),
            bucket = %download_bucket,
            "Granule ingest complete"
        );
        Ok(updated)
    }

    /// Ingest a single file: resolve, apply duplicate policy, stage,
    /// validate. Returns one descriptor, or old + new when versioning
    /// kept a prior object.
    async fn ingest_file(
        &self,
        adapter: &dyn ProtocolAdapter,
        download_bucket: &str,
        file: &GranuleFile,
    ) -> Result<Vec<GranuleFile>> {
        let resolved = resolve_bucket_and_path(file.clone(), &self.collection, &self.buckets)?;
        let key = self.staging_key(&resolved);

        // forceDownload defeats only the skip-refetch shortcut; the error
        // and version policies keep their semantics under a forced fetch
        let mut decision =
            duplicate::resolve(&*self.store, download_bucket, &key, self.duplicate_handling)
                .await?;
        if self.force_download {
            if let DuplicateDecision::Skip(_) = decision {
                decision = DuplicateDecision::Write;
            }
        }

        match decision {
            DuplicateDecision::Write => {
                let staged = self
                    .stage_and_validate(adapter, &resolved, download_bucket, &key)
                    .await?;
                Ok(vec![self.descriptor(&resolved, download_bucket, &staged)])
            },
            DuplicateDecision::Skip(existing) => {
                debug!(key = %key, "Destination exists, skipping fetch");
                Ok(vec![self.descriptor(&resolved, download_bucket, &existing)])
            },
            DuplicateDecision::Version {
                existing,
                versioned_key,
            } => {
                let staged = self
                    .stage_and_validate(adapter, &resolved, download_bucket, &versioned_key)
                    .await?;
                Ok(vec![
                    self.descriptor(&resolved, download_bucket, &existing),
                    self.descriptor(&resolved, download_bucket, &staged),
                ])
            },
        }
    }

    async fn stage_and_validate(
        &self,
        adapter: &dyn ProtocolAdapter,
        file: &GranuleFile,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectMetadata> {
        debug!(source = %file.source_path(), key = %key, "Staging file");
        adapter.stage(file, &*self.store, bucket, key).await?;

        if let Err(e) = validate_checksum(&*self.store, file, bucket, key).await {
            // Do not leave corrupt data staged
            if matches!(e, IngestError::InvalidChecksum { .. }) {
                if let Err(delete_err) = self.store.delete(bucket, key).await {
                    warn!("Failed to remove corrupt staged object {}: {}", key, delete_err);
                }
            }
            return Err(e);
        }

        self.store.head(bucket, key).await?.ok_or_else(|| {
            IngestError::storage(format!("Staged object vanished: s3://{}/{}", bucket, key))
        })
    }

    fn descriptor(
        &self,
        resolved: &GranuleFile,
        bucket: &str,
        staged: &ObjectMetadata,
    ) -> GranuleFile {
        let mut descriptor = resolved.clone();
        descriptor.filename = Some(build_s3_uri(bucket, &staged.key));
        descriptor.file_staging_dir = Some(self.file_staging_dir.clone());
        descriptor.file_size = Some(staged.size);
        descriptor
    }
}

/// A post-processing move target: files whose name matches `regex` move
/// to `bucket` under `filepath`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveDestination {
    pub regex: String,
    pub bucket: String,
    pub filepath: String,
}

/// Move one staged object between object-store locations (copy + delete)
pub async fn move_granule_file(
    store: &dyn ObjectStore,
    source_bucket: &str,
    source_key: &str,
    dest_bucket: &str,
    dest_key: &str,
) -> Result<()> {
    store
        .copy(source_bucket, source_key, dest_bucket, dest_key)
        .await?;
    store.delete(source_bucket, source_key).await
}

/// Move a granule's staged files to their final destinations.
///
/// Each file goes to the first destination whose regex matches its name;
/// files matching no destination stay where they are. Returns the
/// updated file list.
pub async fn move_granule_files(
    store: &dyn ObjectStore,
    granule_id: &str,
    files: &[GranuleFile],
    destinations: &[MoveDestination],
) -> Result<Vec<GranuleFile>> {
    let mut moved = Vec::with_capacity(files.len());

    for file in files {
        let destination = find_destination(file, destinations)?;

        let Some(destination) = destination else {
            moved.push(file.clone());
            continue;
        };

        let uri = file.filename.as_deref().ok_or_else(|| {
            IngestError::configuration(format!(
                "File {} of granule {} has no staged location",
                file.name, granule_id
            ))
        })?;
        let (source_bucket, source_key) = parse_s3_uri(uri).ok_or_else(|| {
            IngestError::configuration(format!("Invalid staged location {} for {}", uri, file.name))
        })?;

        let dest_key = join_keys(&destination.filepath, &file.name);
        debug!(
            granule = %granule_id,
            from = %uri,
            to = %build_s3_uri(&destination.bucket, &dest_key),
            "Moving granule file"
        );
        move_granule_file(store, source_bucket, source_key, &destination.bucket, &dest_key)
            .await?;

        let mut updated = file.clone();
        updated.bucket = Some(destination.bucket.clone());
        updated.filename = Some(build_s3_uri(&destination.bucket, &dest_key));
        moved.push(updated);
    }

    Ok(moved)
}

fn find_destination<'a>(
    file: &GranuleFile,
    destinations: &'a [MoveDestination],
) -> Result<Option<&'a MoveDestination>> {
    for destination in destinations {
        let re = Regex::new(&destination.regex).map_err(|e| {
            IngestError::configuration(format!(
                "Invalid destination regex {}: {}",
                destination.regex, e
            ))
        })?;
        if re.is_match(&file.name) {
            return Ok(Some(destination));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use granary_common::types::Protocol;

    fn staged_file(name: &str, bucket: &str, key: &str) -> GranuleFile {
        GranuleFile {
            name: name.to_string(),
            filename: Some(build_s3_uri(bucket, key)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_move_granule_file() {
        let store = MemoryStore::new();
        store
            .put("bucket", "origin/test.txt", b"test".to_vec())
            .await
            .unwrap();

        move_granule_file(&store, "bucket", "origin/test.txt", "bucket", "moved/test.txt")
            .await
            .unwrap();

        assert!(store.head("bucket", "origin/test.txt").await.unwrap().is_none());
        assert_eq!(
            store.get("bucket", "moved/test.txt").await.unwrap(),
            b"test"
        );
    }

    #[tokio::test]
    async fn test_move_granule_files_routes_by_regex() {
        let store = MemoryStore::new();
        for name in ["test-one.txt", "test-two.md", "test-three.jpg"] {
            store
                .put("bucket", &format!("origin/{}", name), name.as_bytes().to_vec())
                .await
                .unwrap();
        }

        let files = vec![
            staged_file("test-one.txt", "bucket", "origin/test-one.txt"),
            staged_file("test-two.md", "bucket", "origin/test-two.md"),
            staged_file("test-three.jpg", "bucket", "origin/test-three.jpg"),
        ];
        let destinations = vec![
            MoveDestination {
                regex: r".*\.txt$".to_string(),
                bucket: "bucket".to_string(),
                filepath: "destination".to_string(),
            },
            MoveDestination {
                regex: r".*\.md$".to_string(),
                bucket: "bucket".to_string(),
                filepath: "destination".to_string(),
            },
            MoveDestination {
                regex: r".*\.jpg$".to_string(),
                bucket: "second-bucket".to_string(),
                filepath: "destination".to_string(),
            },
        ];

        let moved = move_granule_files(&store, "g-1", &files, &destinations)
            .await
            .unwrap();

        assert_eq!(moved.len(), 3);
        let first_bucket = store.list("bucket", "").await.unwrap();
        assert_eq!(first_bucket.len(), 2);
        assert!(first_bucket.iter().all(|m| m.key.starts_with("destination")));

        let second_bucket = store.list("second-bucket", "").await.unwrap();
        assert_eq!(second_bucket.len(), 1);
        assert_eq!(second_bucket[0].key, "destination/test-three.jpg");
    }

    #[tokio::test]
    async fn test_move_granule_files_leaves_unmatched_in_place() {
        let store = MemoryStore::new();
        store
            .put("bucket", "origin/included-in-move.txt", b"a".to_vec())
            .await
            .unwrap();
        store
            .put("bucket", "origin/excluded-from-move", b"b".to_vec())
            .await
            .unwrap();

        let files = vec![
            staged_file("included-in-move.txt", "bucket", "origin/included-in-move.txt"),
            staged_file("excluded-from-move", "bucket", "origin/excluded-from-move"),
        ];
        let destinations = vec![MoveDestination {
            regex: r".*\.txt$".to_string(),
            bucket: "second-bucket".to_string(),
            filepath: "destination".to_string(),
        }];

        let moved = move_granule_files(&store, "g-1", &files, &destinations)
            .await
            .unwrap();

        let remaining = store.list("bucket", "").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "origin/excluded-from-move");

        let second = store.list("second-bucket", "").await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].key, "destination/included-in-move.txt");

        // Unmatched file keeps its original descriptor
        assert_eq!(moved[1], files[1]);
    }

    #[test]
    fn test_staging_key_layout() {
        let ingest = Ingest::new(
            Arc::new(MemoryStore::new()),
            Default::default(),
            CollectionConfig {
                name: "MOD09GQ".to_string(),
                version: Some("006".to_string()),
                ..Default::default()
            },
            Provider {
                id: None,
                protocol: Protocol::S3,
                host: "source".to_string(),
                port: None,
                username: None,
                password: None,
            },
            "/file-staging/stack",
            false,
            DuplicateHandling::Replace,
        );

        let file = GranuleFile {
            name: "granule.h5".to_string(),
            ..Default::default()
        };
        assert_eq!(
            ingest.staging_key(&file),
            "file-staging/stack/MOD09GQ__006/granule.h5"
        );
    }
}
