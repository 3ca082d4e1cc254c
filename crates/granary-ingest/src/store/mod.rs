//! Object store seam
//!
//! Every collaborator that touches staged objects (protocol adapters, the
//! duplicate resolver, the distributed lock) goes through the
//! [`ObjectStore`] trait, so the engine runs unchanged against real S3 or
//! the in-memory store used by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use granary_common::Result;

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Store, StoreConfig};

/// Metadata of one stored object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

/// Minimal object-store capability set needed by the ingest engine
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, overwriting any existing one
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    /// Write an object only if the key is currently absent.
    ///
    /// Returns `false` when another writer got there first. This is the
    /// atomic primitive the distributed lock is built on.
    async fn put_if_absent(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<bool>;

    /// Read an object's bytes; absent keys are a `Storage` error
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Metadata for a key, or `None` when absent
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Metadata of all objects under a key prefix
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMetadata>>;

    /// Server-side copy between buckets/keys
    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<()>;

    /// Delete an object; deleting an absent key is not an error
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}
