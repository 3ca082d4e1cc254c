//! Sync-granule task entry point
//!
//! The boundary the workflow runner talks to: a message-shaped event in,
//! a granule record out, or one error from the ingest taxonomy. All
//! configuration arrives in the event; nothing is read from ambient
//! state inside the engine.

use granary_common::types::{
    join_keys, BucketsConfig, CollectionConfig, DuplicateHandling, GranuleFile, Provider,
};
use granary_common::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::collection::get_granule_id;
use crate::granule::Ingest;
use crate::store::ObjectStore;

/// Default root of the staging area, prefixed with the stack name
const DEFAULT_FILE_STAGING_DIR: &str = "file-staging";

/// Input event for one sync-granule invocation
#[derive(Debug, Clone, Deserialize)]
pub struct SyncGranuleEvent {
    pub config: SyncGranuleConfig,
    pub input: SyncGranuleInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncGranuleConfig {
    /// Deployment stack name, used to namespace the staging area
    pub stack: String,

    pub buckets: BucketsConfig,

    #[serde(rename = "forceDownload", default)]
    pub force_download: bool,

    /// Bucket granule files are staged into (and the lock bucket)
    #[serde(rename = "downloadBucket")]
    pub download_bucket: String,

    pub provider: Provider,

    #[serde(rename = "duplicateHandling", default)]
    pub duplicate_handling: Option<DuplicateHandling>,

    #[serde(default)]
    pub collection: Option<CollectionConfig>,

    #[serde(rename = "fileStagingDir", default)]
    pub file_staging_dir: Option<String>,

    #[serde(default)]
    pub pdr: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncGranuleInput {
    pub files: Vec<GranuleFile>,
}

/// Output shape returned to the workflow runner
#[derive(Debug, Clone, Serialize)]
pub struct SyncGranuleOutput {
    pub granules: Vec<GranuleRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdr: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GranuleRecord {
    #[serde(rename = "granuleId")]
    pub granule_id: String,

    pub files: Vec<GranuleFile>,
}

/// Run one sync-granule event against the given staging store.
///
/// The duplicate policy comes from the event config, falling back to the
/// collection's, then to `replace`. The staging dir is
/// `<fileStagingDir or "file-staging">/<stack>`.
pub async fn sync_granule(
    store: Arc<dyn ObjectStore>,
    event: SyncGranuleEvent,
) -> Result<SyncGranuleOutput> {
    let config = event.config;
    let collection = config.collection.unwrap_or_default();

    let duplicate_handling = config
        .duplicate_handling
        .or(collection.duplicate_handling)
        .unwrap_or_default();

    let file_staging_dir = join_keys(
        config
            .file_staging_dir
            .as_deref()
            .unwrap_or(DEFAULT_FILE_STAGING_DIR),
        &config.stack,
    );

    debug!(
        stack = %config.stack,
        staging_dir = %file_staging_dir,
        policy = ?duplicate_handling,
        "Starting sync-granule"
    );

    let granule_id = granule_id_for(&collection, &event.input.files)?;
    let process = collection.process.clone();

    let ingest = Ingest::new(
        store,
        config.buckets,
        collection,
        config.provider,
        file_staging_dir,
        config.force_download,
        duplicate_handling,
    );

    let files = ingest
        .ingest_granule(&config.download_bucket, &event.input.files)
        .await?;

    Ok(SyncGranuleOutput {
        granules: vec![GranuleRecord { granule_id, files }],
        process,
        pdr: config.pdr,
    })
}

/// Granule id from the collection's extraction regex applied to the
/// first file name, falling back to the collection id
fn granule_id_for(collection: &CollectionConfig, files: &[GranuleFile]) -> Result<String> {
    match (&collection.granule_id_extraction, files.first()) {
        (Some(extraction), Some(first)) => get_granule_id(&first.name, extraction),
        _ => Ok(collection.id()),
    }
}
