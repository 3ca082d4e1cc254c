//! Collection config resolution
//!
//! Maps a granule file to its configured destination bucket and url path
//! via the collection's ordered regex rules, and verifies staged objects
//! against declared checksums.

use granary_common::checksum::{self, ChecksumKind};
use granary_common::types::{BucketsConfig, CollectionConfig, FileConfig, GranuleFile};
use granary_common::{IngestError, Result};
use regex::Regex;
use tracing::debug;

use crate::store::ObjectStore;

/// First file config whose regex matches the file name.
///
/// Ordered scan, first match wins (not best match). Invalid regexes in
/// the collection config surface as configuration errors.
pub fn find_file_config<'a>(
    file: &GranuleFile,
    collection: &'a CollectionConfig,
) -> Result<Option<&'a FileConfig>> {
    for config in &collection.files {
        let re = Regex::new(&config.regex).map_err(|e| {
            IngestError::configuration(format!("Invalid file config regex {}: {}", config.regex, e))
        })?;
        if re.is_match(&file.name) {
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Annotate a file with its physical destination bucket and url path.
///
/// The url path falls back from the matched file config to the collection,
/// to the empty string. No matching file config is a configuration error.
pub fn resolve_bucket_and_path(
    mut file: GranuleFile,
    collection: &CollectionConfig,
    buckets: &BucketsConfig,
) -> Result<GranuleFile> {
    let config = find_file_config(&file, collection)?.ok_or_else(|| {
        IngestError::configuration(format!("Cannot find file config for file {}", file.name))
    })?;

    let bucket = buckets.get(&config.bucket).ok_or_else(|| {
        IngestError::configuration(format!(
            "Bucket {} referenced by file config for {} is not configured",
            config.bucket, file.name
        ))
    })?;

    file.bucket = Some(bucket.name.clone());
    file.url_path = Some(
        config
            .url_path
            .clone()
            .or_else(|| collection.url_path.clone())
            .unwrap_or_default(),
    );

    debug!(
        file = %file.name,
        bucket = %bucket.name,
        url_path = file.url_path.as_deref().unwrap_or(""),
        "Resolved destination for file"
    );

    Ok(file)
}

/// Verify a staged object against the checksum declared on the file.
///
/// Files without a declared checksum pass trivially.
pub async fn validate_checksum(
    store: &dyn ObjectStore,
    file: &GranuleFile,
    bucket: &str,
    key: &str,
) -> Result<()> {
    let (Some(checksum_type), Some(expected)) = (&file.checksum_type, &file.checksum_value)
    else {
        return Ok(());
    };

    let kind = ChecksumKind::parse(checksum_type)?;
    let data = store.get(bucket, key).await?;

    if !checksum::matches(kind, &data, expected) {
        return Err(IngestError::InvalidChecksum {
            bucket: bucket.to_string(),
            key: key.to_string(),
            expected: expected.clone(),
            actual: checksum::compute(kind, &data),
        });
    }

    debug!(key = %key, kind = %kind, "Checksum validated");
    Ok(())
}

/// Extract a granule id from a file name using the collection's
/// extraction regex (first capture group)
pub fn get_granule_id(name: &str, extraction_regex: &str) -> Result<String> {
    let fail = || IngestError::GranuleIdExtraction {
        name: name.to_string(),
        regex: extraction_regex.to_string(),
    };

    let re = Regex::new(extraction_regex).map_err(|_| fail())?;
    re.captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(fail)
}
