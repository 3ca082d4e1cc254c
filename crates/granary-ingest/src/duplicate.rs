//! Duplicate-file resolution
//!
//! Decides what a file write does when an object already occupies the
//! destination key, according to the collection's duplicate handling
//! policy. Decisions are ephemeral per write and never persisted.

use chrono::{DateTime, Duration, Utc};
use granary_common::types::DuplicateHandling;
use granary_common::{IngestError, Result};
use std::collections::HashSet;

use crate::store::{ObjectMetadata, ObjectStore};

/// Format of the timestamp appended to versioned keys
/// (UTC, millisecond precision)
const VERSION_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3f";

/// Outcome of evaluating the duplicate policy for one destination key
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateDecision {
    /// Destination is free (or policy is replace): write to the key
    Write,
    /// Keep the existing object untouched and do not fetch
    Skip(ObjectMetadata),
    /// Keep the existing object and write under the returned versioned key
    Version {
        existing: ObjectMetadata,
        versioned_key: String,
    },
}

/// Evaluate the duplicate policy against the current state of the
/// destination key.
///
/// Policy `error` does not produce a decision; it fails with
/// `DuplicateFile` so no write is performed.
pub async fn resolve(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    policy: DuplicateHandling,
) -> Result<DuplicateDecision> {
    let existing = match store.head(bucket, key).await? {
        Some(existing) => existing,
        None => return Ok(DuplicateDecision::Write),
    };

    match policy {
        DuplicateHandling::Error => Err(IngestError::DuplicateFile {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }),
        DuplicateHandling::Skip => Ok(DuplicateDecision::Skip(existing)),
        DuplicateHandling::Replace => Ok(DuplicateDecision::Write),
        DuplicateHandling::Version => {
            let versioned_key = unused_versioned_key(store, bucket, key).await?;
            Ok(DuplicateDecision::Version {
                existing,
                versioned_key,
            })
        },
    }
}

/// Versioned siblings of a key: every object staged under
/// `<key>.v<timestamp>`
pub async fn versioned_siblings(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<Vec<ObjectMetadata>> {
    store.list(bucket, &format!("{}.v", key)).await
}

fn versioned_key_at(key: &str, at: DateTime<Utc>) -> String {
    format!("{}.v{}", key, at.format(VERSION_TIMESTAMP_FORMAT))
}

/// Pick a timestamp-suffixed key not already present.
///
/// Same-millisecond writes collide on the suffix; existing siblings are
/// listed and successive milliseconds probed until a free key is found.
async fn unused_versioned_key(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<String> {
    let taken: HashSet<String> = versioned_siblings(store, bucket, key)
        .await?
        .into_iter()
        .map(|m| m.key)
        .collect();

    let mut at = Utc::now();
    loop {
        let candidate = versioned_key_at(key, at);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
        at += Duration::milliseconds(1);
    }
}
