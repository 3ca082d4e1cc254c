//! Distributed download lock
//!
//! Short-lived mutual exclusion keyed by (bucket, provider, resource),
//! backed by lock records in the staging bucket. A record is live while
//! its age is under [`LOCK_TTL`]; stale records are reclaimed, so a
//! crashed worker self-heals once the TTL passes. Atomicity comes from
//! the store's conditional put.

use chrono::Utc;
use granary_common::types::Provider;
use granary_common::Result;
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::ObjectStore;

/// Lock records older than this are considered expired.
/// Must comfortably exceed a single-file transfer.
pub const LOCK_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of acquisition attempts before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between acquisition attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

fn lock_key(provider_id: &str, resource_key: &str) -> String {
    format!("lock/{}/{}", provider_id, resource_key.trim_start_matches('/'))
}

/// Attempt to acquire the download lock with default retry settings
pub async fn proceed(
    store: &dyn ObjectStore,
    bucket: &str,
    provider: &Provider,
    resource_key: &str,
) -> Result<bool> {
    proceed_with_retries(
        store,
        bucket,
        provider,
        resource_key,
        DEFAULT_MAX_RETRIES,
        DEFAULT_RETRY_DELAY,
    )
    .await
}

/// Attempt to acquire the download lock.
///
/// Returns `true` once this caller owns the lock. Returns `false` when a
/// live lock remained in place through all attempts; the caller must
/// abort, not proceed. Retries suspend the calling task for `retry_delay`
/// between attempts.
pub async fn proceed_with_retries(
    store: &dyn ObjectStore,
    bucket: &str,
    provider: &Provider,
    resource_key: &str,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<bool> {
    let key = lock_key(provider.lock_id(), resource_key);

    for attempt in 0..=max_retries {
        match store.head(bucket, &key).await? {
            Some(existing) => {
                let age = Utc::now().signed_duration_since(existing.last_modified);
                if age.to_std().map(|a| a >= LOCK_TTL).unwrap_or(false) {
                    // Expired records are overwritten rather than contended for;
                    // the TTL is the safety net for crashed holders
                    debug!(key = %key, ?age, "Reclaiming expired lock");
                    store
                        .put(bucket, &key, Utc::now().to_rfc3339().into_bytes())
                        .await?;
                    return Ok(true);
                }
            },
            None => {
                if try_acquire(store, bucket, &key).await? {
                    return Ok(true);
                }
            },
        }

        if attempt < max_retries {
            debug!(
                key = %key,
                attempt = attempt + 1,
                "Lock held elsewhere, retrying after delay"
            );
            tokio::time::sleep(retry_delay).await;
        }
    }

    warn!(key = %key, "Lock remained in place after {} attempts", max_retries + 1);
    Ok(false)
}

async fn try_acquire(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<bool> {
    let body = Utc::now().to_rfc3339().into_bytes();
    store.put_if_absent(bucket, key, body).await
}

/// Release the download lock. Idempotent: releasing an absent lock is
/// not an error.
pub async fn remove_lock(
    store: &dyn ObjectStore,
    bucket: &str,
    provider_id: &str,
    resource_key: &str,
) -> Result<()> {
    let key = lock_key(provider_id, resource_key);
    debug!(key = %key, "Removing download lock");
    store.delete(bucket, &key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use granary_common::types::Protocol;
    use std::sync::Arc;

    fn provider() -> Provider {
        Provider {
            id: Some("test-provider".to_string()),
            protocol: Protocol::S3,
            host: "source-bucket".to_string(),
            port: None,
            username: None,
            password: None,
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store = MemoryStore::new();
        let p = provider();

        assert!(proceed_with_retries(&store, "b", &p, "path/file", 0, Duration::ZERO)
            .await
            .unwrap());
        // Still held: second caller is refused
        assert!(!proceed_with_retries(&store, "b", &p, "path/file", 1, Duration::ZERO)
            .await
            .unwrap());

        remove_lock(&store, "b", p.lock_id(), "path/file").await.unwrap();
        assert!(proceed_with_retries(&store, "b", &p, "path/file", 0, Duration::ZERO)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_remove_lock_is_idempotent() {
        let store = MemoryStore::new();
        let p = provider();
        proceed_with_retries(&store, "b", &p, "f", 0, Duration::ZERO)
            .await
            .unwrap();

        remove_lock(&store, "b", p.lock_id(), "f").await.unwrap();
        // Second removal of the same key is a no-op
        remove_lock(&store, "b", p.lock_id(), "f").await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_resources_do_not_contend() {
        let store = MemoryStore::new();
        let p = provider();

        assert!(proceed_with_retries(&store, "b", &p, "one", 0, Duration::ZERO)
            .await
            .unwrap());
        assert!(proceed_with_retries(&store, "b", &p, "two", 0, Duration::ZERO)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_mutual_exclusion_under_contention() {
        let store = Arc::new(MemoryStore::new());
        let p = provider();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let p = p.clone();
            handles.push(tokio::spawn(async move {
                proceed_with_retries(&*store, "b", &p, "contended", 0, Duration::ZERO)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
