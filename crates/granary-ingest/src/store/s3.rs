//! S3-backed object store

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use chrono::{DateTime, Utc};
use granary_common::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};

use super::{ObjectMetadata, ObjectStore};

/// S3 connection settings, resolved once at the orchestration boundary
/// and threaded into the engine (never read from ambient state inside it)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}

/// Object store backed by the AWS S3 SDK
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: &StoreConfig) -> Self {
        debug!("Initializing S3 store with config: {:?}", config.endpoint);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "granary-store",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("S3 store client initialized");

        Self { client }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn is_not_found(err: &impl std::fmt::Display) -> bool {
    let msg = err.to_string();
    msg.contains("NotFound") || msg.contains("NoSuchKey") || msg.contains("404")
}

fn to_metadata(
    key: &str,
    size: Option<i64>,
    last_modified: Option<&aws_sdk_s3::primitives::DateTime>,
) -> ObjectMetadata {
    let last_modified = last_modified
        .and_then(|dt| DateTime::<Utc>::from_timestamp_millis(dt.to_millis().unwrap_or(0)))
        .unwrap_or_else(Utc::now);

    ObjectMetadata {
        key: key.to_string(),
        size: size.unwrap_or(0),
        last_modified,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}/{}", body.len(), bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                IngestError::storage(format!("Failed to upload s3://{}/{}: {}", bucket, key, e))
            })?;

        Ok(())
    }

    async fn put_if_absent(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<bool> {
        // Conditional write: S3 rejects the put with 412 when the key exists
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .if_none_match("*")
            .body(ByteStream::from(body))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("PreconditionFailed") || msg.contains("412") {
                    Ok(false)
                } else {
                    Err(IngestError::storage(format!(
                        "Failed conditional put to s3://{}/{}: {}",
                        bucket, key, e
                    )))
                }
            },
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                IngestError::storage(format!("Failed to download s3://{}/{}: {}", bucket, key, e))
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| {
                IngestError::storage(format!(
                    "Failed to read body of s3://{}/{}: {}",
                    bucket, key, e
                ))
            })?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => Ok(Some(to_metadata(
                key,
                response.content_length(),
                response.last_modified(),
            ))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(IngestError::storage(format!(
                "Failed to head s3://{}/{}: {}",
                bucket, key, e
            ))),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMetadata>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| {
                IngestError::storage(format!(
                    "Failed to list s3://{}/{}: {}",
                    bucket, prefix, e
                ))
            })?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key()
                    .map(|k| to_metadata(k, obj.size(), obj.last_modified()))
            })
            .collect();

        Ok(objects)
    }

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<()> {
        debug!(
            "Copying s3://{}/{} to s3://{}/{}",
            source_bucket, source_key, dest_bucket, dest_key
        );

        let copy_source = format!("{}/{}", source_bucket, source_key);

        self.client
            .copy_object()
            .bucket(dest_bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| {
                IngestError::storage(format!(
                    "Failed to copy s3://{} to s3://{}/{}: {}",
                    copy_source, dest_bucket, dest_key, e
                ))
            })?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        debug!("Deleting s3://{}/{}", bucket, key);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                IngestError::storage(format!("Failed to delete s3://{}/{}: {}", bucket, key, e))
            })?;

        Ok(())
    }
}
