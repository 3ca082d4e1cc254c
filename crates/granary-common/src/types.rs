//! Common types used across Granary

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport protocol of a provider endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Protocol {
    Ftp,
    Sftp,
    Http,
    Https,
    S3,
}

impl std::str::FromStr for Protocol {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "s3" => Ok(Protocol::S3),
            other => Err(IngestError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Ftp => write!(f, "ftp"),
            Protocol::Sftp => write!(f, "sftp"),
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
            Protocol::S3 => write!(f, "s3"),
        }
    }
}

/// A remote endpoint files are fetched from.
///
/// Immutable for the duration of an ingest call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Provider identifier, used for lock keys when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Transport protocol
    pub protocol: Protocol,

    /// Hostname, or source bucket name for s3 providers
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Provider {
    /// Key identifying this provider in lock records: id when set, host otherwise
    pub fn lock_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.host)
    }
}

/// Policy applied when a destination object already exists at the
/// computed staging key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateHandling {
    /// Fail the ingest with a DuplicateFile error
    Error,
    /// Keep the existing object, do not re-stage
    Skip,
    /// Overwrite the existing object
    #[default]
    Replace,
    /// Keep the existing object and stage the new bytes under a
    /// timestamp-suffixed key
    Version,
}

/// One routing rule of a collection: files whose name matches `regex`
/// are assigned to `bucket`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    pub regex: String,

    pub bucket: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
}

/// Per-dataset ingest rules.
///
/// `files` is ordered; the first matching regex wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,

    #[serde(
        rename = "duplicateHandling",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duplicate_handling: Option<DuplicateHandling>,

    /// Regex whose first capture group extracts the granule id from a
    /// file name
    #[serde(
        rename = "granuleIdExtraction",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub granule_id_extraction: Option<String>,

    /// Downstream processing step name, passed through to the output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,

    #[serde(default)]
    pub files: Vec<FileConfig>,
}

impl CollectionConfig {
    /// Identifier used in staging paths: `name__version` when a version
    /// is configured, `name` otherwise
    pub fn id(&self) -> String {
        match &self.version {
            Some(version) => format!("{}__{}", self.name, version),
            None => self.name.clone(),
        }
    }
}

/// Mapping from a logical bucket name (referenced by `FileConfig.bucket`)
/// to its physical bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Physical bucket name
    pub name: String,

    /// Bucket role (e.g. "internal", "private", "protected", "public")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// All logical-to-physical bucket mappings for a stack
pub type BucketsConfig = HashMap<String, BucketConfig>;

/// One file of a granule, annotated in place as it moves through
/// resolution and staging
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GranuleFile {
    /// File name, matched against collection file configs
    pub name: String,

    /// Remote directory the file lives under on the provider
    #[serde(default)]
    pub path: String,

    /// Staged location as an s3:// URI, set after ingest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Physical destination bucket resolved from the collection config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,

    #[serde(
        rename = "fileStagingDir",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub file_staging_dir: Option<String>,

    #[serde(
        rename = "checksumType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub checksum_type: Option<String>,

    #[serde(
        rename = "checksumValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub checksum_value: Option<String>,

    #[serde(rename = "fileSize", default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

impl GranuleFile {
    /// Remote source path on the provider (`path/name`)
    pub fn source_path(&self) -> String {
        join_keys(&self.path, &self.name)
    }
}

/// Join two key fragments with a single `/`, tolerating trailing and
/// leading slashes on either side
pub fn join_keys(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Build an `s3://bucket/key` URI
pub fn build_s3_uri(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key.trim_start_matches('/'))
}

/// Split an `s3://bucket/key` URI into its bucket and key
pub fn parse_s3_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket, key))
}
