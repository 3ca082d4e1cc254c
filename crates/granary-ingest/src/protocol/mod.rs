//! Protocol adapters
//!
//! One adapter per transport (FTP, SFTP, HTTP/HTTPS, S3), all behind a
//! single capability trait. Cross-cutting behavior (staging writes,
//! checksum computation) lives outside the adapters; each variant only
//! knows how to list and fetch. Selection is an explicit dispatch table
//! in [`adapter_for`] rather than a class hierarchy.

use async_trait::async_trait;
use granary_common::types::{GranuleFile, Protocol, Provider};
use granary_common::Result;
use std::sync::Arc;

use crate::store::ObjectStore;

pub mod ftp;
pub mod http;
pub mod s3;
pub mod sftp;

pub use ftp::FtpAdapter;
pub use http::HttpAdapter;
pub use s3::S3Adapter;
pub use sftp::SftpAdapter;

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub path: String,
    pub size: Option<u64>,
    pub is_directory: bool,
}

/// Capability contract every transport implements.
///
/// Sessions are scoped to each call: adapters connect, transfer, and
/// release the transport before returning on every exit path.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// List the remote entries under a directory path
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// Fetch the remote bytes of one granule file
    async fn fetch(&self, file: &GranuleFile) -> Result<Vec<u8>>;

    /// Stage the remote file into the destination bucket under `key`.
    ///
    /// Default is fetch-then-put; object-store transports override this
    /// with a server-side copy.
    async fn stage(
        &self,
        file: &GranuleFile,
        store: &dyn ObjectStore,
        bucket: &str,
        key: &str,
    ) -> Result<()> {
        let body = self.fetch(file).await?;
        store.put(bucket, key, body).await
    }
}

/// Build the adapter for a provider's protocol.
///
/// `store` backs the s3 adapter (the provider's host names the source
/// bucket on the same object store); other transports ignore it.
pub fn adapter_for(
    provider: &Provider,
    store: Arc<dyn ObjectStore>,
) -> Result<Box<dyn ProtocolAdapter>> {
    match provider.protocol {
        Protocol::Ftp => Ok(Box::new(FtpAdapter::new(provider))),
        Protocol::Sftp => Ok(Box::new(SftpAdapter::new(provider))),
        Protocol::Http | Protocol::Https => Ok(Box::new(HttpAdapter::new(provider)?)),
        Protocol::S3 => Ok(Box::new(S3Adapter::new(provider, store))),
    }
}

/// Translate a transport-level IO failure into the ingest taxonomy
pub(crate) fn translate_io_error(err: &std::io::Error, context: &str) -> granary_common::IngestError {
    use granary_common::IngestError;
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::ConnectionRefused => {
            IngestError::RemoteResource(format!("Connection refused: {}", context))
        },
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            IngestError::ConnectionTimeout(format!("{}: {}", context, err))
        },
        _ => IngestError::RemoteResource(format!("{}: {}", context, err)),
    }
}
