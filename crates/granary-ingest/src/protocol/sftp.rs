//! SFTP protocol adapter
//!
//! Built on the blocking `ssh2` bindings, driven through
//! `spawn_blocking` like the FTP adapter. Password authentication only;
//! the session is established and torn down per call.

use async_trait::async_trait;
use granary_common::types::{join_keys, GranuleFile, Provider};
use granary_common::{IngestError, Result};
use ssh2::Session;
use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use tracing::debug;

use super::{translate_io_error, ProtocolAdapter, RemoteEntry};

const DEFAULT_SFTP_PORT: u16 = 22;

#[derive(Debug, Clone)]
pub struct SftpAdapter {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl SftpAdapter {
    pub fn new(provider: &Provider) -> Self {
        Self {
            host: provider.host.clone(),
            port: provider.port.unwrap_or(DEFAULT_SFTP_PORT),
            username: provider.username.clone().unwrap_or_default(),
            password: provider.password.clone().unwrap_or_default(),
        }
    }

    fn session_sync(&self) -> Result<Session> {
        let address = format!("{}:{}", self.host, self.port);
        debug!("Connecting to SFTP server: {}", address);

        let tcp = TcpStream::connect(&address).map_err(|e| translate_io_error(&e, &self.host))?;

        let mut session =
            Session::new().map_err(|e| translate_ssh_error(&self.host, e))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| translate_ssh_error(&self.host, e))?;
        session
            .userauth_password(&self.username, &self.password)
            .map_err(|e| translate_ssh_error(&self.host, e))?;

        Ok(session)
    }

    fn fetch_sync(&self, path: &str) -> Result<Vec<u8>> {
        let session = self.session_sync()?;
        let sftp = session
            .sftp()
            .map_err(|e| translate_ssh_error(&self.host, e))?;

        debug!("Downloading file: {}", path);
        let mut remote = sftp
            .open(Path::new(path))
            .map_err(|e| translate_ssh_error(&self.host, e))?;

        let mut data = Vec::new();
        remote
            .read_to_end(&mut data)
            .map_err(|e| translate_io_error(&e, &self.host))?;

        debug!("Downloaded {} bytes from {}", data.len(), path);
        Ok(data)
    }

    fn list_sync(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let session = self.session_sync()?;
        let sftp = session
            .sftp()
            .map_err(|e| translate_ssh_error(&self.host, e))?;

        debug!("Listing directory: {}", path);
        let entries = sftp
            .readdir(Path::new(path))
            .map_err(|e| translate_ssh_error(&self.host, e))?;

        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().to_string();
                Some(RemoteEntry {
                    path: join_keys(path, &name),
                    name,
                    size: stat.size,
                    is_directory: stat.is_dir(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl ProtocolAdapter for SftpAdapter {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let adapter = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || adapter.list_sync(&path))
            .await
            .map_err(|e| IngestError::storage(format!("SFTP list task panicked: {}", e)))?
    }

    async fn fetch(&self, file: &GranuleFile) -> Result<Vec<u8>> {
        let adapter = self.clone();
        let path = file.source_path();
        tokio::task::spawn_blocking(move || adapter.fetch_sync(&path))
            .await
            .map_err(|e| IngestError::storage(format!("SFTP fetch task panicked: {}", e)))?
    }
}

fn translate_ssh_error(host: &str, err: ssh2::Error) -> IngestError {
    IngestError::RemoteResource(format!("{}: {}", host, err))
}
