//! FTP protocol adapter
//!
//! Wraps the blocking `suppaftp` client in `spawn_blocking`. Every call
//! opens its own session, transfers in binary mode over Extended Passive
//! Mode, and quits before returning.

use async_trait::async_trait;
use granary_common::types::{join_keys, GranuleFile, Provider};
use granary_common::{IngestError, Result};
use std::io::Read;
use suppaftp::FtpStream;
use tracing::{debug, warn};

use super::{translate_io_error, ProtocolAdapter, RemoteEntry};

const DEFAULT_FTP_PORT: u16 = 21;

#[derive(Debug, Clone)]
pub struct FtpAdapter {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl FtpAdapter {
    pub fn new(provider: &Provider) -> Self {
        Self {
            host: provider.host.clone(),
            port: provider.port.unwrap_or(DEFAULT_FTP_PORT),
            username: provider
                .username
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
            password: provider
                .password
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
        }
    }

    fn connect_sync(&self) -> Result<FtpStream> {
        let address = format!("{}:{}", self.host, self.port);
        debug!("Connecting to FTP server: {}", address);

        let mut stream =
            FtpStream::connect(&address).map_err(|e| translate_ftp_error(&self.host, e))?;

        // Extended Passive Mode - better for NAT/Docker environments
        stream.set_mode(suppaftp::Mode::ExtendedPassive);

        stream
            .login(&self.username, &self.password)
            .map_err(|e| translate_ftp_error(&self.host, e))?;

        Ok(stream)
    }

    fn fetch_sync(&self, path: &str) -> Result<Vec<u8>> {
        let mut stream = self.connect_sync()?;
        let result = self.fetch_on(&mut stream, path);
        quit_with_warn(stream);
        result
    }

    fn fetch_on(&self, stream: &mut FtpStream, path: &str) -> Result<Vec<u8>> {
        stream
            .transfer_type(suppaftp::types::FileType::Binary)
            .map_err(|e| translate_ftp_error(&self.host, e))?;

        debug!("Downloading file: {}", path);
        let mut reader = stream
            .retr_as_buffer(path)
            .map_err(|e| translate_ftp_error(&self.host, e))?;

        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| translate_io_error(&e, &self.host))?;

        debug!("Downloaded {} bytes from {}", data.len(), path);
        Ok(data)
    }

    fn list_sync(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut stream = self.connect_sync()?;

        debug!("Listing directory: {}", path);
        let result = stream
            .list(Some(path))
            .map_err(|e| translate_ftp_error(&self.host, e))
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|line| parse_list_line(path, line))
                    .collect()
            });
        quit_with_warn(stream);
        result
    }
}

// Graceful QUIT on every exit path, failed transfers included
fn quit_with_warn(mut stream: FtpStream) {
    if let Err(e) = stream.quit() {
        warn!("Failed to quit FTP session gracefully: {}", e);
    }
}

#[async_trait]
impl ProtocolAdapter for FtpAdapter {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let adapter = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || adapter.list_sync(&path))
            .await
            .map_err(|e| IngestError::storage(format!("FTP list task panicked: {}", e)))?
    }

    async fn fetch(&self, file: &GranuleFile) -> Result<Vec<u8>> {
        let adapter = self.clone();
        let path = file.source_path();
        tokio::task::spawn_blocking(move || adapter.fetch_sync(&path))
            .await
            .map_err(|e| IngestError::storage(format!("FTP fetch task panicked: {}", e)))?
    }
}

fn translate_ftp_error(host: &str, err: suppaftp::FtpError) -> IngestError {
    match &err {
        suppaftp::FtpError::ConnectionError(io) => translate_io_error(io, host),
        _ => IngestError::RemoteResource(format!("{}: {}", host, err)),
    }
}

/// Parse a Unix-style FTP LIST line:
/// `-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 filename.txt`
fn parse_list_line(dir: &str, line: &str) -> Option<RemoteEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let is_directory = parts[0].starts_with('d');
    let name = (*parts.last()?).to_string();
    let size = if parts.len() >= 5 {
        parts[4].parse().ok()
    } else {
        None
    };

    Some(RemoteEntry {
        path: join_keys(dir, &name),
        name,
        size,
        is_directory,
    })
}
