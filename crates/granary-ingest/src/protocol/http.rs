//! HTTP/HTTPS protocol adapter
//!
//! Serves both `http` and `https` providers. Listing parses anchor hrefs
//! out of a directory index page, which is how most data providers
//! expose granule directories over plain HTTP.

use async_trait::async_trait;
use granary_common::types::{join_keys, GranuleFile, Protocol, Provider};
use granary_common::{IngestError, Result};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use super::{ProtocolAdapter, RemoteEntry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

static HREF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("static regex"));

pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
    host: String,
}

impl HttpAdapter {
    pub fn new(provider: &Provider) -> Result<Self> {
        let scheme = match provider.protocol {
            Protocol::Https => "https",
            _ => "http",
        };
        let base_url = match provider.port {
            Some(port) => format!("{}://{}:{}", scheme, provider.host, port),
            None => format!("{}://{}", scheme, provider.host),
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| IngestError::storage(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            host: provider.host.clone(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| translate_http_error(&self.host, e))?;

        if !response.status().is_success() {
            return Err(IngestError::RemoteResource(format!(
                "{} returned {} for {}",
                self.host,
                response.status(),
                url
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let url = self.url_for(path);
        let body = self
            .get(&url)
            .await?
            .text()
            .await
            .map_err(|e| translate_http_error(&self.host, e))?;

        Ok(parse_directory_index(path, &body))
    }

    async fn fetch(&self, file: &GranuleFile) -> Result<Vec<u8>> {
        let url = self.url_for(&file.source_path());
        let body = self
            .get(&url)
            .await?
            .bytes()
            .await
            .map_err(|e| translate_http_error(&self.host, e))?;

        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body.to_vec())
    }
}

fn translate_http_error(host: &str, err: reqwest::Error) -> IngestError {
    if err.is_timeout() {
        IngestError::ConnectionTimeout(format!("{}: {}", host, err))
    } else if err.is_connect() {
        IngestError::RemoteResource(format!("Connection refused: {}: {}", host, err))
    } else {
        IngestError::RemoteResource(format!("{}: {}", host, err))
    }
}

/// Extract file entries from a directory index page.
///
/// Links with query strings, fragments, absolute URLs, or parent
/// references are not granule files and are dropped; hrefs ending in `/`
/// are directories.
fn parse_directory_index(dir: &str, html: &str) -> Vec<RemoteEntry> {
    HREF_PATTERN
        .captures_iter(html)
        .filter_map(|caps| {
            let target = caps.get(1)?.as_str();
            if target.starts_with("http://")
                || target.starts_with("https://")
                || target.starts_with('/')
                || target.starts_with('?')
                || target.starts_with('#')
                || target.starts_with("..")
            {
                return None;
            }

            let is_directory = target.ends_with('/');
            let name = target.trim_end_matches('/').to_string();
            if name.is_empty() {
                return None;
            }

            Some(RemoteEntry {
                path: join_keys(dir, &name),
                name,
                size: None,
                is_directory,
            })
        })
        .collect()
}
