//! HTTP adapter tests against a local mock server

use granary_common::types::{
    BucketConfig, CollectionConfig, DuplicateHandling, FileConfig, GranuleFile, Protocol, Provider,
};
use granary_common::IngestError;
use granary_ingest::protocol::{HttpAdapter, ProtocolAdapter};
use granary_ingest::store::{MemoryStore, ObjectStore};
use granary_ingest::task::{sync_granule, SyncGranuleConfig, SyncGranuleEvent, SyncGranuleInput};
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_provider(server: &MockServer) -> Provider {
    let address = server.address();
    Provider {
        id: Some("http-provider".to_string()),
        protocol: Protocol::Http,
        host: address.ip().to_string(),
        port: Some(address.port()),
        username: None,
        password: None,
    }
}

fn granule_file(name: &str) -> GranuleFile {
    GranuleFile {
        name: name.to_string(),
        path: "granules".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn fetch_downloads_remote_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/granules/granule-001.dat"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"remote payload".to_vec()))
        .mount(&server)
        .await;

    let adapter = HttpAdapter::new(&http_provider(&server)).unwrap();
    let data = adapter.fetch(&granule_file("granule-001.dat")).await.unwrap();
    assert_eq!(data, b"remote payload");
}

#[tokio::test]
async fn missing_remote_file_is_a_remote_resource_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/granules/missing.dat"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let adapter = HttpAdapter::new(&http_provider(&server)).unwrap();
    let err = adapter.fetch(&granule_file("missing.dat")).await.unwrap_err();
    assert!(matches!(err, IngestError::RemoteResource(ref msg) if msg.contains("404")));
}

#[tokio::test]
async fn refused_connection_is_translated() {
    // No listener on this port
    let provider = Provider {
        id: None,
        protocol: Protocol::Http,
        host: "127.0.0.1".to_string(),
        port: Some(1),
        username: None,
        password: None,
    };

    let adapter = HttpAdapter::new(&provider).unwrap();
    let err = adapter.fetch(&granule_file("x.dat")).await.unwrap_err();
    assert!(matches!(err, IngestError::RemoteResource(_)));
}

#[tokio::test]
async fn list_parses_directory_index() {
    let server = MockServer::start().await;
    let html = r#"
        <html><body>
        <a href="../">Parent</a>
        <a href="granule-001.dat">granule-001.dat</a>
        <a href="granule-002.dat">granule-002.dat</a>
        </body></html>
    "#;
    Mock::given(method("GET"))
        .and(path("/granules/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let adapter = HttpAdapter::new(&http_provider(&server)).unwrap();
    let entries = adapter.list("granules/").await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["granule-001.dat", "granule-002.dat"]);
}

#[tokio::test]
async fn sync_granule_stages_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/granules/granule-001.dat"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"http content".to_vec()))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let event = SyncGranuleEvent {
        config: SyncGranuleConfig {
            stack: "test-stack".to_string(),
            buckets: HashMap::from([(
                "internal".to_string(),
                BucketConfig {
                    name: "staging-bucket".to_string(),
                    kind: Some("internal".to_string()),
                },
            )]),
            force_download: false,
            download_bucket: "staging-bucket".to_string(),
            provider: http_provider(&server),
            duplicate_handling: Some(DuplicateHandling::Replace),
            collection: Some(CollectionConfig {
                name: "MOD09GQ".to_string(),
                files: vec![FileConfig {
                    regex: r".*\.dat$".to_string(),
                    bucket: "internal".to_string(),
                    url_path: None,
                }],
                ..Default::default()
            }),
            file_staging_dir: None,
            pdr: None,
        },
        input: SyncGranuleInput {
            files: vec![granule_file("granule-001.dat")],
        },
    };

    let output = sync_granule(store.clone(), event).await.unwrap();
    assert_eq!(output.granules[0].files.len(), 1);

    let staged = store
        .get("staging-bucket", "file-staging/test-stack/MOD09GQ/granule-001.dat")
        .await
        .unwrap();
    assert_eq!(staged, b"http content");
}
