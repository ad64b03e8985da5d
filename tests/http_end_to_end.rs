//! End-to-end runs over HTTP: a manifest served by a mock host, item URLs
//! relative to it, and the streaming transfer writing into a temp directory.

mod support;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use gallery_core::{
    ErrorKind, HttpTransfer, ManifestLocation, ManifestSource, Orchestrator, RunConfig, RunStatus,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use support::socket_guard::mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BEACH: &[u8] = b"beach photo bytes";
const DUNES: &[u8] = b"dunes photo bytes";

fn sha256(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn manifest() -> serde_json::Value {
    json!({
        "root": {
            "id": "root", "title": "Account", "kind": "folder",
            "children": [
                { "id": "g1", "title": "Beach", "kind": "gallery", "item_count": 4 }
            ]
        },
        "items": {
            "g1": [
                {
                    "id": "p1", "gallery_id": "g1", "file_name": "beach.jpg",
                    "url": "media/p1", "size": BEACH.len(), "signature": sha256(BEACH)
                },
                {
                    "id": "p2", "gallery_id": "g1", "file_name": "gone.jpg",
                    "url": "media/p2"
                },
                {
                    "id": "p3", "gallery_id": "g1", "file_name": "corrupt.jpg",
                    "url": "media/p3", "size": BEACH.len(), "signature": sha256(BEACH)
                },
                {
                    "id": "p4", "gallery_id": "g1", "file_name": "dunes.jpg",
                    "url": "media/p4", "size": DUNES.len()
                }
            ]
        }
    })
}

async fn mount(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BEACH))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/p2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/p3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"beach photo bytez".to_vec()))
        .mount(server)
        .await;
    // First request to p4 hits a transient server error.
    Mock::given(method("GET"))
        .and(path("/media/p4"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/p4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(DUNES))
        .mount(server)
        .await;
}

fn orchestrator(server: &MockServer, output: &std::path::Path) -> Orchestrator {
    let location = ManifestLocation::parse(&format!("{}/manifest.json", server.uri()));
    let source = ManifestSource::new(location, Duration::from_secs(5)).unwrap();
    let mut config = RunConfig::new(output);
    config.concurrency = 2;
    config.max_retries = 2;
    config.initial_backoff = Duration::from_millis(10);
    config.max_backoff = Duration::from_millis(40);
    config.transfer_timeout = Duration::from_secs(5);
    Orchestrator::new(config, Arc::new(source), Arc::new(HttpTransfer::new().unwrap())).unwrap()
}

#[tokio::test]
async fn test_http_run_downloads_verifies_and_classifies() {
    let Some(server) = mock_server_or_skip().await else {
        return;
    };
    mount(&server).await;
    let dir = TempDir::new().unwrap();

    let report = orchestrator(&server, dir.path())
        .run(Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 2);

    let kind_of = |id: &str| {
        report
            .failures
            .iter()
            .find(|failure| failure.item_id == id)
            .map(|failure| failure.kind)
    };
    assert_eq!(kind_of("p2"), Some(ErrorKind::NotFound));
    assert_eq!(kind_of("p3"), Some(ErrorKind::IntegrityMismatch));

    let beach = dir.path().join("Beach").join("beach.jpg");
    assert_eq!(std::fs::read(beach).unwrap(), BEACH);
    let dunes = dir.path().join("Beach").join("dunes.jpg");
    assert_eq!(std::fs::read(dunes).unwrap(), DUNES);
    assert!(
        !dir.path().join("Beach").join("corrupt.jpg").exists(),
        "a file failing verification is not left behind"
    );
    assert!(report.retried >= 1, "the 503 on p4 is retried");
}

#[tokio::test]
async fn test_http_second_run_only_retries_failures() {
    let Some(server) = mock_server_or_skip().await else {
        return;
    };
    mount(&server).await;
    let dir = TempDir::new().unwrap();

    orchestrator(&server, dir.path())
        .run(Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();
    let report = orchestrator(&server, dir.path())
        .run(Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!(report.skipped, 2);
    assert_eq!(report.planned, 2);
    assert_eq!(report.completed, 0);
    assert_eq!(report.failed, 2);
}

#[tokio::test]
async fn test_http_manifest_unavailable_is_fatal() {
    let Some(server) = mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let result = orchestrator(&server, dir.path())
        .run(Arc::new(AtomicBool::new(false)))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_http_zero_byte_item_completes_and_is_kept() {
    let Some(server) = mock_server_or_skip().await else {
        return;
    };
    let manifest = json!({
        "root": {
            "id": "root", "title": "Account", "kind": "folder",
            "children": [{ "id": "g1", "title": "Beach", "kind": "gallery", "item_count": 1 }]
        },
        "items": {
            "g1": [{
                "id": "p1", "gallery_id": "g1", "file_name": "empty.txt",
                "url": "media/p1", "size": 0, "signature": sha256(b"")
            }]
        }
    });
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::<u8>::new()))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let report = orchestrator(&server, dir.path())
        .run(Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    assert_eq!((report.completed, report.failed), (1, 0));
    assert_eq!(report.retried, 0);
    let written = dir.path().join("Beach").join("empty.txt");
    assert_eq!(std::fs::metadata(&written).unwrap().len(), 0);

    // Without checkpoint state the existing empty file still verifies.
    let second = orchestrator(&server, dir.path());
    assert_eq!(second.clear_checkpoint().await.unwrap(), 1);
    let report = second.run(Arc::new(AtomicBool::new(false))).await.unwrap();
    assert_eq!((report.skipped, report.completed), (1, 0));
}
