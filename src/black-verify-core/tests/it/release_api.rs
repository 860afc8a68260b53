//! Release-backed targets against a local stand-in for the release API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use black_crypto::sha256_hex;
use black_verify_core::checks::ids;
use black_verify_core::config::Target;
use black_verify_core::{
    ArtifactLocator, CheckRegistry, CheckResult, VerificationEngine, Verdict, VerifyConfig,
    VerifyError,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::fixtures::{ReleaseFixture, REPO};

const DEMO: &str = "demo-1.0.0";
const DEMO_BYTES: &[u8] = b"#!/bin/sh\necho demo 1.0.0\n";

type Routes = HashMap<String, (u16, Vec<u8>)>;

/// Minimal HTTP/1.1 server answering GETs from a fixed route table.
struct StubApi {
    addr: SocketAddr,
    routes: Arc<Mutex<Routes>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubApi {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Mutex<Routes>> = Arc::default();
        let hits: Arc<Mutex<Vec<String>>> = Arc::default();

        let (r, h) = (routes.clone(), hits.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (r, h) = (r.clone(), h.clone());
                tokio::spawn(async move { serve(stream, r, h).await });
            }
        });
        Self { addr, routes, hits }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn route(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.into()));
    }

    fn releases_page(&self, page: usize, releases: &[Value]) {
        self.route(
            &format!("/repos/{REPO}/releases?per_page=100&page={page}"),
            200,
            Value::Array(releases.to_vec()).to_string(),
        );
    }

    /// Serve `files` as assets of a release tagged `tag`; returns its JSON.
    fn publish(&self, tag: &str, files: &[(String, Vec<u8>)]) -> Value {
        let assets: Vec<Value> = files
            .iter()
            .enumerate()
            .map(|(idx, (name, bytes))| {
                let path = format!("/repos/{REPO}/releases/assets/{idx}");
                self.route(&path, 200, bytes.clone());
                json!({
                    "name": name,
                    "size": bytes.len(),
                    "url": format!("{}{path}", self.url()),
                    "browser_download_url": format!("https://github.com/{REPO}/releases/download/{tag}/{name}"),
                    "digest": format!("sha256:{}", sha256_hex(bytes)),
                })
            })
            .collect();
        json!({"id": 7, "tag_name": tag, "assets": assets})
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

async fn serve(mut stream: TcpStream, routes: Arc<Mutex<Routes>>, hits: Arc<Mutex<Vec<String>>>) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 4096];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }
    let head = String::from_utf8_lossy(&request);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    hits.lock().unwrap().push(path.clone());

    let (status, body) = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or_else(|| (404, br#"{"message":"Not Found"}"#.to_vec()));
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let header = format!(
        "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(&body).await;
    let _ = stream.shutdown().await;
}

fn locator(api: &StubApi) -> ArtifactLocator {
    ArtifactLocator::new(&VerifyConfig {
        api_url: api.url(),
        ..VerifyConfig::default()
    })
}

fn release_target(tag: &str) -> Target {
    Target::Release {
        repository: REPO.into(),
        tag: tag.into(),
    }
}

fn demo_files() -> Vec<(String, Vec<u8>)> {
    vec![
        (DEMO.to_string(), DEMO_BYTES.to_vec()),
        (format!("{DEMO}.sig.json"), b"{}".to_vec()),
        ("SHA256SUMS".to_string(), format!("{}  {DEMO}\n", sha256_hex(DEMO_BYTES)).into_bytes()),
        ("aaa-1.0.0.tar.gz".to_string(), b"archive".to_vec()),
    ]
}

// ============================================================================
// Locator
// ============================================================================

#[tokio::test]
async fn release_assets_become_artifacts() {
    let api = StubApi::start().await;
    let release = api.publish("v1.0.0", &demo_files());
    api.releases_page(1, &[json!({"id": 1, "tag_name": "v0.9.0"}), release]);

    let located = locator(&api).locate(&release_target("v1.0.0")).await.unwrap();

    let names: Vec<&str> = located.artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["aaa-1.0.0.tar.gz", DEMO]);
    assert_eq!(located.description, format!("{REPO}@v1.0.0"));

    let demo = &located.artifacts[1];
    assert_eq!(demo.version.as_deref(), Some("1.0.0"));
    assert_eq!(demo.size, DEMO_BYTES.len() as u64);
    assert_eq!(
        demo.declared_digest.as_deref(),
        Some(format!("sha256:{}", sha256_hex(DEMO_BYTES)).as_str())
    );

    // Evidence files are fetched through the same source.
    let manifest = located.source.fetch("SHA256SUMS").await.unwrap().unwrap();
    assert!(String::from_utf8(manifest).unwrap().contains(DEMO));
    assert_eq!(located.source.fetch(DEMO).await.unwrap().unwrap(), DEMO_BYTES);
    assert!(located.source.fetch("SHA512SUMS").await.unwrap().is_none());

    // A short first page ends the listing.
    let listings = api.hits().iter().filter(|p| p.contains("/releases?")).count();
    assert_eq!(listings, 1);
}

#[tokio::test]
async fn listing_follows_full_pages() {
    let api = StubApi::start().await;
    let filler: Vec<Value> = (0..100)
        .map(|i| json!({"id": 100 + i, "tag_name": format!("v0.{i}.0")}))
        .collect();
    api.releases_page(1, &filler);
    api.releases_page(2, &[api.publish("v1.0.0", &demo_files())]);

    let located = locator(&api).locate(&release_target("v1.0.0")).await.unwrap();
    assert_eq!(located.artifacts.len(), 2);

    let hits = api.hits();
    assert!(hits.iter().any(|p| p.ends_with("page=2")));
    assert!(!hits.iter().any(|p| p.ends_with("page=3")));
}

#[tokio::test]
async fn missing_repository_or_tag_is_not_found() {
    let api = StubApi::start().await;
    let err = locator(&api).locate(&release_target("v1.0.0")).await.unwrap_err();
    assert!(matches!(err, VerifyError::NotFound { .. }), "{err}");

    api.releases_page(1, &[json!({"id": 1, "tag_name": "v0.9.0"})]);
    let err = locator(&api).locate(&release_target("v1.0.0")).await.unwrap_err();
    assert!(matches!(err, VerifyError::NotFound { .. }), "{err}");
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn server_errors_are_retrieval_errors() {
    let api = StubApi::start().await;
    api.route(&format!("/repos/{REPO}/releases?per_page=100&page=1"), 502, "bad gateway");
    let err = locator(&api).locate(&release_target("v1.0.0")).await.unwrap_err();
    assert!(matches!(err, VerifyError::Retrieval { .. }), "{err}");
    assert!(err.is_fatal());

    let api = StubApi::start().await;
    let release = api.publish("v1.0.0", &demo_files());
    api.releases_page(1, &[release]);
    api.route(&format!("/repos/{REPO}/releases/assets/0"), 500, "boom");
    let located = locator(&api).locate(&release_target("v1.0.0")).await.unwrap();
    let err = located.source.fetch(DEMO).await.unwrap_err();
    assert!(matches!(err, VerifyError::Retrieval { .. }), "{err}");
}

// ============================================================================
// Engine over a release
// ============================================================================

#[tokio::test]
async fn verifies_published_release() {
    let fx = ReleaseFixture::new();
    fx.write(DEMO, DEMO_BYTES);
    fx.checksums(&[(DEMO, DEMO_BYTES)]);
    fx.sign(DEMO, DEMO_BYTES);
    fx.attestation(DEMO, DEMO_BYTES);
    fx.sbom(DEMO, "demo", "1.0.0");
    fx.vulnerabilities(DEMO, &[], chrono::Utc::now() - chrono::Duration::hours(1));

    let api = StubApi::start().await;
    api.releases_page(1, &[api.publish("v1.0.0", &fx.files())]);

    let mut config = fx.config("v1.0.0");
    config.target = release_target("v1.0.0");
    config.api_url = api.url();
    let engine = VerificationEngine::new(config, Arc::new(CheckRegistry::standard())).unwrap();
    let report = engine.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.target, format!("{REPO}@v1.0.0"));
    assert_eq!(report.artifacts.len(), 1);
    let demo = &report.artifacts[0];
    for entry in &demo.checks {
        assert_eq!(entry.result, CheckResult::Pass, "{}", entry.id);
    }
    assert_eq!(demo.check(ids::DIGEST_MATCH).unwrap().result, CheckResult::Pass);
    assert_eq!(report.verdict, Verdict::Pass);
}
