//! End-to-end verification runs against on-disk releases.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use black_verify_core::checks::ids;
use black_verify_core::config::Target;
use black_verify_core::evidence::default_fetchers;
use black_verify_core::source::AssetSource;
use black_verify_core::{
    Artifact, CheckRegistry, CheckResult, EvidenceFetcher, EvidenceKind, Fetched,
    VerificationEngine, Verdict, VerifyError,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::fixtures::ReleaseFixture;

const DEMO: &str = "demo-1.0.0";
const DEMO_BYTES: &[u8] = b"#!/bin/sh\necho demo 1.0.0\n";

fn engine(config: black_verify_core::VerifyConfig) -> VerificationEngine {
    VerificationEngine::new(config, Arc::new(CheckRegistry::standard())).unwrap()
}

/// Artifact, manifest, signature and a clean scan; no SBOM, no attestation.
fn demo_release() -> ReleaseFixture {
    let fx = ReleaseFixture::new();
    fx.write(DEMO, DEMO_BYTES);
    fx.checksums(&[(DEMO, DEMO_BYTES)]);
    fx.sign(DEMO, DEMO_BYTES);
    fx.vulnerabilities(DEMO, &[], Utc::now() - chrono::Duration::hours(3));
    fx
}

// ============================================================================
// Verdicts
// ============================================================================

#[tokio::test]
async fn missing_sbom_warns_without_failing() {
    let fx = demo_release();
    let report = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.registry_version, "2026.1");
    assert_eq!(report.artifacts.len(), 1);
    let demo = &report.artifacts[0];
    assert_eq!(demo.artifact.name, DEMO);
    assert_eq!(demo.artifact.version.as_deref(), Some("1.0.0"));

    for id in [
        ids::DIGEST_MATCH,
        ids::DIGEST_MANIFEST,
        ids::SIGNATURE_VALID,
        ids::SIGNATURE_IDENTITY,
        ids::SIGNATURE_CHAIN,
        ids::VULNERABILITY_THRESHOLD,
        ids::VULNERABILITY_FRESHNESS,
        ids::METADATA_VERSION,
        ids::METADATA_SIZE,
    ] {
        assert_eq!(demo.check(id).unwrap().result, CheckResult::Pass, "{id}");
    }
    assert!(demo.check(ids::SBOM_PRESENT).unwrap().result.is_skip());
    assert!(demo.check(ids::ATTESTATION_SUBJECT).unwrap().result.is_skip());
    assert!(demo.checks.iter().all(|c| !c.result.is_fail()));

    assert_eq!(demo.verdict, Verdict::Warn);
    assert_eq!(report.verdict, Verdict::Warn);
    assert_eq!(report.exit_code(false), 0);
    assert_eq!(report.exit_code(true), 2);
}

#[tokio::test]
async fn advisory_sbom_with_mandatory_signature_warns() {
    let fx = demo_release();
    let config = fx.config("v1.0.0");
    assert!(config.policy.is_required(ids::SIGNATURE_VALID));
    assert!(!config.policy.is_required(ids::SBOM_PRESENT));

    let report = engine(config).run(CancellationToken::new()).await.unwrap();
    let demo = &report.artifacts[0];
    let sbom = &demo.check(ids::SBOM_PRESENT).unwrap().result;
    assert!(sbom.is_skip());
    assert!(!demo.check(ids::SBOM_PRESENT).unwrap().required);
    // The unattested build is what holds the verdict at Warn.
    assert!(demo.check(ids::ATTESTATION_BUILDER).unwrap().required);
    assert_eq!(report.verdict, Verdict::Warn);
    assert_eq!(report.exit_code(false), 0);
}

#[tokio::test]
async fn attested_release_without_sbom_passes() {
    let fx = demo_release();
    fx.attestation(DEMO, DEMO_BYTES);

    let report = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();
    let demo = &report.artifacts[0];
    assert!(demo.check(ids::SBOM_PRESENT).unwrap().result.is_skip());
    assert_eq!(demo.check(ids::ATTESTATION_BUILDER).unwrap().result, CheckResult::Pass);
    assert_eq!(report.verdict, Verdict::Pass);
}

#[tokio::test]
async fn forged_attestation_signature_fails() {
    let fx = demo_release();
    fx.sbom(DEMO, "demo", "1.0.0");
    fx.forged_attestation(DEMO, DEMO_BYTES, b"not a signature");

    let report = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();
    let demo = &report.artifacts[0];
    for id in [
        ids::ATTESTATION_SUBJECT,
        ids::ATTESTATION_BUILDER,
        ids::ATTESTATION_FRESHNESS,
    ] {
        assert!(demo.check(id).unwrap().result.is_fail(), "{id}");
    }
    assert_eq!(demo.check(ids::SIGNATURE_VALID).unwrap().result, CheckResult::Pass);
    assert_eq!(report.verdict, Verdict::Fail);
}

#[tokio::test]
async fn altered_manifest_digest_fails() {
    let fx = demo_release();
    fx.checksums(&[(DEMO, b"something else entirely")]);

    let report = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();
    let demo = &report.artifacts[0];

    assert!(demo.check(ids::DIGEST_MATCH).unwrap().result.is_fail());
    assert_eq!(demo.check(ids::SIGNATURE_VALID).unwrap().result, CheckResult::Pass);
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.exit_code(false), 1);
}

#[tokio::test]
async fn full_evidence_passes() {
    let fx = demo_release();
    fx.sbom(DEMO, "demo", "1.0.0");
    fx.attestation(DEMO, DEMO_BYTES);

    let report = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();
    let demo = &report.artifacts[0];
    for entry in &demo.checks {
        assert_eq!(entry.result, CheckResult::Pass, "{}", entry.id);
    }
    assert_eq!(report.verdict, Verdict::Pass);
}

#[tokio::test]
async fn tampering_only_changes_digest_match() {
    let fx = ReleaseFixture::new();
    fx.write(DEMO, DEMO_BYTES);
    fx.checksums(&[(DEMO, DEMO_BYTES)]);

    let before = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();

    let mut tampered = DEMO_BYTES.to_vec();
    tampered[0] ^= 0x01;
    fx.write(DEMO, &tampered);
    let after = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();

    let (before, after) = (&before.artifacts[0], &after.artifacts[0]);
    assert_eq!(before.check(ids::DIGEST_MATCH).unwrap().result, CheckResult::Pass);
    assert!(after.check(ids::DIGEST_MATCH).unwrap().result.is_fail());
    for (b, a) in before.checks.iter().zip(&after.checks) {
        if b.id != ids::DIGEST_MATCH {
            assert_eq!(b.result, a.result, "{}", b.id);
        }
    }
}

#[tokio::test]
async fn artifacts_are_reported_in_name_order() {
    let fx = demo_release();
    fx.write("aaa-1.0.0.tar.gz", b"archive");
    fx.checksums(&[(DEMO, DEMO_BYTES), ("aaa-1.0.0.tar.gz", b"archive")]);

    let report = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap();
    let names: Vec<&str> = report.artifacts.iter().map(|r| r.artifact.name.as_str()).collect();
    assert_eq!(names, vec!["aaa-1.0.0.tar.gz", DEMO]);

    let registry = CheckRegistry::standard();
    for artifact in &report.artifacts {
        let ids: Vec<&str> = artifact.checks.iter().map(|c| c.id.as_str()).collect();
        let expected: Vec<&str> = registry.checks().iter().map(|c| c.id()).collect();
        assert_eq!(ids, expected);
    }
    // The unsigned archive's required signature checks are skipped.
    assert_eq!(report.artifacts[0].verdict, Verdict::Warn);
}

// ============================================================================
// Failure semantics
// ============================================================================

#[tokio::test]
async fn empty_directory_is_not_found() {
    let fx = ReleaseFixture::new();
    fx.write("SHA256SUMS", "");

    let err = engine(fx.config("v1.0.0"))
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::NotFound { .. }));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let fx = demo_release();
    let mut config = fx.config("v1.0.0");
    config.target = Target::Release {
        repository: "not-a-repo".into(),
        tag: "v1.0.0".into(),
    };
    let err = VerificationEngine::new(config, Arc::new(CheckRegistry::standard())).unwrap_err();
    assert!(matches!(err, VerifyError::Configuration { .. }));
}

struct HangingFetcher(EvidenceKind);

#[async_trait]
impl EvidenceFetcher for HangingFetcher {
    fn kind(&self) -> EvidenceKind {
        self.0
    }

    async fn fetch(
        &self,
        _artifact: &Artifact,
        _source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        std::future::pending().await
    }
}

struct FailingFetcher;

#[async_trait]
impl EvidenceFetcher for FailingFetcher {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Signature
    }

    async fn fetch(
        &self,
        _artifact: &Artifact,
        _source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        Err(VerifyError::retrieval("connection reset"))
    }
}

fn fetchers_with(
    config: &black_verify_core::VerifyConfig,
    replacement: Arc<dyn EvidenceFetcher>,
) -> Vec<Arc<dyn EvidenceFetcher>> {
    let mut fetchers: Vec<Arc<dyn EvidenceFetcher>> = default_fetchers(config)
        .into_iter()
        .filter(|f| f.kind() != replacement.kind())
        .collect();
    fetchers.push(replacement);
    fetchers
}

#[tokio::test]
async fn cancellation_before_fetches_settle() {
    let fx = demo_release();
    let config = fx.config("v1.0.0");
    let fetchers = fetchers_with(&config, Arc::new(HangingFetcher(EvidenceKind::Sbom)));
    let engine = engine(config).with_fetchers(fetchers);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = engine.run(cancel).await.unwrap_err();
    assert!(matches!(err, VerifyError::Cancelled));
    assert_eq!(err.exit_code(), 130);
}

#[tokio::test]
async fn run_timeout_cancels() {
    let fx = demo_release();
    let mut config = fx.config("v1.0.0");
    config.run_timeout = Some(Duration::from_millis(100));
    config.fetch_timeout = Duration::from_secs(60);
    let fetchers = fetchers_with(&config, Arc::new(HangingFetcher(EvidenceKind::Attestation)));

    let cancel = CancellationToken::new();
    let err = engine(config)
        .with_fetchers(fetchers)
        .run(cancel.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Cancelled));
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn fetch_timeout_degrades_to_skip() {
    let fx = demo_release();
    let mut config = fx.config("v1.0.0");
    config.fetch_timeout = Duration::from_millis(50);
    let fetchers = fetchers_with(&config, Arc::new(HangingFetcher(EvidenceKind::Vulnerability)));

    let report = engine(config)
        .with_fetchers(fetchers)
        .run(CancellationToken::new())
        .await
        .unwrap();
    let result = &report.artifacts[0].check(ids::VULNERABILITY_THRESHOLD).unwrap().result;
    assert!(result.is_skip());
    assert!(result.reason().unwrap().contains("timed out"));
}

#[tokio::test]
async fn retrieval_error_degrades_to_caveated_skip() {
    let fx = demo_release();
    let config = fx.config("v1.0.0");
    let fetchers = fetchers_with(&config, Arc::new(FailingFetcher));

    let report = engine(config)
        .with_fetchers(fetchers)
        .run(CancellationToken::new())
        .await
        .unwrap();
    let demo = &report.artifacts[0];
    let result = &demo.check(ids::SIGNATURE_VALID).unwrap().result;
    assert!(result.is_skip());
    assert!(result.reason().unwrap().contains("retrieval failed"));
    assert!(demo.checks.iter().all(|c| !c.result.is_fail()));
    assert_eq!(demo.verdict, Verdict::Warn);
}
