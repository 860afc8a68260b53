//! On-disk release fixtures.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use black_crypto::{sha256_hex, ArtifactSigner, Ed25519Signer, SignatureAlgorithm};
use black_verify_core::config::{Target, VerifyConfig};
use black_verify_core::evidence::{pae, Certificate, SignatureBundle, SignerInfo};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tempfile::TempDir;

pub const REPO: &str = "hollowsunhc/black";
pub const IDENTITY: &str =
    "https://github.com/hollowsunhc/black/.github/workflows/release.yml@refs/tags/v1.0.0";
pub const BUILDER: &str =
    "https://github.com/slsa-framework/slsa-github-generator/.github/workflows/generator_generic_slsa3.yml@refs/tags/v2.0.0";

/// A temporary directory laid out like downloaded release assets.
pub struct ReleaseFixture {
    dir: TempDir,
    leaf: Ed25519Signer,
    root: Ed25519Signer,
}

impl ReleaseFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            leaf: Ed25519Signer::random(),
            root: Ed25519Signer::random(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, bytes: impl AsRef<[u8]>) {
        std::fs::write(self.dir.path().join(name), bytes).unwrap();
    }

    /// Every file in the directory, sorted by name.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(self.path())
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let name = entry.file_name().to_string_lossy().into_owned();
                (name, std::fs::read(entry.path()).unwrap())
            })
            .collect();
        files.sort();
        files
    }

    /// Write `SHA256SUMS` covering `artifacts`.
    pub fn checksums(&self, artifacts: &[(&str, &[u8])]) {
        let text: String = artifacts
            .iter()
            .map(|(name, bytes)| format!("{}  {name}\n", sha256_hex(bytes)))
            .collect();
        self.write("SHA256SUMS", text);
    }

    /// Fingerprint of the chain's root key.
    pub fn root_fingerprint(&self) -> String {
        sha256_hex(&self.root.public_key().unwrap())
    }

    fn certificate(&self, subject: &str, issuer: &str, key: &Ed25519Signer, by: &Ed25519Signer) -> Certificate {
        let now = Utc::now();
        let mut cert = Certificate {
            subject: subject.into(),
            issuer: issuer.into(),
            public_key: BASE64.encode(key.public_key().unwrap()),
            algorithm: SignatureAlgorithm::Ed25519,
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(365),
            signature: String::new(),
        };
        cert.signature = BASE64.encode(by.sign(&cert.tbs_bytes()).unwrap());
        cert
    }

    /// Write `<name>.sig.json` signing `bytes` under a leaf/root chain.
    pub fn sign(&self, name: &str, bytes: &[u8]) {
        let bundle = SignatureBundle {
            algorithm: SignatureAlgorithm::Ed25519,
            signature: BASE64.encode(self.leaf.sign(bytes).unwrap()),
            public_key: None,
            signed_at: Some(Utc::now() - Duration::hours(1)),
            signer: SignerInfo {
                identity: IDENTITY.into(),
                issuer: Some("https://token.actions.githubusercontent.com".into()),
            },
            certificate_chain: vec![
                self.certificate("release-signing", "release-root", &self.leaf, &self.root),
                self.certificate("release-root", "release-root", &self.root, &self.root),
            ],
        };
        self.write(&format!("{name}.sig.json"), serde_json::to_vec(&bundle).unwrap());
    }

    /// Write a normalized vulnerability report.
    pub fn vulnerabilities(&self, name: &str, findings: &[(&str, &str)], generated_at: DateTime<Utc>) {
        let findings: Vec<_> = findings
            .iter()
            .map(|(id, severity)| json!({"id": id, "package": "libdemo", "severity": severity}))
            .collect();
        let doc = json!({
            "scanner": "osv-scanner",
            "generated_at": generated_at.to_rfc3339(),
            "findings": findings,
        });
        self.write(&format!("{name}.osv.json"), doc.to_string());
    }

    /// Write an SPDX SBOM describing `component`.
    pub fn sbom(&self, name: &str, component: &str, version: &str) {
        let doc = json!({
            "spdxVersion": "SPDX-2.3",
            "SPDXID": "SPDXRef-DOCUMENT",
            "name": format!("{component}-sbom"),
            "dataLicense": "CC0-1.0",
            "documentNamespace": format!("https://github.com/{REPO}/sbom/{component}"),
            "creationInfo": {"created": Utc::now().to_rfc3339(), "creators": ["Tool: syft"]},
            "documentDescribes": ["SPDXRef-Package-main"],
            "packages": [{"SPDXID": "SPDXRef-Package-main", "name": component, "versionInfo": version}]
        });
        self.write(&format!("{name}.spdx.json"), doc.to_string());
    }

    /// Write a DSSE-wrapped SLSA v1 provenance statement signed by the leaf key.
    pub fn attestation(&self, name: &str, bytes: &[u8]) {
        self.write_attestation(name, bytes, |pae| self.leaf.sign(pae).unwrap());
    }

    /// Same statement, but the envelope carries `sig` verbatim.
    pub fn forged_attestation(&self, name: &str, bytes: &[u8], sig: &[u8]) {
        self.write_attestation(name, bytes, |_| sig.to_vec());
    }

    fn write_attestation(&self, name: &str, bytes: &[u8], sign: impl Fn(&[u8]) -> Vec<u8>) {
        let statement = json!({
            "_type": "https://in-toto.io/Statement/v1",
            "predicateType": "https://slsa.dev/provenance/v1",
            "subject": [{"name": name, "digest": {"sha256": sha256_hex(bytes)}}],
            "predicate": {
                "runDetails": {
                    "builder": {"id": BUILDER},
                    "metadata": {"finishedOn": (Utc::now() - Duration::days(2)).to_rfc3339()}
                }
            }
        });
        let payload_type = "application/vnd.in-toto+json";
        let payload = statement.to_string();
        let sig = sign(&pae(payload_type, payload.as_bytes()));
        let envelope = json!({
            "payloadType": payload_type,
            "payload": BASE64.encode(&payload),
            "signatures": [{"keyid": "", "sig": BASE64.encode(sig)}]
        });
        self.write(&format!("{name}.intoto.jsonl"), format!("{envelope}\n"));
    }

    /// Configuration for verifying this directory as release `tag`.
    pub fn config(&self, tag: &str) -> VerifyConfig {
        let mut config = VerifyConfig {
            target: Target::Local(self.path().to_path_buf()),
            repository: Some(REPO.into()),
            tag: Some(tag.into()),
            ..VerifyConfig::default()
        };
        config.policy.trusted_roots = vec![self.root_fingerprint()];
        config
    }
}
