//! Configuration for the verification engine.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::checks::{ids, CheckRegistry};
use crate::error::VerifyError;
use crate::types::Severity;

/// Default GitHub REST API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Builder identity prefix of the SLSA GitHub generator workflows.
pub const SLSA_GITHUB_GENERATOR: &str = "https://github.com/slsa-framework/slsa-github-generator/";

/// What to verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A local artifact file or a directory of downloaded release assets.
    Local(PathBuf),
    /// A published release, resolved through the release API.
    Release {
        /// Repository identifier (`owner/name`).
        repository: String,
        /// Release tag.
        tag: String,
    },
}

impl Target {
    /// Human-readable description used in reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Release { repository, tag } => format!("{repository}@{tag}"),
        }
    }
}

/// Verification policy.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Checks whose `Skip` raises the verdict to `Warn`.
    pub required: BTreeSet<String>,
    /// Findings at or above this severity fail the vulnerability check.
    pub severity_threshold: Severity,
    /// Maximum age of a vulnerability scan report.
    pub max_scan_age: Duration,
    /// Maximum age of an attestation's build timestamp.
    pub max_attestation_age: Duration,
    /// Upper bound on artifact size in bytes.
    pub max_artifact_size: u64,
    /// Tolerated clock skew for timestamps in the future.
    pub clock_skew: Duration,
    /// Trusted signer identities. An entry ending in `/` or `@` is a prefix.
    pub trusted_identities: Vec<String>,
    /// Trusted builder identity prefixes for attestations.
    pub trusted_builders: Vec<String>,
    /// SHA-256 fingerprints (hex) of trusted certificate-chain root keys.
    pub trusted_roots: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            required: [
                ids::DIGEST_MATCH,
                ids::SIGNATURE_VALID,
                ids::SIGNATURE_IDENTITY,
                ids::SIGNATURE_CHAIN,
                ids::ATTESTATION_SUBJECT,
                ids::ATTESTATION_BUILDER,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            severity_threshold: Severity::High,
            max_scan_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            max_attestation_age: Duration::from_secs(365 * 24 * 60 * 60), // 1 year
            max_artifact_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            clock_skew: Duration::from_secs(5 * 60),
            trusted_identities: Vec::new(),
            trusted_builders: Vec::new(),
            trusted_roots: Vec::new(),
        }
    }
}

impl Policy {
    /// Whether a `Skip` of `check_id` affects the verdict.
    pub fn is_required(&self, check_id: &str) -> bool {
        self.required.contains(check_id)
    }

    /// Apply `--require` / `--advisory` overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for ids the registry does not know.
    pub fn with_overrides(
        mut self,
        require: &[String],
        advisory: &[String],
        registry: &CheckRegistry,
    ) -> Result<Self, VerifyError> {
        for id in require.iter().chain(advisory) {
            if !registry.contains(id) {
                return Err(VerifyError::configuration(format!("unknown check id '{id}'")));
            }
        }
        self.required.extend(require.iter().cloned());
        for id in advisory {
            self.required.remove(id);
        }
        Ok(self)
    }

    /// Fill identity defaults derived from the repository identifier.
    ///
    /// Without explicit trust anchors, the repository's own GitHub URL is the
    /// trusted signer identity and, together with the SLSA generator, the
    /// trusted builder.
    pub fn resolved(mut self, repository: Option<&str>) -> Self {
        if let Some(repo) = repository {
            let repo_prefix = format!("https://github.com/{repo}/");
            if self.trusted_identities.is_empty() {
                self.trusted_identities.push(repo_prefix.clone());
            }
            if self.trusted_builders.is_empty() {
                self.trusted_builders.push(SLSA_GITHUB_GENERATOR.to_string());
                self.trusted_builders.push(repo_prefix);
            }
        }
        self.trusted_roots = self
            .trusted_roots
            .iter()
            .map(|fp| fp.trim().trim_start_matches("sha256:").to_ascii_lowercase())
            .collect();
        self
    }
}

/// Configuration for a verification run.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// What to verify.
    pub target: Target,
    /// Repository identifier (`owner/name`), usually from `GITHUB_REPOSITORY`.
    pub repository: Option<String>,
    /// Declared version for local targets.
    pub tag: Option<String>,
    /// Release API base URL.
    pub api_url: String,
    /// Bearer token for the release API.
    pub token: Option<String>,
    /// Per-fetch timeout.
    pub fetch_timeout: Duration,
    /// Whole-run timeout; expiry cancels the run.
    pub run_timeout: Option<Duration>,
    /// Maximum number of artifacts processed concurrently.
    pub workers: usize,
    /// Treat `Warn` as a non-zero exit.
    pub strict: bool,
    /// Invoke `osv-scanner` when no scan report is published.
    pub osv_scanner: bool,
    /// Verification policy.
    pub policy: Policy,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            target: Target::Local(PathBuf::from(".")),
            repository: None,
            tag: None,
            api_url: DEFAULT_API_URL.into(),
            token: None,
            fetch_timeout: Duration::from_secs(30),
            run_timeout: None,
            workers: 4,
            strict: false,
            osv_scanner: false,
            policy: Policy::default(),
        }
    }
}

impl VerifyConfig {
    /// Validate the configuration against a registry.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Configuration`] describing the first problem.
    pub fn validate(&self, registry: &CheckRegistry) -> Result<(), VerifyError> {
        if let Some(unknown) = self.policy.required.iter().find(|id| !registry.contains(id)) {
            return Err(VerifyError::configuration(format!(
                "policy requires unknown check '{unknown}'"
            )));
        }
        if self.workers == 0 {
            return Err(VerifyError::configuration("workers must be at least 1"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(VerifyError::configuration("fetch timeout must be positive"));
        }
        if self.run_timeout.is_some_and(|t| t.is_zero()) {
            return Err(VerifyError::configuration("run timeout must be positive"));
        }
        if self.policy.max_artifact_size == 0 {
            return Err(VerifyError::configuration("max artifact size must be positive"));
        }
        if self.policy.max_scan_age.is_zero() || self.policy.max_attestation_age.is_zero() {
            return Err(VerifyError::configuration("freshness windows must be positive"));
        }
        for fp in &self.policy.trusted_roots {
            let hex_part = fp.trim().trim_start_matches("sha256:");
            if hex_part.len() != 64 || hex::decode(hex_part).is_err() {
                return Err(VerifyError::configuration(format!(
                    "trusted root '{fp}' is not a SHA-256 fingerprint"
                )));
            }
        }
        if let Some(repo) = &self.repository {
            validate_repository(repo)?;
        }
        if let Target::Release { repository, tag } = &self.target {
            validate_repository(repository)?;
            if tag.trim().is_empty() {
                return Err(VerifyError::configuration("release tag must not be empty"));
            }
        }
        if self.api_url.trim().is_empty() {
            return Err(VerifyError::configuration("API URL must not be empty"));
        }
        Ok(())
    }

    /// Repository identifier for the run: the release target's, else the configured one.
    pub fn effective_repository(&self) -> Option<&str> {
        match &self.target {
            Target::Release { repository, .. } => Some(repository),
            Target::Local(_) => self.repository.as_deref(),
        }
    }
}

fn validate_repository(repo: &str) -> Result<(), VerifyError> {
    let valid = matches!(
        repo.split_once('/'),
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/')
    );
    if valid {
        Ok(())
    } else {
        Err(VerifyError::configuration(format!(
            "repository '{repo}' must look like owner/name"
        )))
    }
}
