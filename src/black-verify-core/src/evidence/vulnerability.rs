//! Vulnerability scan reports.
//!
//! Two shapes are accepted: the normalized form
//! `{ "scanner", "generated_at", "findings": [{ "id", "package", "severity" }] }`
//! and raw `osv-scanner --format json` output.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::sbom::SBOM_SUFFIXES;
use super::{fetch_first, Evidence, EvidenceFetcher, Fetched};
use crate::error::VerifyError;
use crate::source::AssetSource;
use crate::types::{Artifact, EvidenceKind, Severity};

/// Scanner binary invoked when no report is published.
pub const OSV_SCANNER: &str = "osv-scanner";

/// One reported vulnerability.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Finding {
    /// Advisory id (`GHSA-...`, `CVE-...`).
    pub id: String,
    /// Affected package.
    #[serde(default)]
    pub package: Option<String>,
    /// Severity band.
    pub severity: Severity,
}

/// A scan report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnerabilityReport {
    /// Scanner name.
    pub scanner: String,
    /// When the scan ran.
    pub generated_at: Option<DateTime<Utc>>,
    /// Findings.
    pub findings: Vec<Finding>,
}

#[derive(Deserialize)]
struct NormalizedReport {
    #[serde(default)]
    scanner: Option<String>,
    #[serde(default)]
    generated_at: Option<DateTime<Utc>>,
    findings: Vec<Finding>,
}

impl VulnerabilityReport {
    /// Parse either report shape.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerifyError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| {
            VerifyError::check_failure(format!("vulnerability report is not JSON: {e}"))
        })?;

        if value.get("findings").is_some() {
            let report: NormalizedReport = serde_json::from_value(value).map_err(|e| {
                VerifyError::check_failure(format!("malformed vulnerability report: {e}"))
            })?;
            return Ok(Self {
                scanner: report.scanner.unwrap_or_else(|| "unknown".into()),
                generated_at: report.generated_at,
                findings: report.findings,
            });
        }

        if let Some(results) = value.get("results").and_then(Value::as_array) {
            return Ok(Self {
                scanner: OSV_SCANNER.into(),
                generated_at: None,
                findings: results.iter().flat_map(osv_findings).collect(),
            });
        }

        Err(VerifyError::check_failure(
            "vulnerability report has neither findings nor osv-scanner results",
        ))
    }

    /// Highest finding severity, if any.
    pub fn worst(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// Flatten one osv-scanner `results[]` entry.
fn osv_findings(result: &Value) -> Vec<Finding> {
    let mut findings = Vec::new();
    let packages = result.get("packages").and_then(Value::as_array);
    for pkg in packages.into_iter().flatten() {
        let name = pkg
            .pointer("/package/name")
            .and_then(Value::as_str)
            .map(str::to_string);
        let groups = pkg.get("groups").and_then(Value::as_array);
        let vulns = pkg.get("vulnerabilities").and_then(Value::as_array);

        for vuln in vulns.into_iter().flatten() {
            let Some(id) = vuln.get("id").and_then(Value::as_str) else {
                continue;
            };
            let from_group = groups
                .into_iter()
                .flatten()
                .find(|g| {
                    g.get("ids")
                        .and_then(Value::as_array)
                        .is_some_and(|ids| ids.iter().any(|i| i.as_str() == Some(id)))
                })
                .and_then(|g| g.get("max_severity"))
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<f64>().ok())
                .map(Severity::from_cvss);
            let from_database = vuln
                .pointer("/database_specific/severity")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Severity>().ok());

            findings.push(Finding {
                id: id.to_string(),
                package: name.clone(),
                severity: from_group.or(from_database).unwrap_or(Severity::Medium),
            });
        }
    }
    findings
}

/// A retrieved report. Parse errors are kept so checks can fail on them.
#[derive(Debug, Clone)]
pub struct VulnerabilityEvidence {
    /// Report file, or the scanner that produced it.
    pub origin: String,
    /// Parsed report, or why it could not be parsed.
    pub report: Result<VulnerabilityReport, String>,
}

/// Reads `<artifact>.osv.json` / `<artifact>.vulns.json`, optionally
/// falling back to running `osv-scanner` against a local SBOM.
#[derive(Debug, Clone)]
pub struct VulnerabilityFetcher {
    scanner: Option<String>,
}

impl VulnerabilityFetcher {
    /// Create a fetcher; `run_scanner` enables the `osv-scanner` fallback.
    pub fn new(run_scanner: bool) -> Self {
        Self {
            scanner: run_scanner.then(|| OSV_SCANNER.to_string()),
        }
    }

    /// Use a specific scanner program for the fallback.
    pub fn with_scanner(program: impl Into<String>) -> Self {
        Self {
            scanner: Some(program.into()),
        }
    }

    async fn scan(&self, program: &str, sbom: &Path) -> Result<Fetched, VerifyError> {
        info!(scanner = %program, sbom = %sbom.display(), "Running vulnerability scanner");
        let output = match Command::new(program)
            .args(["--format", "json", "--sbom"])
            .arg(sbom)
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(scanner = %program, "Vulnerability scanner not installed");
                return Ok(Fetched::Missing(format!("{program} is not installed")));
            },
            Err(e) => {
                return Err(VerifyError::retrieval(format!("failed to run {program}: {e}")));
            },
        };

        // osv-scanner exits 1 when it finds vulnerabilities.
        if !matches!(output.status.code(), Some(0 | 1)) {
            return Err(VerifyError::retrieval(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let report = VulnerabilityReport::parse(&output.stdout)
            .map(|mut report| {
                report.generated_at = Some(Utc::now());
                report
            })
            .map_err(|e| e.to_string());
        Ok(Fetched::Found(Evidence::Vulnerability(VulnerabilityEvidence {
            origin: program.to_string(),
            report,
        })))
    }
}

#[async_trait]
impl EvidenceFetcher for VulnerabilityFetcher {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Vulnerability
    }

    async fn fetch(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        let candidates = ["osv.json", "vulns.json"].map(|ext| format!("{}.{ext}", artifact.name));
        if let Some((file, bytes)) = fetch_first(source, &candidates).await? {
            let report = VulnerabilityReport::parse(&bytes).map_err(|e| match e {
                VerifyError::CheckFailure { reason } => reason,
                other => other.to_string(),
            });
            debug!(artifact = %artifact.name, file = %file, "Read vulnerability report");
            return Ok(Fetched::Found(Evidence::Vulnerability(VulnerabilityEvidence {
                origin: file,
                report,
            })));
        }

        let Some(program) = &self.scanner else {
            return Ok(Fetched::Missing("no vulnerability report published".into()));
        };
        let sbom = SBOM_SUFFIXES
            .iter()
            .find_map(|ext| source.local_path(&format!("{}.{ext}", artifact.name)));
        match sbom {
            Some(path) => self.scan(program, &path).await,
            None => Ok(Fetched::Missing(
                "no vulnerability report published and no local SBOM to scan".into(),
            )),
        }
    }
}
