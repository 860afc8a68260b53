//! Verification reports and their text/JSON renderings.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::VerifyError;
use crate::types::{Artifact, CheckResult, Severity, Verdict};

/// Exit status for a `Fail` verdict.
pub const EXIT_FAIL: i32 = 1;

/// Exit status for a `Warn` verdict under `--strict`.
pub const EXIT_STRICT_WARN: i32 = 2;

/// Identity of a verified artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    /// File name.
    pub name: String,
    /// Declared version.
    pub version: Option<String>,
    /// Located size in bytes.
    pub size: u64,
    /// SHA-256 of the content, when it could be read.
    pub sha256: Option<String>,
}

impl ArtifactSummary {
    /// Summarize `artifact` with its computed digest.
    pub fn new(artifact: &Artifact, sha256: Option<String>) -> Self {
        Self {
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            size: artifact.size,
            sha256,
        }
    }
}

/// One check's outcome within a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckEntry {
    /// Check id.
    pub id: String,
    /// Check name.
    pub name: String,
    /// Check severity.
    pub severity: Severity,
    /// Whether a skip of this check affects the verdict.
    pub required: bool,
    /// Outcome, serialized as `result` and `reason`.
    #[serde(flatten)]
    pub result: CheckResult,
}

/// Report for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Artifact identity.
    pub artifact: ArtifactSummary,
    /// Aggregated verdict.
    pub verdict: Verdict,
    /// Results in registry order.
    pub checks: Vec<CheckEntry>,
}

impl VerificationReport {
    /// Find a check's entry by id.
    pub fn check(&self, id: &str) -> Option<&CheckEntry> {
        self.checks.iter().find(|c| c.id == id)
    }
}

/// Report for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Registry version the checks came from.
    pub registry_version: String,
    /// Target description.
    pub target: String,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// Worst artifact verdict.
    pub verdict: Verdict,
    /// Per-artifact reports in locator order.
    pub artifacts: Vec<VerificationReport>,
}

impl RunReport {
    /// Process exit code for this report.
    pub fn exit_code(&self, strict: bool) -> i32 {
        match self.verdict {
            Verdict::Pass => 0,
            Verdict::Warn if strict => EXIT_STRICT_WARN,
            Verdict::Warn => 0,
            Verdict::Fail => EXIT_FAIL,
        }
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String, VerifyError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VerifyError::retrieval(format!("failed to serialize report: {e}")))
    }

    /// Human-readable summary, optionally with ANSI colours.
    pub fn render_text(&self, color: bool) -> String {
        let mut out = String::new();
        let paint = |label: &str, code: &str| {
            if color {
                format!("\x1b[{code}m[{label}]\x1b[0m")
            } else {
                format!("[{label}]")
            }
        };

        let _ = writeln!(out, "RELEASE VERIFICATION");
        let _ = writeln!(out, "====================\n");
        let _ = writeln!(out, "Target:   {}", self.target);
        let _ = writeln!(out, "Registry: {}", self.registry_version);
        let _ = writeln!(
            out,
            "Time:     {}\n",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        for report in &self.artifacts {
            let artifact = &report.artifact;
            let _ = write!(out, "{}", artifact.name);
            if let Some(version) = &artifact.version {
                let _ = write!(out, " ({version})");
            }
            let _ = writeln!(out);
            if let Some(sha256) = &artifact.sha256 {
                let _ = writeln!(out, "  sha256: {sha256}");
            }

            for entry in &report.checks {
                // Labels share one width, so the escape codes never shift columns.
                let label = paint(entry.result.label(), result_color(&entry.result));
                let _ = write!(out, "  {label} {:<28} {:<8}", entry.id, entry.severity);
                if let Some(reason) = entry.result.reason() {
                    let _ = write!(out, " {reason}");
                }
                let _ = writeln!(out);
            }
            let _ = writeln!(
                out,
                "  Verdict: {}\n",
                paint(report.verdict.label(), verdict_color(report.verdict))
            );
        }

        let _ = writeln!(
            out,
            "Overall: {}",
            paint(self.verdict.label(), verdict_color(self.verdict))
        );
        out
    }
}

fn result_color(result: &CheckResult) -> &'static str {
    match result {
        CheckResult::Pass => "32",
        CheckResult::Warn(_) => "33",
        CheckResult::Fail(_) => "31",
        CheckResult::Skip(_) => "90",
    }
}

fn verdict_color(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => "32",
        Verdict::Warn => "33",
        Verdict::Fail => "31",
    }
}
