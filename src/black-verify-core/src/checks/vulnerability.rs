//! Vulnerability report checks.

use super::{freshness, ids, Check, CheckContext};
use crate::evidence::VulnerabilityReport;
use crate::types::{CheckResult, EvidenceKind, Severity};

fn report<'a>(ctx: &'a CheckContext<'_>) -> Result<&'a VulnerabilityReport, CheckResult> {
    match ctx.bundle.vulnerability() {
        Some(evidence) => evidence
            .report
            .as_ref()
            .map_err(|reason| CheckResult::fail(format!("{}: {reason}", evidence.origin))),
        None => Err(CheckResult::skip("vulnerability evidence unavailable")),
    }
}

/// No finding reaches the severity threshold.
#[derive(Debug, Clone, Copy)]
pub struct VulnerabilityThreshold;

impl Check for VulnerabilityThreshold {
    fn id(&self) -> &'static str {
        ids::VULNERABILITY_THRESHOLD
    }

    fn name(&self) -> &'static str {
        "No vulnerabilities above threshold"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Vulnerability]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let report = match report(ctx) {
            Ok(report) => report,
            Err(result) => return result,
        };
        let threshold = ctx.policy.severity_threshold;

        let blocking: Vec<String> = report
            .findings
            .iter()
            .filter(|f| f.severity >= threshold)
            .map(|f| format!("{} ({})", f.id, f.severity))
            .collect();
        if !blocking.is_empty() {
            return CheckResult::fail(format!(
                "{} finding(s) at or above {threshold}: {}",
                blocking.len(),
                blocking.join(", ")
            ));
        }
        match report.worst() {
            Some(worst) => CheckResult::warn(format!(
                "{} finding(s) below {threshold} (worst: {worst})",
                report.findings.len()
            )),
            None => CheckResult::Pass,
        }
    }
}

/// The scan report is recent.
#[derive(Debug, Clone, Copy)]
pub struct VulnerabilityFreshness;

impl Check for VulnerabilityFreshness {
    fn id(&self) -> &'static str {
        ids::VULNERABILITY_FRESHNESS
    }

    fn name(&self) -> &'static str {
        "Vulnerability scan is fresh"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn requires(&self) -> &'static [EvidenceKind] {
        &[EvidenceKind::Vulnerability]
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        match report(ctx) {
            Ok(report) => freshness(
                "scan report",
                report.generated_at,
                ctx.now,
                ctx.policy.max_scan_age,
                ctx.policy.clock_skew,
            ),
            Err(result) => result,
        }
    }
}
