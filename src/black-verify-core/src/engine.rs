//! The verification engine.
//!
//! Drives a run through its stages:
//! 1. Locate artifacts for the target
//! 2. Fetch every evidence kind per artifact, concurrently, each under a timeout
//! 3. Evaluate the registry against the bundle (pure)
//! 4. Aggregate verdicts
//!
//! ## Failure semantics
//!
//! - Locate-stage errors abort the run before any report exists
//! - Per-evidence errors and timeouts degrade to skipped checks
//! - Cancellation (interrupt or run timeout) drops in-flight fetches and
//!   returns [`VerifyError::Cancelled`] without a partial report

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::checks::{run_check, CheckContext, CheckRegistry};
use crate::config::{Policy, VerifyConfig};
use crate::error::VerifyError;
use crate::evidence::{default_fetchers, EvidenceBundle, EvidenceFetcher, EvidenceSlot, Fetched};
use crate::locator::{ArtifactLocator, Located};
use crate::report::{ArtifactSummary, CheckEntry, RunReport, VerificationReport};
use crate::source::AssetSource;
use crate::types::{Artifact, CheckResult, Verdict};

/// Aggregate check results into a verdict.
///
/// `Fail` if any check failed; else `Warn` if any warned or a required
/// check was skipped; else `Pass`. Independent of entry order.
pub fn aggregate(entries: &[CheckEntry]) -> Verdict {
    entries
        .iter()
        .map(|entry| match &entry.result {
            CheckResult::Fail(_) => Verdict::Fail,
            CheckResult::Warn(_) => Verdict::Warn,
            CheckResult::Skip(_) if entry.required => Verdict::Warn,
            CheckResult::Skip(_) | CheckResult::Pass => Verdict::Pass,
        })
        .max()
        .unwrap_or(Verdict::Pass)
}

/// Evaluate every registry check against one artifact's evidence.
pub fn evaluate(
    registry: &CheckRegistry,
    policy: &Policy,
    artifact: &Artifact,
    bundle: &EvidenceBundle,
    now: DateTime<Utc>,
) -> VerificationReport {
    let ctx = CheckContext {
        artifact,
        bundle,
        policy,
        now,
    };

    let checks: Vec<CheckEntry> = registry
        .checks()
        .iter()
        .map(|check| {
            let result = run_check(check.as_ref(), &ctx);
            debug!(
                artifact = %artifact.name,
                check = check.id(),
                result = result.label(),
                reason = result.reason().unwrap_or_default(),
                "Evaluated check"
            );
            CheckEntry {
                id: check.id().to_string(),
                name: check.name().to_string(),
                severity: check.severity(),
                required: policy.is_required(check.id()),
                result,
            }
        })
        .collect();

    VerificationReport {
        artifact: ArtifactSummary::new(artifact, bundle.content().map(|c| c.sha256.clone())),
        verdict: aggregate(&checks),
        checks,
    }
}

/// Runs verifications for one configuration.
pub struct VerificationEngine {
    config: VerifyConfig,
    registry: Arc<CheckRegistry>,
    fetchers: Vec<Arc<dyn EvidenceFetcher>>,
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("fetchers", &self.fetchers.iter().map(|x| x.kind()).collect::<Vec<_>>())
            .finish()
    }
}

impl VerificationEngine {
    /// Create an engine with the standard fetchers.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Configuration`] if the configuration is invalid
    /// for `registry`.
    pub fn new(mut config: VerifyConfig, registry: Arc<CheckRegistry>) -> Result<Self, VerifyError> {
        config.validate(&registry)?;
        let repository = config.effective_repository().map(str::to_string);
        config.policy = config.policy.resolved(repository.as_deref());
        let fetchers = default_fetchers(&config);

        info!(
            target = %config.target.describe(),
            registry = registry.version(),
            checks = registry.len(),
            workers = config.workers,
            "VerificationEngine: initialized"
        );
        Ok(Self {
            config,
            registry,
            fetchers,
        })
    }

    /// Replace the evidence fetchers.
    pub fn with_fetchers(mut self, fetchers: Vec<Arc<dyn EvidenceFetcher>>) -> Self {
        self.fetchers = fetchers;
        self
    }

    /// Effective configuration (policy defaults resolved).
    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// The check registry.
    pub fn registry(&self) -> &Arc<CheckRegistry> {
        &self.registry
    }

    /// Locate and verify the configured target.
    ///
    /// # Errors
    ///
    /// - [`VerifyError::NotFound`] / [`VerifyError::Retrieval`] from locating
    /// - [`VerifyError::Cancelled`] if `cancel` fires or the run timeout expires
    #[instrument(skip_all, fields(target = %self.config.target.describe()))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport, VerifyError> {
        let work = async {
            let locator = ArtifactLocator::new(&self.config);
            let located = tokio::select! {
                _ = cancel.cancelled() => return Err(VerifyError::Cancelled),
                located = locator.locate(&self.config.target) => located?,
            };
            self.verify_located(located, &cancel).await
        };

        match self.config.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "Run timed out; cancelling");
                    cancel.cancel();
                    Err(VerifyError::Cancelled)
                },
            },
            None => work.await,
        }
    }

    /// Verify already-located artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Cancelled`] if `cancel` fires before every
    /// artifact's evidence has settled.
    pub async fn verify_located(
        &self,
        located: Located,
        cancel: &CancellationToken,
    ) -> Result<RunReport, VerifyError> {
        let now = Utc::now();
        let source = located.source.as_ref();

        let artifacts: Vec<VerificationReport> = futures::stream::iter(&located.artifacts)
            .map(|artifact| self.verify_artifact(artifact, source, now, cancel))
            .buffered(self.config.workers)
            .try_collect()
            .await?;

        let verdict = artifacts
            .iter()
            .map(|r| r.verdict)
            .max()
            .unwrap_or(Verdict::Pass);
        info!(
            artifacts = artifacts.len(),
            verdict = %verdict,
            "Verification complete"
        );

        Ok(RunReport {
            registry_version: self.registry.version().to_string(),
            target: located.description,
            generated_at: now,
            verdict,
            artifacts,
        })
    }

    async fn verify_artifact(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport, VerifyError> {
        let bundle = self.collect_evidence(artifact, source, cancel).await?;
        let report = evaluate(&self.registry, &self.config.policy, artifact, &bundle, now);
        info!(artifact = %artifact.name, verdict = %report.verdict, "Artifact verified");
        Ok(report)
    }

    /// Run every needed fetcher for `artifact` concurrently.
    #[instrument(skip_all, fields(artifact = %artifact.name))]
    async fn collect_evidence(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
        cancel: &CancellationToken,
    ) -> Result<EvidenceBundle, VerifyError> {
        let needed = self.registry.required_kinds();
        let timeout = self.config.fetch_timeout;

        let fetches = self
            .fetchers
            .iter()
            .filter(|f| needed.contains(&f.kind()))
            .map(|fetcher| async move {
                let kind = fetcher.kind();
                let slot = match tokio::time::timeout(timeout, fetcher.fetch(artifact, source)).await {
                    Ok(Ok(Fetched::Found(evidence))) if evidence.kind() == kind => {
                        EvidenceSlot::Present(evidence)
                    },
                    Ok(Ok(Fetched::Found(evidence))) => EvidenceSlot::Errored(format!(
                        "{kind} fetcher returned {} evidence",
                        evidence.kind()
                    )),
                    Ok(Ok(Fetched::Missing(reason))) => {
                        debug!(kind = %kind, reason = %reason, "Evidence absent");
                        EvidenceSlot::Absent(reason)
                    },
                    Ok(Err(e)) => {
                        warn!(kind = %kind, error = %e, "Evidence retrieval failed");
                        EvidenceSlot::Errored(e.to_string())
                    },
                    Err(_) => {
                        warn!(kind = %kind, timeout_secs = timeout.as_secs(), "Evidence fetch timed out");
                        EvidenceSlot::Errored(format!("timed out after {}s", timeout.as_secs()))
                    },
                };
                (kind, slot)
            });

        let slots = tokio::select! {
            _ = cancel.cancelled() => return Err(VerifyError::Cancelled),
            slots = join_all(fetches) => slots,
        };

        let mut bundle = EvidenceBundle::new();
        for (kind, slot) in slots {
            bundle.insert(kind, slot);
        }
        Ok(bundle)
    }
}
