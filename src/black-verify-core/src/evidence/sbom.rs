//! Software bills of materials (SPDX 2.x and CycloneDX JSON).

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{fetch_first, Evidence, EvidenceFetcher, Fetched};
use crate::error::VerifyError;
use crate::source::AssetSource;
use crate::types::{Artifact, EvidenceKind};

/// File suffixes tried for an artifact's SBOM, in order.
pub const SBOM_SUFFIXES: &[&str] = &["spdx.json", "cdx.json", "sbom.json"];

const SPDX_REQUIRED: &[&str] = &[
    "spdxVersion",
    "SPDXID",
    "name",
    "dataLicense",
    "documentNamespace",
    "creationInfo",
];

/// SBOM document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbomFormat {
    /// SPDX JSON.
    Spdx,
    /// CycloneDX JSON.
    CycloneDx,
}

impl fmt::Display for SbomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spdx => "SPDX",
            Self::CycloneDx => "CycloneDX",
        })
    }
}

/// The described component of a validated SBOM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbomDocument {
    /// Detected format.
    pub format: SbomFormat,
    /// `spdxVersion` or `specVersion`.
    pub spec_version: String,
    /// Name of the component the document describes.
    pub subject_name: Option<String>,
    /// Version of that component.
    pub subject_version: Option<String>,
    /// Number of packages or components listed.
    pub components: usize,
}

impl SbomDocument {
    /// Detect the format and validate its required fields.
    pub fn parse(bytes: &[u8]) -> Result<Self, VerifyError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| VerifyError::check_failure(format!("SBOM is not JSON: {e}")))?;

        if value.get("spdxVersion").is_some() {
            Self::parse_spdx(&value)
        } else if value.get("bomFormat").is_some() {
            Self::parse_cyclonedx(&value)
        } else {
            Err(VerifyError::check_failure(
                "SBOM is neither SPDX (spdxVersion) nor CycloneDX (bomFormat)",
            ))
        }
    }

    fn parse_spdx(value: &Value) -> Result<Self, VerifyError> {
        let missing: Vec<&str> = SPDX_REQUIRED
            .iter()
            .copied()
            .filter(|field| value.get(field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(VerifyError::check_failure(format!(
                "SPDX document is missing {}",
                missing.join(", ")
            )));
        }

        let packages = value
            .get("packages")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let described = value
            .get("documentDescribes")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .and_then(Value::as_str)
            .and_then(|id| {
                packages
                    .iter()
                    .find(|p| p.get("SPDXID").and_then(Value::as_str) == Some(id))
            })
            .or_else(|| packages.first());

        let subject_name = described
            .and_then(|p| p.get("name"))
            .or_else(|| value.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let subject_version = described
            .and_then(|p| p.get("versionInfo"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            format: SbomFormat::Spdx,
            spec_version: string_field(value, "spdxVersion"),
            subject_name,
            subject_version,
            components: packages.len(),
        })
    }

    fn parse_cyclonedx(value: &Value) -> Result<Self, VerifyError> {
        if value.get("bomFormat").and_then(Value::as_str) != Some("CycloneDX") {
            return Err(VerifyError::check_failure("bomFormat must be \"CycloneDX\""));
        }
        let spec_version = value
            .get("specVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| VerifyError::check_failure("CycloneDX document is missing specVersion"))?
            .to_string();

        let component = value.pointer("/metadata/component");
        Ok(Self {
            format: SbomFormat::CycloneDx,
            spec_version,
            subject_name: component
                .and_then(|c| c.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            subject_version: component
                .and_then(|c| c.get("version"))
                .and_then(Value::as_str)
                .map(str::to_string),
            components: value
                .get("components")
                .and_then(Value::as_array)
                .map_or(0, Vec::len),
        })
    }
}

fn string_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A retrieved SBOM. Validation errors are kept so checks can fail on them.
#[derive(Debug, Clone)]
pub struct SbomEvidence {
    /// File the SBOM was read from.
    pub file: String,
    /// Validated document, or why validation failed.
    pub document: Result<SbomDocument, String>,
}

/// Reads `<artifact>.spdx.json`, `<artifact>.cdx.json` or `<artifact>.sbom.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SbomFetcher;

#[async_trait]
impl EvidenceFetcher for SbomFetcher {
    fn kind(&self) -> EvidenceKind {
        EvidenceKind::Sbom
    }

    async fn fetch(
        &self,
        artifact: &Artifact,
        source: &dyn AssetSource,
    ) -> Result<Fetched, VerifyError> {
        let candidates: Vec<String> = SBOM_SUFFIXES
            .iter()
            .map(|ext| format!("{}.{ext}", artifact.name))
            .collect();
        let Some((file, bytes)) = fetch_first(source, &candidates).await? else {
            return Ok(Fetched::Missing("no SBOM published".into()));
        };

        let document = SbomDocument::parse(&bytes).map_err(|e| match e {
            VerifyError::CheckFailure { reason } => reason,
            other => other.to_string(),
        });
        debug!(artifact = %artifact.name, file = %file, valid = document.is_ok(), "Read SBOM");
        Ok(Fetched::Found(Evidence::Sbom(SbomEvidence { file, document })))
    }
}
