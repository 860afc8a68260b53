//! # black-verify-core
//!
//! Release provenance verification for published artifacts: checksums,
//! signatures, attestations, SBOMs and vulnerability reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   VerificationEngine                         │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              ArtifactLocator                      │      │
//! │  │     (local directory or GitHub release)          │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │  per artifact, bounded          │
//! │                           ▼                                  │
//! │  ┌──────────┐ ┌──────────┐ ┌───────────┐ ┌──────────┐      │
//! │  │ checksum │ │signature │ │attestation│ │ sbom/vuln│ ...  │
//! │  └──────────┘ └──────────┘ └───────────┘ └──────────┘      │
//! │          EvidenceFetchers (concurrent, timed out)           │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │       CheckRegistry (frozen, versioned)          │      │
//! │  │   pure checks → Pass / Warn / Fail / Skip        │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │     aggregate → VerificationReport / RunReport   │      │
//! │  └──────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Result Semantics
//!
//! - **Fail** only comes from evidence that was retrieved and found invalid
//! - **Skip** marks absent or unretrievable evidence; a skipped required
//!   check raises the verdict to Warn
//! - **Cancellation** yields no report at all

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod checks;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod locator;
pub mod release;
pub mod report;
pub mod source;
pub mod types;

pub use checks::{Check, CheckContext, CheckRegistry, REGISTRY_VERSION};
pub use config::{Policy, Target, VerifyConfig};
pub use engine::{aggregate, evaluate, VerificationEngine};
pub use error::VerifyError;
pub use evidence::{EvidenceBundle, EvidenceFetcher, EvidenceSlot, Fetched};
pub use locator::{ArtifactLocator, Located};
pub use report::{CheckEntry, RunReport, VerificationReport};
pub use source::{AssetSource, LocalDirSource};
pub use types::{Artifact, CheckResult, ContentRef, EvidenceKind, Severity, Verdict};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
