//! Property-based tests for aggregation and registry evaluation.

use black_verify_core::checks::CheckRegistry;
use black_verify_core::config::Policy;
use black_verify_core::evidence::{ArtifactContent, Evidence, EvidenceBundle, EvidenceSlot};
use black_verify_core::report::CheckEntry;
use black_verify_core::{aggregate, evaluate, Artifact, CheckResult, ContentRef, EvidenceKind, Severity, Verdict};
use chrono::Utc;
use proptest::prelude::*;

/// Strategy for arbitrary check results.
fn check_result() -> impl Strategy<Value = CheckResult> {
    prop_oneof![
        Just(CheckResult::Pass),
        "[a-z ]{0,12}".prop_map(CheckResult::Warn),
        "[a-z ]{0,12}".prop_map(CheckResult::Fail),
        "[a-z ]{0,12}".prop_map(CheckResult::Skip),
    ]
}

/// Strategy for report entries.
fn entries() -> impl Strategy<Value = Vec<CheckEntry>> {
    prop::collection::vec(
        (check_result(), any::<bool>()).prop_map(|(result, required)| CheckEntry {
            id: "check".into(),
            name: "check".into(),
            severity: Severity::Medium,
            required,
            result,
        }),
        0..20,
    )
}

/// Strategy for an unavailable evidence slot.
fn unavailable_slot() -> impl Strategy<Value = EvidenceSlot> {
    prop_oneof![
        "[a-z ]{1,16}".prop_map(EvidenceSlot::Absent),
        "[a-z ]{1,16}".prop_map(EvidenceSlot::Errored),
    ]
}

/// Reference statement of the aggregation rule.
fn expected_verdict(entries: &[CheckEntry]) -> Verdict {
    if entries.iter().any(|e| e.result.is_fail()) {
        Verdict::Fail
    } else if entries
        .iter()
        .any(|e| e.result.is_warn() || (e.required && e.result.is_skip()))
    {
        Verdict::Warn
    } else {
        Verdict::Pass
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    // ========================================================================
    // Aggregation Properties
    // ========================================================================

    /// The verdict follows the Fail > Warn/required-Skip > Pass rule.
    #[test]
    fn aggregate_matches_rule(entries in entries()) {
        prop_assert_eq!(aggregate(&entries), expected_verdict(&entries));
    }

    /// The verdict does not depend on entry order.
    #[test]
    fn aggregate_is_order_independent(entries in entries(), rotate in 0usize..20) {
        let mut shuffled = entries.clone();
        shuffled.reverse();
        if !shuffled.is_empty() {
            let by = rotate % shuffled.len();
            shuffled.rotate_left(by);
        }
        prop_assert_eq!(aggregate(&entries), aggregate(&shuffled));
    }

    // ========================================================================
    // Registry Evaluation Properties
    // ========================================================================

    /// Unavailable evidence only ever skips checks, in registry order.
    #[test]
    fn missing_evidence_never_fails(
        bytes in prop::collection::vec(any::<u8>(), 1..256),
        content_present in any::<bool>(),
        slots in prop::collection::vec(unavailable_slot(), 6),
    ) {
        let registry = CheckRegistry::standard();
        let policy = Policy::default();
        let artifact = Artifact {
            name: "tool.bin".into(),
            version: None,
            content: ContentRef::Local { path: "tool.bin".into() },
            size: bytes.len() as u64,
            declared_digest: None,
        };

        let mut bundle = EvidenceBundle::new();
        for (kind, slot) in EvidenceKind::ALL.iter().zip(slots) {
            bundle.insert(*kind, slot);
        }
        if content_present {
            bundle = bundle.with(Evidence::Content(ArtifactContent::new(bytes)));
        }

        let report = evaluate(&registry, &policy, &artifact, &bundle, Utc::now());

        let ids: Vec<&str> = report.checks.iter().map(|c| c.id.as_str()).collect();
        let expected: Vec<&str> = registry.checks().iter().map(|c| c.id()).collect();
        prop_assert_eq!(ids, expected);
        prop_assert!(report.checks.iter().all(|c| !c.result.is_fail()));
        prop_assert_ne!(report.verdict, Verdict::Fail);

        for entry in &report.checks {
            let check = registry.checks().iter().find(|c| c.id() == entry.id).unwrap();
            let needs_missing = check
                .requires()
                .iter()
                .any(|k| bundle.missing_reason(*k).is_some());
            if needs_missing {
                prop_assert!(entry.result.is_skip(), "{} should skip", entry.id);
            }
        }
    }
}
