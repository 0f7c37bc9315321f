//! Compatibility scoring.
//!
//! A pure, versioned function from analyzed workflow facts to a
//! compatibility score, status, and local-AI flag. Identical input always
//! produces identical output, which is what makes bulk re-scoring after a
//! version bump safe without re-fetching or re-parsing anything.

use crate::models::{Compatibility, CompatibilityStatus, WorkflowAnalysis};
use crate::rules::RuleSet;

/// Bumped whenever the scoring rules change. Records carrying an older
/// version are picked up by `wfcat rescore`.
pub const SCORER_VERSION: i64 = 2;

/// Score a workflow's compatibility with the local service stack.
///
/// - base 0.8 without external APIs, 0.4 with;
/// - +0.2 for local-AI node types (also sets `local_ai`);
/// - −0.3 when an external API is required;
/// - −0.1 per distinct external credential beyond the first;
/// - clamped to [0, 1].
pub fn score(analysis: &WorkflowAnalysis, rules: &RuleSet) -> Compatibility {
    let local_ai = analysis
        .node_types
        .iter()
        .any(|t| rules.is_local_ai(t));

    let mut value = if analysis.external_api_flag { 0.4 } else { 0.8 };
    if local_ai {
        value += 0.2;
    }
    if analysis.external_api_flag {
        value -= 0.3;
    }

    let external_credentials = analysis
        .required_credentials
        .iter()
        .filter(|c| !rules.is_local_credential(c))
        .count();
    if external_credentials > 1 {
        value -= 0.1 * (external_credentials - 1) as f64;
    }

    let value = round2(value.clamp(0.0, 1.0));

    let status = if value >= 0.9 && !analysis.external_api_flag {
        CompatibilityStatus::FullyCompatible
    } else if value >= 0.4 {
        CompatibilityStatus::PartiallyCompatible
    } else if value > 0.0 {
        CompatibilityStatus::RequiresExternal
    } else {
        CompatibilityStatus::Incompatible
    };

    Compatibility {
        score: value,
        status,
        local_ai,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(
        node_types: &[&str],
        credentials: &[&str],
        external_api_flag: bool,
    ) -> WorkflowAnalysis {
        WorkflowAnalysis {
            node_types: node_types.iter().map(|s| s.to_string()).collect(),
            required_credentials: credentials.iter().map(|s| s.to_string()).collect(),
            external_api_flag,
            ..Default::default()
        }
    }

    #[test]
    fn local_ai_workflow_is_fully_compatible() {
        let rules = RuleSet::default();
        let a = analysis(
            &["@vendor/nodes-lang.lmChatOllama", "vendor-nodes-base.postgres"],
            &["ollamaapi", "postgresapi"],
            false,
        );
        let c = score(&a, &rules);
        assert!(c.local_ai);
        assert_eq!(c.score, 1.0);
        assert_eq!(c.status, CompatibilityStatus::FullyCompatible);
    }

    #[test]
    fn plain_local_workflow_is_partially_compatible() {
        let rules = RuleSet::default();
        let a = analysis(&["vendor-nodes-base.postgres"], &["postgresapi"], false);
        let c = score(&a, &rules);
        assert!(!c.local_ai);
        assert_eq!(c.score, 0.8);
        assert_eq!(c.status, CompatibilityStatus::PartiallyCompatible);
    }

    #[test]
    fn external_api_workflow_requires_external() {
        let rules = RuleSet::default();
        let a = analysis(&["vendor-nodes-base.slack"], &["slackapi"], true);
        let c = score(&a, &rules);
        assert!(!c.local_ai);
        assert_eq!(c.score, 0.1);
        assert_eq!(c.status, CompatibilityStatus::RequiresExternal);
    }

    #[test]
    fn external_api_with_local_ai_still_requires_external() {
        let rules = RuleSet::default();
        let a = analysis(
            &["vendor-nodes-base.slack", "@vendor/nodes-lang.agent"],
            &["slackapi"],
            true,
        );
        let c = score(&a, &rules);
        assert!(c.local_ai);
        assert_eq!(c.score, 0.3);
        assert_eq!(c.status, CompatibilityStatus::RequiresExternal);
    }

    #[test]
    fn external_credentials_beyond_first_are_penalized() {
        let rules = RuleSet::default();
        // Two external credentials: one penalty step.
        let a = analysis(
            &["vendor-nodes-base.postgres"],
            &["openaiapi", "stripeapi"],
            false,
        );
        let c = score(&a, &rules);
        assert_eq!(c.score, 0.7);

        // Local credentials never count toward the penalty.
        let a = analysis(
            &["vendor-nodes-base.postgres"],
            &["postgresapi", "redisapi", "openaiapi"],
            false,
        );
        let c = score(&a, &rules);
        assert_eq!(c.score, 0.8);
    }

    #[test]
    fn score_is_clamped_to_unit_interval() {
        let rules = RuleSet::default();
        let creds: Vec<String> = (0..12).map(|i| format!("externalapi{i}")).collect();
        let cred_refs: Vec<&str> = creds.iter().map(String::as_str).collect();
        let a = analysis(&["vendor-nodes-base.slack"], &cred_refs, true);
        let c = score(&a, &rules);
        assert_eq!(c.score, 0.0);
        assert_eq!(c.status, CompatibilityStatus::Incompatible);
    }

    #[test]
    fn scoring_is_deterministic() {
        let rules = RuleSet::default();
        let a = analysis(
            &["@vendor/nodes-lang.chainLlm", "vendor-nodes-base.qdrant"],
            &["qdrantapi", "openaiapi"],
            false,
        );
        let first = score(&a, &rules);
        for _ in 0..100 {
            assert_eq!(score(&a, &rules), first);
        }
    }

    #[test]
    fn status_matches_threshold_mapping() {
        let rules = RuleSet::default();
        let external_creds: Vec<String> = (0..4).map(|i| format!("cloudapi{i}")).collect();
        let external_cred_refs: Vec<&str> = external_creds.iter().map(String::as_str).collect();
        let cases = [
            (analysis(&["@vendor/nodes-lang.lmOllama"], &[], false), CompatibilityStatus::FullyCompatible),
            (analysis(&["vendor-nodes-base.set"], &[], false), CompatibilityStatus::PartiallyCompatible),
            (analysis(&["vendor-nodes-base.notion"], &[], true), CompatibilityStatus::RequiresExternal),
            (
                // 0.4 − 0.3 − 3×0.1 clamps to zero: a hard external-only load.
                analysis(&["vendor-nodes-base.notion"], &external_cred_refs, true),
                CompatibilityStatus::Incompatible,
            ),
        ];
        for (a, expected) in cases {
            let c = score(&a, &rules);
            let recomputed = if c.score >= 0.9 && !a.external_api_flag {
                CompatibilityStatus::FullyCompatible
            } else if c.score >= 0.4 {
                CompatibilityStatus::PartiallyCompatible
            } else if c.score > 0.0 {
                CompatibilityStatus::RequiresExternal
            } else {
                CompatibilityStatus::Incompatible
            };
            assert_eq!(c.status, expected);
            assert_eq!(c.status, recomputed);
        }
    }
}
