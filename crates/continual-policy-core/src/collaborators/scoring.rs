//! Deterministic scoring of policy updates

use std::collections::HashSet;

use super::{JudgeVerdict, PolicyRuleSet, PolicyScorer};

/// Fraction of the judge's failure modes addressed by at least one added rule.
///
/// Failure modes and `addresses` entries are compared after trimming and
/// lowercasing. A rule set that adds nothing scores `0.0`; one that adds
/// rules when the judge listed no failure modes scores `1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureCoverageScorer;

fn key(text: &str) -> String {
    text.trim().to_lowercase()
}

impl PolicyScorer for FailureCoverageScorer {
    fn score(&self, judge: &JudgeVerdict, rule_set: &PolicyRuleSet) -> f64 {
        let rules = match rule_set.as_value()["add_rules"].as_array() {
            Some(rules) if !rules.is_empty() => rules,
            _ => return 0.0,
        };

        let modes: HashSet<String> = judge.failure_modes().into_iter().map(key).collect();
        if modes.is_empty() {
            return 1.0;
        }

        let addressed: HashSet<String> = rules
            .iter()
            .filter_map(|rule| rule["addresses"].as_array())
            .flatten()
            .filter_map(|mode| mode.as_str())
            .map(key)
            .collect();

        let covered = modes.iter().filter(|mode| addressed.contains(*mode)).count();
        covered as f64 / modes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verdict(modes: &[&str]) -> JudgeVerdict {
        JudgeVerdict::from_value(json!({
            "verdict": "fail",
            "rationale": "r",
            "evidence": [],
            "failure_modes": modes
        }))
        .unwrap()
    }

    fn rules(addresses: &[&[&str]]) -> PolicyRuleSet {
        let add: Vec<_> = addresses
            .iter()
            .enumerate()
            .map(|(i, a)| json!({"id": format!("r{}", i), "rule": "x", "addresses": a}))
            .collect();
        PolicyRuleSet::new(json!({"add_rules": add, "remove_rules": [], "summary": ""}))
    }

    #[test]
    fn test_full_coverage() {
        let score = FailureCoverageScorer.score(
            &verdict(&["off by one", "Empty input"]),
            &rules(&[&["off by one"], &[" empty input "]]),
        );
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_partial_coverage() {
        let score = FailureCoverageScorer.score(
            &verdict(&["a", "b", "c", "d"]),
            &rules(&[&["a", "b"], &["c", "unrelated"]]),
        );
        assert_eq!(score, 0.75);
    }

    #[test]
    fn test_nothing_added() {
        assert_eq!(FailureCoverageScorer.score(&verdict(&["a"]), &rules(&[])), 0.0);
        assert_eq!(
            FailureCoverageScorer.score(&verdict(&["a"]), &PolicyRuleSet::new(json!({}))),
            0.0
        );
    }

    #[test]
    fn test_no_failure_modes() {
        assert_eq!(FailureCoverageScorer.score(&verdict(&[]), &rules(&[&[]])), 1.0);
    }

    #[test]
    fn test_duplicate_modes_count_once() {
        let score = FailureCoverageScorer.score(&verdict(&["a", "A", "b"]), &rules(&[&["a"]]));
        assert_eq!(score, 0.5);
    }
}
