//! Structural validation of proposed rule sets

use std::collections::HashSet;

use super::{PolicyRuleSet, RuleValidator};
use crate::contracts::{ContractRegistry, ContractSchema, POLICY_DIFF};
use crate::error::{CoreError, Result};

/// Checks a rule set against the `policy_diff` schema, then rejects
/// duplicate rule ids and rules that are both added and removed.
#[derive(Debug)]
pub struct SchemaRuleValidator {
    schema: ContractSchema,
}

impl SchemaRuleValidator {
    pub fn new(registry: &ContractRegistry) -> Result<Self> {
        Ok(Self {
            schema: registry.compile(POLICY_DIFF)?,
        })
    }
}

impl RuleValidator for SchemaRuleValidator {
    fn validate(&self, rule_set: &PolicyRuleSet) -> Result<()> {
        let value = rule_set.as_value();
        self.schema
            .validate(value)
            .map_err(CoreError::invalid_rule_set)?;

        let added: Vec<&str> = value["add_rules"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|rule| rule["id"].as_str())
            .collect();

        let mut seen = HashSet::new();
        for id in &added {
            if !seen.insert(*id) {
                return Err(CoreError::invalid_rule_set(format!(
                    "duplicate rule id '{}'",
                    id
                )));
            }
        }

        let removed = value["remove_rules"].as_array().into_iter().flatten();
        for id in removed.filter_map(|id| id.as_str()) {
            if seen.contains(id) {
                return Err(CoreError::invalid_rule_set(format!(
                    "rule '{}' is both added and removed",
                    id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> SchemaRuleValidator {
        SchemaRuleValidator::new(&ContractRegistry::embedded()).unwrap()
    }

    #[test]
    fn test_valid_rule_set() {
        let rules = PolicyRuleSet::new(json!({
            "add_rules": [
                {
                    "id": "bounds",
                    "rule": "Check slice bounds.",
                    "addresses": ["index out of range"]
                },
                {"id": "empty", "rule": "Handle empty input.", "addresses": []}
            ],
            "remove_rules": ["legacy-rule"],
            "summary": "two new rules"
        }));
        validator().validate(&rules).unwrap();
    }

    #[test]
    fn test_schema_violation() {
        let rules = PolicyRuleSet::new(json!({"add_rules": "everything"}));
        let err = validator().validate(&rules).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRuleSet(_)));
    }

    #[test]
    fn test_bad_rule_id() {
        let rules = PolicyRuleSet::new(json!({
            "add_rules": [{"id": "Bad Id", "rule": "x", "addresses": []}],
            "remove_rules": [],
            "summary": ""
        }));
        let err = validator().validate(&rules).unwrap_err();
        assert!(err.to_string().contains("/add_rules/0/id"));
    }

    #[test]
    fn test_duplicate_ids() {
        let rules = PolicyRuleSet::new(json!({
            "add_rules": [
                {"id": "bounds", "rule": "a", "addresses": []},
                {"id": "bounds", "rule": "b", "addresses": []}
            ],
            "remove_rules": [],
            "summary": ""
        }));
        let err = validator().validate(&rules).unwrap_err();
        assert_eq!(err.to_string(), "Invalid rule set: duplicate rule id 'bounds'");
    }

    #[test]
    fn test_added_and_removed() {
        let rules = PolicyRuleSet::new(json!({
            "add_rules": [{"id": "bounds", "rule": "a", "addresses": []}],
            "remove_rules": ["bounds"],
            "summary": ""
        }));
        assert!(validator().validate(&rules).is_err());
    }
}
