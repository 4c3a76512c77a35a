//! Model-backed rule proposer

use async_trait::async_trait;

use super::{JudgeVerdict, ModelInvoker, PolicyRuleSet, RuleProposer};
use crate::config::DEFAULT_MAX_RETRIES;
use crate::contracts::{ContractRegistry, ContractSchema, POLICY_DIFF};
use crate::error::Result;
use crate::invocation::invoke_until_valid;

/// Asks the model for a `policy_diff` that addresses a failing judgement
#[derive(Debug, Clone)]
pub struct ModelRuleProposer {
    system_prompt: &'static str,
    max_retries: u32,
}

impl ModelRuleProposer {
    pub fn new(registry: &ContractRegistry) -> Result<Self> {
        Ok(Self {
            system_prompt: registry.system_prompt_for(POLICY_DIFF)?,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

fn render_request(learned_policy: &str, judge: &JudgeVerdict) -> String {
    let learned = if learned_policy.trim().is_empty() {
        "(none yet)"
    } else {
        learned_policy
    };
    let judge = serde_json::to_string_pretty(&judge.to_value()).unwrap_or_default();
    format!(
        "CURRENT_LEARNED_POLICY:\n{}\n\nJUDGE_OUTPUT:\n{}\n",
        learned, judge
    )
}

#[async_trait]
impl RuleProposer for ModelRuleProposer {
    async fn propose(
        &self,
        learned_policy: &str,
        judge: &JudgeVerdict,
        model: &dyn ModelInvoker,
        schema: &ContractSchema,
    ) -> Result<PolicyRuleSet> {
        let prompt = render_request(learned_policy, judge);
        let output = invoke_until_valid(
            model,
            schema,
            self.system_prompt,
            &prompt,
            self.max_retries,
            None,
        )
        .await?
        .into_output(schema.contract_id())?;

        Ok(PolicyRuleSet::new(output))
    }
}
