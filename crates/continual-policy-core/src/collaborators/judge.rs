//! Model-backed judge

use async_trait::async_trait;

use super::{Judge, JudgeRequest, JudgeVerdict, ModelInvoker};
use crate::config::DEFAULT_MAX_RETRIES;
use crate::contracts::{ContractRegistry, ContractSchema, JUDGE_OUTPUT};
use crate::error::Result;
use crate::invocation::invoke_until_valid;

/// Judges a solution by asking the model for a `judge_output` document.
///
/// The output goes through the contract-validated loop, so a verdict that
/// reaches the caller is always schema-valid. A model that never produces a
/// valid verdict fails the call with a contract violation.
#[derive(Debug, Clone)]
pub struct ModelJudge {
    system_prompt: &'static str,
    max_retries: u32,
}

impl ModelJudge {
    pub fn new(registry: &ContractRegistry) -> Result<Self> {
        Ok(Self {
            system_prompt: registry.system_prompt_for(JUDGE_OUTPUT)?,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

fn render_request(request: &JudgeRequest<'_>) -> String {
    let tests = serde_json::to_string_pretty(request.tests)
        .unwrap_or_else(|_| request.tests.to_string());
    format!(
        "PROBLEM:\n{}\n\nCANDIDATE_SOLUTION:\n{}\n\nTEST_RESULTS:\n{}\n\nREFERENCE_SOLUTION:\n{}\n",
        request.problem, request.solution, tests, request.reference_solution
    )
}

#[async_trait]
impl Judge for ModelJudge {
    async fn judge(
        &self,
        request: JudgeRequest<'_>,
        model: &dyn ModelInvoker,
        schema: &ContractSchema,
    ) -> Result<JudgeVerdict> {
        let prompt = render_request(&request);
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

        JudgeVerdict::from_value(output)
    }
}
