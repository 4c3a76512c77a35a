//! Prompt assembly
//!
//! Pure formatting helpers. Nothing here validates content; the contract
//! schema is what constrains the eventual model output.

use crate::classifier::TaskType;

/// Placeholder for the base policy in the coder template
pub const BASE_POLICY_PLACEHOLDER: &str = "{{BASE_POLICY}}";
/// Placeholder for the learned policy in the coder template
pub const LEARNED_POLICY_PLACEHOLDER: &str = "{{LEARNED_POLICY}}";
/// Placeholder for the problem statement in the coder template
pub const PROBLEM_PLACEHOLDER: &str = "{{PROBLEM}}";

/// Build the user prompt from the query, optional context and task type
pub fn build_user_prompt(user_query: &str, context: Option<&str>, task_type: TaskType) -> String {
    format!(
        "TASK_TYPE: {}\nCONTEXT:\n{}\n\nUSER_QUERY:\n{}\n",
        task_type,
        context.unwrap_or(""),
        user_query
    )
}

/// Substitute the three coder placeholders, base policy first
pub fn render_coder_prompt(
    template: &str,
    base_policy: &str,
    learned_policy: &str,
    problem: &str,
) -> String {
    template
        .replace(BASE_POLICY_PLACEHOLDER, base_policy)
        .replace(LEARNED_POLICY_PLACEHOLDER, learned_policy)
        .replace(PROBLEM_PLACEHOLDER, problem)
}
