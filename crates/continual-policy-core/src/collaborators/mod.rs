//! Collaborator interfaces
//!
//! The core never generates text, runs tests or decides what a good rule
//! is. Those capabilities are injected through the traits below. Calls into
//! the async collaborators are the only suspension points of the core.
//!
//! Reference implementations that drive the injected model through the
//! contract-validated invocation loop are provided for judging and rule
//! proposal, together with a structural rule validator and a deterministic
//! scorer.

pub mod judge;
pub mod proposer;
pub mod rules;
pub mod scoring;

pub use judge::ModelJudge;
pub use proposer::ModelRuleProposer;
pub use rules::SchemaRuleValidator;
pub use scoring::FailureCoverageScorer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::contracts::ContractSchema;
use crate::error::{CoreError, Result};

/// Errors raised by a model-invocation capability
#[derive(Error, Debug)]
pub enum ModelError {
    /// No provider is configured or it refused the request
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    /// Network or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with something that is not a structured value
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    /// The provider's own deadline expired
    #[error("Model timed out after {0}ms")]
    Timeout(u64),
}

/// Injected model capability: system prompt + user prompt to a parsed value.
///
/// Implementations must not retry or validate; the invocation loop owns both.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> std::result::Result<Value, ModelError>;
}

/// Runs the tests of a code location
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Produce an opaque test-result value that is passed through to judging
    async fn run(&self, code_location: &Path) -> Result<Value>;
}

/// Everything a judge gets to look at
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub problem: &'a str,
    /// Candidate solution, serialized as JSON
    pub solution: &'a str,
    pub tests: &'a Value,
    pub reference_solution: &'a str,
}

/// Judges a candidate solution. Output must be schema-valid by construction.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(
        &self,
        request: JudgeRequest<'_>,
        model: &dyn ModelInvoker,
        schema: &ContractSchema,
    ) -> Result<JudgeVerdict>;
}

/// Proposes a policy update from a failing judgement
#[async_trait]
pub trait RuleProposer: Send + Sync {
    async fn propose(
        &self,
        learned_policy: &str,
        judge: &JudgeVerdict,
        model: &dyn ModelInvoker,
        schema: &ContractSchema,
    ) -> Result<PolicyRuleSet>;
}

/// Structural check of a proposed rule set
pub trait RuleValidator: Send + Sync {
    /// Fails with [`CoreError::InvalidRuleSet`] when the rule set is malformed
    fn validate(&self, rule_set: &PolicyRuleSet) -> Result<()>;
}

/// Deterministic score of a proposed update, compared against the commit gate
pub trait PolicyScorer: Send + Sync {
    fn score(&self, judge: &JudgeVerdict, rule_set: &PolicyRuleSet) -> f64;
}

impl<F> PolicyScorer for F
where
    F: Fn(&JudgeVerdict, &PolicyRuleSet) -> f64 + Send + Sync,
{
    fn score(&self, judge: &JudgeVerdict, rule_set: &PolicyRuleSet) -> f64 {
        self(judge, rule_set)
    }
}

/// Pass/fail outcome of judging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
        }
    }
}

/// Judge output. Only `verdict` drives branching; the rest is carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub verdict: Verdict,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl JudgeVerdict {
    /// Parse a judge output value
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::collaborator("judge", format!("malformed verdict: {}", e)))
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// `failure_modes` entries, if the judge reported any
    pub fn failure_modes(&self) -> Vec<&str> {
        self.details
            .get("failure_modes")
            .and_then(Value::as_array)
            .map(|modes| modes.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.details.clone();
        map.insert(
            "verdict".to_string(),
            Value::String(self.verdict.to_string()),
        );
        Value::Object(map)
    }
}

/// A proposed policy update. Opaque to the core: validated, scored and stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyRuleSet(Value);

impl PolicyRuleSet {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Text form persisted by policy stores
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

impl From<Value> for PolicyRuleSet {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Await a collaborator call, bounded by `deadline` when one is configured
pub async fn with_deadline<T, F>(
    collaborator: &'static str,
    deadline: Option<Duration>,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            tracing::warn!(
                collaborator,
                timeout_ms = limit.as_millis() as u64,
                "Collaborator deadline expired"
            );
            CoreError::CollaboratorTimeout {
                collaborator,
                timeout_ms: limit.as_millis() as u64,
            }
        })?,
        None => call.await,
    }
}
