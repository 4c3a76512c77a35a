//! Contract-validated invocation loop
//!
//! Calls the injected model with identical prompts until its output
//! validates against the contract schema or the retry budget runs out.
//! There is no backoff and no feedback of validation errors into later
//! attempts. Only validation failures are retried: a failing model call
//! propagates immediately.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{classify, Route, TaskType};
use crate::collaborators::{with_deadline, ModelInvoker};
use crate::config::{CoreConfig, DEFAULT_MAX_RETRIES};
use crate::contracts::{ContractRegistry, ContractSchema, GO_MODE_RESPONSE};
use crate::error::{CoreError, Result};
use crate::metrics::PolicyMetrics;
use crate::prompts::build_user_prompt;

/// Result of driving the model against a schema
#[derive(Debug, Clone, PartialEq)]
pub enum Attempted {
    /// A response validated on attempt number `attempts`
    Valid { output: Value, attempts: u32 },
    /// Every attempt failed validation
    Exhausted { last_error: String, attempts: u32 },
}

impl Attempted {
    pub fn attempts(&self) -> u32 {
        match self {
            Attempted::Valid { attempts, .. } | Attempted::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Convert exhaustion into a hard [`CoreError::ContractViolation`]
    pub fn into_output(self, contract_id: &str) -> Result<Value> {
        match self {
            Attempted::Valid { output, .. } => Ok(output),
            Attempted::Exhausted {
                last_error,
                attempts,
            } => Err(CoreError::ContractViolation {
                contract_id: contract_id.to_string(),
                attempts,
                details: last_error,
            }),
        }
    }
}

/// Call `model` up to `max_retries + 1` times until the output validates
pub async fn invoke_until_valid(
    model: &dyn ModelInvoker,
    schema: &ContractSchema,
    system_prompt: &str,
    user_prompt: &str,
    max_retries: u32,
    call_deadline: Option<Duration>,
) -> Result<Attempted> {
    let max_attempts = max_retries.saturating_add(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        let raw = with_deadline("model", call_deadline, async {
            model
                .invoke(system_prompt, user_prompt)
                .await
                .map_err(CoreError::from)
        })
        .await?;

        match schema.validate(&raw) {
            Ok(()) => {
                tracing::debug!(
                    contract_id = schema.contract_id(),
                    attempt,
                    "Model output satisfied contract"
                );
                return Ok(Attempted::Valid {
                    output: raw,
                    attempts: attempt,
                });
            }
            Err(err) => {
                tracing::warn!(
                    contract_id = schema.contract_id(),
                    attempt,
                    max_attempts,
                    error = %err,
                    "Model output failed contract validation"
                );
                last_error = err;
            }
        }
    }

    Ok(Attempted::Exhausted {
        last_error,
        attempts: max_attempts,
    })
}

/// Marker serialized as `"CONTRACT_VIOLATION"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationCode {
    #[serde(rename = "CONTRACT_VIOLATION")]
    ContractViolation,
}

/// Outcome of the routed entry point. A violation is a normal, reportable result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteOutcome {
    Valid {
        route: Route,
        output: Value,
    },
    Violation {
        route: Route,
        error: ViolationCode,
        details: String,
        attempts: u32,
    },
}

impl RouteOutcome {
    pub fn route(&self) -> &Route {
        match self {
            RouteOutcome::Valid { route, .. } | RouteOutcome::Violation { route, .. } => route,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RouteOutcome::Valid { .. })
    }
}

/// Drives the model against registered contracts
pub struct ContractInvoker {
    registry: ContractRegistry,
    model: Arc<dyn ModelInvoker>,
    max_retries: u32,
    call_deadline: Option<Duration>,
    metrics: Option<Arc<PolicyMetrics>>,
}

impl ContractInvoker {
    pub fn new(registry: ContractRegistry, model: Arc<dyn ModelInvoker>) -> Self {
        Self {
            registry,
            model,
            max_retries: DEFAULT_MAX_RETRIES,
            call_deadline: None,
            metrics: None,
        }
    }

    pub fn from_config(
        registry: ContractRegistry,
        model: Arc<dyn ModelInvoker>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            max_retries: config.max_retries,
            call_deadline: config.collaborator_timeout(),
            ..Self::new(registry, model)
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PolicyMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn model(&self) -> &Arc<dyn ModelInvoker> {
        &self.model
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn call_deadline(&self) -> Option<Duration> {
        self.call_deadline
    }

    /// Classify the query and obtain a contract-valid response with bounded retries
    pub async fn route_and_respond(
        &self,
        user_query: &str,
        context: Option<&str>,
    ) -> Result<RouteOutcome> {
        let route = classify(user_query);
        tracing::info!(
            task_type = %route.task_type,
            contract_id = %route.contract_id,
            "Routed query"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_route(&route);
        }

        let schema = self.registry.compile(&route.contract_id)?;
        let system_prompt = self.registry.system_prompt_for(&route.contract_id)?;
        let user_prompt = build_user_prompt(user_query, context, route.task_type);

        let attempted = invoke_until_valid(
            self.model.as_ref(),
            &schema,
            system_prompt,
            &user_prompt,
            self.max_retries,
            self.call_deadline,
        )
        .await?;
        self.record(&route.contract_id, &attempted);

        Ok(match attempted {
            Attempted::Valid { output, .. } => RouteOutcome::Valid { route, output },
            Attempted::Exhausted {
                last_error,
                attempts,
            } => {
                tracing::warn!(
                    contract_id = %route.contract_id,
                    attempts,
                    "Retry budget exhausted, reporting contract violation"
                );
                RouteOutcome::Violation {
                    route,
                    error: ViolationCode::ContractViolation,
                    details: last_error,
                    attempts,
                }
            }
        })
    }

    /// Single-shot request against the general response contract.
    ///
    /// Ignores classification, makes exactly one model call and fails with
    /// [`CoreError::ContractViolation`] if the output does not validate.
    pub async fn respond_go_mode(&self, user_query: &str, context: Option<&str>) -> Result<Value> {
        let schema = self.registry.compile(GO_MODE_RESPONSE)?;
        let system_prompt = self.registry.system_prompt_for(GO_MODE_RESPONSE)?;
        let user_prompt = build_user_prompt(user_query, context, TaskType::Analysis);

        let attempted = invoke_until_valid(
            self.model.as_ref(),
            &schema,
            system_prompt,
            &user_prompt,
            0,
            self.call_deadline,
        )
        .await?;
        self.record(GO_MODE_RESPONSE, &attempted);

        attempted.into_output(GO_MODE_RESPONSE)
    }

    fn record(&self, contract_id: &str, attempted: &Attempted) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempts(
                contract_id,
                attempted.attempts(),
                matches!(attempted, Attempted::Valid { .. }),
            );
        }
    }
}
