//! Continual Policy Core
//!
//! Routes free-form task requests to structured response contracts, enforces
//! that model output conforms to them, and turns judged failures into
//! versioned policy updates with rollback.
//!
//! ## Features
//!
//! - **Task Routing**: Ordered keyword rules map a query to a task type and contract
//! - **Contract Enforcement**: Model output is validated against JSON Schema with bounded retries
//! - **Continual Learning**: Solve, test, judge and commit rule updates that clear a score gate
//! - **Versioned Policies**: Append-only policy store with non-destructive rollback
//! - **Injected Capabilities**: Model, tests, judging and rule proposal are async traits
//! - **Telemetry**: `tracing` spans and Prometheus counters
//!
//! ## Architecture
//!
//! 1. **Contracts** (`contracts`): Registered schemas and instruction preambles.
//!
//! 2. **Classifier** (`classifier`): Query to [`Route`].
//!
//! 3. **Prompts** (`prompts`): User prompt and coder template assembly.
//!
//! 4. **Invocation** (`invocation`): The retry-until-valid loop and [`ContractInvoker`].
//!
//! 5. **Orchestrator** (`orchestrator`): The learning pipeline.
//!
//! 6. **Store** (`store`): [`PolicyStore`] with in-memory and file-system backends.
//!
//! 7. **Service** (`service`): The request-level facade a transport binds to.
//!
//! ## Example
//!
//! ```rust,no_run
//! use continual_policy_core::{
//!     classify, ContractInvoker, ContractRegistry, ModelError, ModelInvoker,
//! };
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct Canned;
//!
//! #[async_trait]
//! impl ModelInvoker for Canned {
//!     async fn invoke(&self, _system: &str, _user: &str) -> Result<Value, ModelError> {
//!         Ok(json!({"summary": "s", "answer": "a", "assumptions": [], "follow_ups": ["x", "y"]}))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> continual_policy_core::Result<()> {
//!     assert_eq!(classify("compare tokio vs async-std").contract_id, "go_mode_response");
//!
//!     let invoker = ContractInvoker::new(ContractRegistry::embedded(), Arc::new(Canned));
//!     let outcome = invoker.route_and_respond("explain pinning", None).await?;
//!     assert!(outcome.is_valid());
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod contracts;
pub mod error;
pub mod invocation;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;
pub mod service;
pub mod store;

pub use classifier::{classify, Route, TaskType};
pub use collaborators::{
    Judge, JudgeRequest, JudgeVerdict, ModelError, ModelInvoker, PolicyRuleSet, PolicyScorer,
    RuleProposer, RuleValidator, TestRunner, Verdict,
};
pub use config::{CoreConfig, COMMIT_THRESHOLD, DEFAULT_MAX_RETRIES};
pub use contracts::{ContractRegistry, ContractSchema};
pub use error::{CoreError, Result};
pub use invocation::{invoke_until_valid, Attempted, ContractInvoker, RouteOutcome};
pub use metrics::PolicyMetrics;
pub use orchestrator::{
    LearningCollaborators, LearningOrchestrator, LearningOutcome, LearningStage, PolicyDecision,
    TextSource,
};
pub use prompts::build_user_prompt;
pub use service::{LatestPolicy, PolicyService, RollbackReport, ServiceParts};
pub use store::{
    FsPolicyStore, InMemoryPolicyStore, PolicyStore, PolicyVersion, PolicyVersionSummary,
    StoreError,
};
