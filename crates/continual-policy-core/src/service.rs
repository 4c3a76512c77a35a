//! Request-level facade
//!
//! [`PolicyService`] is what a transport binds to: the routed and single-shot
//! responders, the learning cycle, and policy inspection and rollback.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::collaborators::{ModelInvoker, TestRunner};
use crate::config::CoreConfig;
use crate::contracts::ContractRegistry;
use crate::error::Result;
use crate::invocation::{ContractInvoker, RouteOutcome};
use crate::metrics::PolicyMetrics;
use crate::orchestrator::{LearningCollaborators, LearningOrchestrator, LearningOutcome, TextSource};
use crate::store::{PolicyStore, PolicyVersionSummary};

/// The active policy, both fields `None` before the first commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestPolicy {
    pub path: Option<String>,
    pub policy: Option<String>,
}

/// Result of a rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub rolled_back_to: usize,
    pub path: String,
    pub policy: String,
}

/// Deployment inputs for [`PolicyService::assemble`]
pub struct ServiceParts {
    pub registry: ContractRegistry,
    pub model: Arc<dyn ModelInvoker>,
    pub test_runner: Arc<dyn TestRunner>,
    pub store: Arc<dyn PolicyStore>,
    pub base_policy: TextSource,
    pub coder_template: TextSource,
}

pub struct PolicyService {
    invoker: ContractInvoker,
    orchestrator: LearningOrchestrator,
    store: Arc<dyn PolicyStore>,
    metrics: Option<Arc<PolicyMetrics>>,
}

impl PolicyService {
    pub fn new(invoker: ContractInvoker, orchestrator: LearningOrchestrator) -> Self {
        let store = Arc::clone(orchestrator.store());
        Self {
            invoker,
            orchestrator,
            store,
            metrics: None,
        }
    }

    /// Wire the service with the reference judge, proposer, validator and scorer
    pub fn assemble(parts: ServiceParts, config: &CoreConfig) -> Result<Self> {
        let collaborators = LearningCollaborators::reference(
            Arc::clone(&parts.model),
            parts.test_runner,
            &parts.registry,
            config,
        )?;
        let orchestrator = LearningOrchestrator::new(
            collaborators,
            parts.store,
            parts.registry.clone(),
            parts.base_policy,
            parts.coder_template,
        )
        .with_deadline(config.collaborator_timeout());
        let invoker = ContractInvoker::from_config(parts.registry, parts.model, config);

        tracing::info!(
            max_retries = config.max_retries,
            timeout_ms = ?config.collaborator_timeout_ms,
            store = orchestrator.store().name(),
            "Assembled policy service"
        );
        Ok(Self::new(invoker, orchestrator))
    }

    /// Record metrics from every component
    pub fn with_metrics(mut self, metrics: Arc<PolicyMetrics>) -> Self {
        self.invoker = self.invoker.with_metrics(Arc::clone(&metrics));
        self.orchestrator = self.orchestrator.with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    pub fn invoker(&self) -> &ContractInvoker {
        &self.invoker
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    pub async fn route_and_respond(
        &self,
        user_query: &str,
        context: Option<&str>,
    ) -> Result<RouteOutcome> {
        self.invoker.route_and_respond(user_query, context).await
    }

    pub async fn respond_go_mode(&self, user_query: &str, context: Option<&str>) -> Result<Value> {
        self.invoker.respond_go_mode(user_query, context).await
    }

    pub async fn solve_and_learn(
        &self,
        problem: &str,
        repo_path: &Path,
        reference_solution: &str,
    ) -> Result<LearningOutcome> {
        self.orchestrator
            .solve_and_learn(problem, repo_path, reference_solution)
            .await
    }

    pub async fn get_policy_latest(&self) -> Result<LatestPolicy> {
        Ok(match self.store.latest().await? {
            Some(version) => LatestPolicy {
                path: Some(version.path),
                policy: Some(version.content),
            },
            None => LatestPolicy {
                path: None,
                policy: None,
            },
        })
    }

    /// Make `version_index` the active policy
    pub async fn rollback_policy(&self, version_index: usize) -> Result<RollbackReport> {
        let version = self.store.rollback_to(version_index).await?;
        tracing::info!(index = version_index, path = %version.path, "Policy rolled back");
        if let Some(metrics) = &self.metrics {
            metrics.record_rollback();
        }

        Ok(RollbackReport {
            rolled_back_to: version_index,
            path: version.path,
            policy: version.content,
        })
    }

    pub async fn list_policies(&self) -> Result<Vec<PolicyVersionSummary>> {
        Ok(self.store.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockModelInvoker, PolicyRuleSet};
    use crate::error::CoreError;
    use crate::store::InMemoryPolicyStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoTests;

    #[async_trait]
    impl TestRunner for NoTests {
        async fn run(&self, _: &Path) -> Result<Value> {
            Ok(json!({"passed": true}))
        }
    }

    fn service(store: Arc<InMemoryPolicyStore>) -> PolicyService {
        let parts = ServiceParts {
            registry: ContractRegistry::embedded(),
            model: Arc::new(MockModelInvoker::new()),
            test_runner: Arc::new(NoTests),
            store,
            base_policy: TextSource::Inline(String::new()),
            coder_template: TextSource::Inline(String::new()),
        };
        PolicyService::assemble(parts, &CoreConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_latest_before_any_commit() {
        let latest = service(Arc::new(InMemoryPolicyStore::new()))
            .get_policy_latest()
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(latest).unwrap(),
            json!({"path": null, "policy": null})
        );
    }

    #[tokio::test]
    async fn test_rollback_report() {
        let store = Arc::new(InMemoryPolicyStore::new());
        for n in 0..3 {
            store
                .commit(&PolicyRuleSet::new(json!({"version": n})))
                .await
                .unwrap();
        }
        let service = service(store);

        let report = service.rollback_policy(1).await.unwrap();
        assert_eq!(report.rolled_back_to, 1);
        assert_eq!(report.path, "memory://policies/v1");
        assert_eq!(report.policy, PolicyRuleSet::new(json!({"version": 1})).render());

        let latest = service.get_policy_latest().await.unwrap();
        assert_eq!(latest.path.as_deref(), Some("memory://policies/v1"));

        let err = service.rollback_policy(9).await.unwrap_err();
        assert!(matches!(err, CoreError::VersionNotFound { index: 9, available: 3 }));
        assert_eq!(service.list_policies().await.unwrap().len(), 3);
    }
}
