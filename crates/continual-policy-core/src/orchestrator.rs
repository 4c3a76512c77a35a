//! Continual-learning orchestrator
//!
//! One `solve_and_learn` call walks the stages below. Only a failing verdict
//! enters the update path, and only an update that validates and scores at
//! or above [`COMMIT_THRESHOLD`] touches the policy store.
//!
//! ```text
//! LoadingPolicy -> Solving -> Testing -> Judging -> Done
//!                                           |
//!                                           +-> ProposingRules -> ValidatingRules -> Scoring
//!                                                                                     |
//!                                                             Committing | Discarding +-> Done
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{
    with_deadline, FailureCoverageScorer, Judge, JudgeRequest, JudgeVerdict, ModelInvoker,
    ModelJudge, ModelRuleProposer, PolicyRuleSet, PolicyScorer, RuleProposer, RuleValidator,
    SchemaRuleValidator, TestRunner,
};
use crate::config::{CoreConfig, COMMIT_THRESHOLD};
use crate::contracts::{ContractRegistry, JUDGE_OUTPUT, POLICY_DIFF};
use crate::error::{CoreError, Result};
use crate::metrics::{PolicyMetrics, UpdateOutcome};
use crate::prompts::render_coder_prompt;
use crate::store::PolicyStore;

/// Pipeline stages, in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningStage {
    LoadingPolicy,
    Solving,
    Testing,
    Judging,
    ProposingRules,
    ValidatingRules,
    Scoring,
    Committing,
    Discarding,
    Done,
}

impl LearningStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningStage::LoadingPolicy => "loading_policy",
            LearningStage::Solving => "solving",
            LearningStage::Testing => "testing",
            LearningStage::Judging => "judging",
            LearningStage::ProposingRules => "proposing_rules",
            LearningStage::ValidatingRules => "validating_rules",
            LearningStage::Scoring => "scoring",
            LearningStage::Committing => "committing",
            LearningStage::Discarding => "discarding",
            LearningStage::Done => "done",
        }
    }
}

impl fmt::Display for LearningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read-only deployment input
#[derive(Debug, Clone)]
pub enum TextSource {
    Inline(String),
    /// Read on every cycle so edits take effect without a restart
    File(PathBuf),
}

impl TextSource {
    async fn load(&self, what: &str) -> Result<String> {
        match self {
            TextSource::Inline(text) => Ok(text.clone()),
            TextSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                CoreError::config(format!(
                    "failed to read {} '{}': {}",
                    what,
                    path.display(),
                    e
                ))
            }),
        }
    }
}

/// What happened to the policy at the end of a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    /// The verdict was `pass`
    NotNeeded,
    /// The update met the threshold and was stored
    Committed { index: usize, path: String, score: f64 },
    /// The update scored below the threshold; nothing was stored
    Discarded { score: f64 },
}

impl PolicyDecision {
    pub fn committed_path(&self) -> Option<&str> {
        match self {
            PolicyDecision::Committed { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            PolicyDecision::NotNeeded => None,
            PolicyDecision::Committed { score, .. } | PolicyDecision::Discarded { score } => {
                Some(*score)
            }
        }
    }
}

/// Result of one learning cycle
#[derive(Debug, Clone, Serialize)]
pub struct LearningOutcome {
    pub solution: Value,
    pub tests: Value,
    pub judge: Value,
    pub policy_committed: Option<String>,
    pub policy_update_score: Option<f64>,
    #[serde(skip)]
    pub decision: PolicyDecision,
}

impl LearningOutcome {
    fn new(solution: Value, tests: Value, judge: &JudgeVerdict, decision: PolicyDecision) -> Self {
        Self {
            solution,
            tests,
            judge: judge.to_value(),
            policy_committed: decision.committed_path().map(str::to_string),
            policy_update_score: decision.score(),
            decision,
        }
    }
}

/// Capabilities the orchestrator drives
#[derive(Clone)]
pub struct LearningCollaborators {
    pub model: Arc<dyn ModelInvoker>,
    pub test_runner: Arc<dyn TestRunner>,
    pub judge: Arc<dyn Judge>,
    pub proposer: Arc<dyn RuleProposer>,
    pub validator: Arc<dyn RuleValidator>,
    pub scorer: Arc<dyn PolicyScorer>,
}

impl LearningCollaborators {
    /// Model-backed judge and proposer, schema validator and coverage scorer
    pub fn reference(
        model: Arc<dyn ModelInvoker>,
        test_runner: Arc<dyn TestRunner>,
        registry: &ContractRegistry,
        config: &CoreConfig,
    ) -> Result<Self> {
        Ok(Self {
            model,
            test_runner,
            judge: Arc::new(ModelJudge::new(registry)?.with_max_retries(config.max_retries)),
            proposer: Arc::new(
                ModelRuleProposer::new(registry)?.with_max_retries(config.max_retries),
            ),
            validator: Arc::new(SchemaRuleValidator::new(registry)?),
            scorer: Arc::new(FailureCoverageScorer),
        })
    }
}

/// Runs solve, test, judge and the conditional policy update
pub struct LearningOrchestrator {
    collaborators: LearningCollaborators,
    store: Arc<dyn PolicyStore>,
    registry: ContractRegistry,
    base_policy: TextSource,
    coder_template: TextSource,
    deadline: Option<Duration>,
    metrics: Option<Arc<PolicyMetrics>>,
}

impl LearningOrchestrator {
    pub fn new(
        collaborators: LearningCollaborators,
        store: Arc<dyn PolicyStore>,
        registry: ContractRegistry,
        base_policy: TextSource,
        coder_template: TextSource,
    ) -> Self {
        Self {
            collaborators,
            store,
            registry,
            base_policy,
            coder_template,
            deadline: None,
            metrics: None,
        }
    }

    /// Bound every collaborator call by `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PolicyMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    fn enter(&self, stage: LearningStage) {
        tracing::debug!(stage = stage.as_str(), "Entering learning stage");
    }

    /// Solve `problem`, test `repo_path`, judge against `reference_solution`
    /// and learn from a failure
    pub async fn solve_and_learn(
        &self,
        problem: &str,
        repo_path: &Path,
        reference_solution: &str,
    ) -> Result<LearningOutcome> {
        self.enter(LearningStage::LoadingPolicy);
        let base_policy = self.base_policy.load("base policy").await?;
        let coder_template = self.coder_template.load("coder template").await?;
        let learned_policy = self
            .store
            .latest()
            .await?
            .map(|version| version.content)
            .unwrap_or_default();

        self.enter(LearningStage::Solving);
        let system_prompt =
            render_coder_prompt(&coder_template, &base_policy, &learned_policy, problem);
        let model = self.collaborators.model.as_ref();
        let solution = with_deadline("model", self.deadline, async {
            model
                .invoke(&system_prompt, problem)
                .await
                .map_err(CoreError::from)
        })
        .await?;

        self.enter(LearningStage::Testing);
        let tests = with_deadline(
            "test runner",
            self.deadline,
            self.collaborators.test_runner.run(repo_path),
        )
        .await?;

        self.enter(LearningStage::Judging);
        let judge_schema = self.registry.compile(JUDGE_OUTPUT)?;
        let serialized_solution = serde_json::to_string(&solution)
            .map_err(|e| {
                CoreError::collaborator("model", format!("unserializable solution: {}", e))
            })?;
        let request = JudgeRequest {
            problem,
            solution: &serialized_solution,
            tests: &tests,
            reference_solution,
        };
        let verdict = with_deadline(
            "judge",
            self.deadline,
            self.collaborators.judge.judge(request, model, &judge_schema),
        )
        .await?;

        tracing::info!(verdict = %verdict.verdict, "Solution judged");
        if let Some(metrics) = &self.metrics {
            metrics.record_learning_cycle(&verdict.verdict.to_string());
        }

        let decision = if verdict.is_pass() {
            PolicyDecision::NotNeeded
        } else {
            self.update_policy(&learned_policy, &verdict).await?
        };

        self.enter(LearningStage::Done);
        Ok(LearningOutcome::new(solution, tests, &verdict, decision))
    }

    async fn update_policy(
        &self,
        learned_policy: &str,
        verdict: &JudgeVerdict,
    ) -> Result<PolicyDecision> {
        self.enter(LearningStage::ProposingRules);
        let diff_schema = self.registry.compile(POLICY_DIFF)?;
        let rule_set: PolicyRuleSet = with_deadline(
            "rule proposer",
            self.deadline,
            self.collaborators.proposer.propose(
                learned_policy,
                verdict,
                self.collaborators.model.as_ref(),
                &diff_schema,
            ),
        )
        .await?;

        self.enter(LearningStage::ValidatingRules);
        if let Err(err) = self.collaborators.validator.validate(&rule_set) {
            tracing::warn!(error = %err, "Proposed rule set rejected");
            self.record_update(UpdateOutcome::Invalid, None);
            return Err(err);
        }

        self.enter(LearningStage::Scoring);
        let score = self.collaborators.scorer.score(verdict, &rule_set);
        if !score.is_finite() {
            tracing::warn!(score, "Policy scorer returned a non-finite score");
            self.record_update(UpdateOutcome::Invalid, None);
            return Err(CoreError::collaborator(
                "policy scorer",
                format!("non-finite score {}", score),
            ));
        }

        if score >= COMMIT_THRESHOLD {
            self.enter(LearningStage::Committing);
            let version = self.store.commit(&rule_set).await?;
            tracing::info!(
                score,
                index = version.index,
                path = %version.path,
                "Committed policy update"
            );
            self.record_update(UpdateOutcome::Committed, Some(score));
            Ok(PolicyDecision::Committed {
                index: version.index,
                path: version.path,
                score,
            })
        } else {
            self.enter(LearningStage::Discarding);
            tracing::info!(
                score,
                threshold = COMMIT_THRESHOLD,
                "Policy update below threshold, discarded"
            );
            self.record_update(UpdateOutcome::Discarded, Some(score));
            Ok(PolicyDecision::Discarded { score })
        }
    }

    fn record_update(&self, outcome: UpdateOutcome, score: Option<f64>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_update(outcome, score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockModelInvoker, ModelError};
    use crate::contracts::ContractSchema;
    use crate::store::InMemoryPolicyStore;
    use async_trait::async_trait;
    use serde_json::json;

    const TEMPLATE: &str = "BASE:{{BASE_POLICY}}|LEARNED:{{LEARNED_POLICY}}|PROBLEM:{{PROBLEM}}";

    struct StubTests;

    #[async_trait]
    impl TestRunner for StubTests {
        async fn run(&self, code_location: &Path) -> Result<Value> {
            Ok(json!({"location": code_location.display().to_string(), "passed": false}))
        }
    }

    struct SlowTests;

    #[async_trait]
    impl TestRunner for SlowTests {
        async fn run(&self, _: &Path) -> Result<Value> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Value::Null)
        }
    }

    struct FixedJudge(&'static str);

    #[async_trait]
    impl Judge for FixedJudge {
        async fn judge(
            &self,
            request: JudgeRequest<'_>,
            _: &dyn ModelInvoker,
            schema: &ContractSchema,
        ) -> Result<JudgeVerdict> {
            let value = json!({
                "verdict": self.0,
                "rationale": format!("judged {}", request.solution),
                "evidence": [],
                "failure_modes": ["off by one"]
            });
            schema.validate(&value).map_err(|e| CoreError::collaborator("judge", e))?;
            JudgeVerdict::from_value(value)
        }
    }

    struct FixedProposer(Value);

    #[async_trait]
    impl RuleProposer for FixedProposer {
        async fn propose(
            &self,
            _: &str,
            _: &JudgeVerdict,
            _: &dyn ModelInvoker,
            _: &ContractSchema,
        ) -> Result<PolicyRuleSet> {
            Ok(PolicyRuleSet::new(self.0.clone()))
        }
    }

    fn diff() -> Value {
        json!({
            "add_rules": [
                {"id": "bounds", "rule": "Check loop bounds.", "addresses": ["off by one"]}
            ],
            "remove_rules": [],
            "summary": "loop bounds"
        })
    }

    fn solving_model() -> MockModelInvoker {
        let mut mock = MockModelInvoker::new();
        mock.expect_invoke()
            .returning(|_, _| Ok(json!({"code": "fn main() {}"})));
        mock
    }

    fn orchestrator(
        model: MockModelInvoker,
        verdict: &'static str,
        score: f64,
        store: Arc<InMemoryPolicyStore>,
    ) -> LearningOrchestrator {
        let registry = ContractRegistry::embedded();
        let collaborators = LearningCollaborators {
            model: Arc::new(model),
            test_runner: Arc::new(StubTests),
            judge: Arc::new(FixedJudge(verdict)),
            proposer: Arc::new(FixedProposer(diff())),
            validator: Arc::new(SchemaRuleValidator::new(&registry).unwrap()),
            scorer: Arc::new(move |_: &JudgeVerdict, _: &PolicyRuleSet| score),
        };
        LearningOrchestrator::new(
            collaborators,
            store,
            registry,
            TextSource::Inline("be precise".to_string()),
            TextSource::Inline(TEMPLATE.to_string()),
        )
    }

    #[tokio::test]
    async fn test_pass_leaves_policy_untouched() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let mut model = MockModelInvoker::new();
        model
            .expect_invoke()
            .withf(|system, user| {
                system == "BASE:be precise|LEARNED:|PROBLEM:sum a slice" && user == "sum a slice"
            })
            .times(1)
            .returning(|_, _| Ok(json!({"code": "x"})));

        let outcome = orchestrator(model, "pass", 1.0, store.clone())
            .solve_and_learn("sum a slice", Path::new("/tmp/repo"), "ref")
            .await
            .unwrap();

        assert_eq!(outcome.decision, PolicyDecision::NotNeeded);
        assert!(outcome.policy_committed.is_none());
        assert!(outcome.policy_update_score.is_none());
        assert_eq!(outcome.tests["location"], "/tmp/repo");
        assert_eq!(outcome.judge["rationale"], "judged {\"code\":\"x\"}");
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_with_full_score_commits() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let outcome = orchestrator(solving_model(), "fail", 1.0, store.clone())
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap();

        assert_eq!(outcome.policy_committed.as_deref(), Some("memory://policies/v0"));
        assert_eq!(outcome.policy_update_score, Some(1.0));
        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.content, PolicyRuleSet::new(diff()).render());
    }

    #[tokio::test]
    async fn test_fail_below_threshold_discards() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let outcome = orchestrator(solving_model(), "fail", 0.99, store.clone())
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap();

        assert_eq!(outcome.decision, PolicyDecision::Discarded { score: 0.99 });
        assert!(outcome.policy_committed.is_none());
        assert_eq!(outcome.policy_update_score, Some(0.99));
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_non_finite_score_is_collaborator_error() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let err = orchestrator(solving_model(), "fail", f64::NAN, store.clone())
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::Collaborator { collaborator: "policy scorer", .. }
        ));
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_rule_set_aborts_without_storage() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let mut orchestrator = orchestrator(solving_model(), "fail", 1.0, store.clone());
        orchestrator.collaborators.proposer =
            Arc::new(FixedProposer(json!({"add_rules": [{"id": "NOT VALID"}]})));

        let err = orchestrator
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRuleSet(_)));
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_policy_feeds_next_cycle() {
        let store = Arc::new(InMemoryPolicyStore::new());
        store.commit(&PolicyRuleSet::new(json!({"rule": "r1"}))).await.unwrap();
        let learned = store.latest().await.unwrap().unwrap().content;

        let mut model = MockModelInvoker::new();
        let expected = format!("BASE:be precise|LEARNED:{}|PROBLEM:p", learned);
        model
            .expect_invoke()
            .withf(move |system, _| system == expected)
            .times(1)
            .returning(|_, _| Ok(json!({})));

        orchestrator(model, "pass", 0.0, store)
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let mut model = MockModelInvoker::new();
        model
            .expect_invoke()
            .returning(|_, _| Err(ModelError::Transport("connection reset".to_string())));

        let err = orchestrator(model, "fail", 1.0, Arc::new(InMemoryPolicyStore::new()))
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Model(ModelError::Transport(_))));
    }

    #[tokio::test]
    async fn test_collaborator_deadline() {
        let mut orchestrator = orchestrator(
            solving_model(),
            "fail",
            1.0,
            Arc::new(InMemoryPolicyStore::new()),
        )
        .with_deadline(Some(Duration::from_millis(20)));
        orchestrator.collaborators.test_runner = Arc::new(SlowTests);

        let err = orchestrator
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::CollaboratorTimeout {
                collaborator: "test runner",
                timeout_ms: 20
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_template_file_is_config_error() {
        let mut orchestrator = orchestrator(
            MockModelInvoker::new(),
            "pass",
            1.0,
            Arc::new(InMemoryPolicyStore::new()),
        );
        orchestrator.coder_template = TextSource::File(PathBuf::from("/nonexistent/coder.md"));

        let err = orchestrator
            .solve_and_learn("p", Path::new("."), "r")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_outcome_serialization() {
        let verdict = JudgeVerdict::from_value(json!({"verdict": "fail"})).unwrap();
        let outcome = LearningOutcome::new(
            json!({"code": ""}),
            json!(null),
            &verdict,
            PolicyDecision::Discarded { score: 0.5 },
        );
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "solution": {"code": ""},
                "tests": null,
                "judge": {"verdict": "fail"},
                "policy_committed": null,
                "policy_update_score": 0.5
            })
        );
    }
}
