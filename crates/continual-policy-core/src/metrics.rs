//! Prometheus metrics for routing, invocation and policy learning
//!
//! - `continual_policy_routes_total` (counter) - routed requests by task type and contract
//! - `continual_policy_invocation_attempts_total` (counter) - model attempts by outcome
//! - `continual_policy_contract_violations_total` (counter) - exhausted retry budgets
//! - `continual_policy_learning_cycles_total` (counter) - learning cycles by verdict
//! - `continual_policy_policy_updates_total` (counter) - committed / discarded / invalid updates
//! - `continual_policy_policy_rollbacks_total` (counter)
//! - `continual_policy_policy_update_score` (gauge) - last computed update score

use prometheus::{Gauge, IntCounter, IntCounterVec, Opts, Registry};

use crate::classifier::Route;

const NAMESPACE: &str = "continual_policy";

/// How a proposed policy update ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Committed,
    Discarded,
    Invalid,
}

impl UpdateOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            UpdateOutcome::Committed => "committed",
            UpdateOutcome::Discarded => "discarded",
            UpdateOutcome::Invalid => "invalid",
        }
    }
}

/// Metrics shared by the invoker and the learning orchestrator
#[derive(Debug, Clone)]
pub struct PolicyMetrics {
    routes_total: IntCounterVec,
    invocation_attempts_total: IntCounterVec,
    contract_violations_total: IntCounterVec,
    learning_cycles_total: IntCounterVec,
    policy_updates_total: IntCounterVec,
    policy_rollbacks_total: IntCounter,
    policy_update_score: Gauge,
}

impl PolicyMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let routes_total = IntCounterVec::new(
            Opts::new("routes_total", "Routed requests by task type and contract")
                .namespace(NAMESPACE),
            &["task_type", "contract_id"],
        )?;

        let invocation_attempts_total = IntCounterVec::new(
            Opts::new(
                "invocation_attempts_total",
                "Model invocation attempts by validation outcome",
            )
            .namespace(NAMESPACE),
            &["contract_id", "outcome"],
        )?;

        let contract_violations_total = IntCounterVec::new(
            Opts::new(
                "contract_violations_total",
                "Requests whose retry budget was exhausted without a valid output",
            )
            .namespace(NAMESPACE),
            &["contract_id"],
        )?;

        let learning_cycles_total = IntCounterVec::new(
            Opts::new("learning_cycles_total", "Learning cycles by judge verdict")
                .namespace(NAMESPACE),
            &["verdict"],
        )?;

        let policy_updates_total = IntCounterVec::new(
            Opts::new("policy_updates_total", "Proposed policy updates by outcome")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;

        let policy_rollbacks_total = IntCounter::with_opts(
            Opts::new("policy_rollbacks_total", "Policy rollbacks performed").namespace(NAMESPACE),
        )?;

        let policy_update_score = Gauge::with_opts(
            Opts::new("policy_update_score", "Score of the last proposed policy update")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(routes_total.clone()))?;
        registry.register(Box::new(invocation_attempts_total.clone()))?;
        registry.register(Box::new(contract_violations_total.clone()))?;
        registry.register(Box::new(learning_cycles_total.clone()))?;
        registry.register(Box::new(policy_updates_total.clone()))?;
        registry.register(Box::new(policy_rollbacks_total.clone()))?;
        registry.register(Box::new(policy_update_score.clone()))?;

        Ok(Self {
            routes_total,
            invocation_attempts_total,
            contract_violations_total,
            learning_cycles_total,
            policy_updates_total,
            policy_rollbacks_total,
            policy_update_score,
        })
    }

    pub fn record_route(&self, route: &Route) {
        self.routes_total
            .with_label_values(&[route.task_type.as_str(), &route.contract_id])
            .inc();
    }

    /// Record a finished invocation loop: `attempts` calls, the last one valid or not
    pub fn record_attempts(&self, contract_id: &str, attempts: u32, valid: bool) {
        let invalid = if valid { attempts.saturating_sub(1) } else { attempts };
        self.invocation_attempts_total
            .with_label_values(&[contract_id, "invalid"])
            .inc_by(u64::from(invalid));
        if valid {
            self.invocation_attempts_total
                .with_label_values(&[contract_id, "valid"])
                .inc();
        } else {
            self.contract_violations_total
                .with_label_values(&[contract_id])
                .inc();
        }
    }

    pub fn record_learning_cycle(&self, verdict: &str) {
        self.learning_cycles_total.with_label_values(&[verdict]).inc();
    }

    pub fn record_update(&self, outcome: UpdateOutcome, score: Option<f64>) {
        self.policy_updates_total
            .with_label_values(&[outcome.as_label()])
            .inc();
        if let Some(score) = score {
            self.policy_update_score.set(score);
        }
    }

    pub fn record_rollback(&self) {
        self.policy_rollbacks_total.inc();
    }
}
