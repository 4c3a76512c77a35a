//! CLI command definitions and their execution

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use continual_policy_core::{
    build_user_prompt, classify, ContractRegistry, CoreError, FsPolicyStore, LatestPolicy,
    PolicyService, PolicyStore, RollbackReport, ServiceParts, TextSource,
};

use super::output::{OutputFormat, PromptOutput, Render, VersionList};
use super::ExitCode;
use crate::client::{CommandTestRunner, HttpModelInvoker};
use crate::config::{ServiceConfig, ENV_BIND_ADDR, ENV_POLICY_DIR};
use crate::error::{Result, ServiceError};
use crate::handler::{create_router, AppState};
use crate::telemetry::MetricsRegistry;

/// Continual policy service
///
/// Serve the contract-enforced responders and the learning loop over HTTP,
/// or inspect routing and stored policies from the command line.
#[derive(Parser, Debug)]
#[command(name = "continual-policy")]
#[command(about = "Contract-enforced routing and continual policy learning", long_about = None)]
#[command(version)]
pub struct PolicyCli {
    /// Output verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "CONTINUAL_POLICY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format for command results
    #[arg(long, value_enum, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: PolicyCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Run the HTTP service
    Serve {
        /// Listen address
        #[arg(long, env = ENV_BIND_ADDR)]
        bind: Option<SocketAddr>,

        /// Learned policy directory
        #[arg(long, env = ENV_POLICY_DIR)]
        policy_dir: Option<PathBuf>,
    },

    /// Print the route a query would take
    Classify {
        /// Free-text task request
        query: String,
    },

    /// Print the user prompt assembled for a query
    Prompt {
        /// Free-text task request
        query: String,

        /// Optional context block
        #[arg(long)]
        context: Option<String>,
    },

    /// Inspect or roll back learned policies
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PolicyAction {
    /// Show the active policy
    Latest,
    /// List committed versions
    List,
    /// Make an earlier version the active one
    Rollback {
        /// 0-based version index
        index: usize,
    },
}

/// Assemble the service from configuration
pub async fn build_service(
    config: &ServiceConfig,
    metrics: &MetricsRegistry,
) -> Result<PolicyService> {
    let store = FsPolicyStore::open(&config.policy_dir)
        .await
        .map_err(CoreError::from)?;
    let model = HttpModelInvoker::new(config.model.clone())?;
    let test_runner = CommandTestRunner::new(config.tests.clone());

    let parts = ServiceParts {
        registry: ContractRegistry::with_optional_dir(config.contracts_dir.as_deref()),
        model: Arc::new(model),
        test_runner: Arc::new(test_runner),
        store: Arc::new(store),
        base_policy: TextSource::File(config.base_policy_path.clone()),
        coder_template: TextSource::File(config.coder_template_path.clone()),
    };

    let service = PolicyService::assemble(parts, &config.core_config())?;
    Ok(service.with_metrics(metrics.metrics()))
}

pub async fn execute_serve(config: ServiceConfig) -> Result<ExitCode> {
    let metrics = MetricsRegistry::new()?;
    let service = build_service(&config, &metrics).await?;
    let router = create_router(AppState::new(Arc::new(service), metrics));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        policy_dir = %config.policy_dir.display(),
        model = %config.model.model,
        "Continual policy service listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service stopped");
    Ok(ExitCode::Success)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

pub fn execute_classify(query: &str, format: OutputFormat) -> Result<ExitCode> {
    if query.trim().is_empty() {
        return Err(ServiceError::invalid_input("query must not be empty"));
    }
    classify(query).print(format)?;
    Ok(ExitCode::Success)
}

pub fn execute_prompt(
    query: &str,
    context: Option<&str>,
    format: OutputFormat,
) -> Result<ExitCode> {
    if query.trim().is_empty() {
        return Err(ServiceError::invalid_input("query must not be empty"));
    }
    let route = classify(query);
    let prompt = build_user_prompt(query, context, route.task_type);
    PromptOutput { route, prompt }.print(format)?;
    Ok(ExitCode::Success)
}

pub async fn execute_policy(
    action: PolicyAction,
    config: &ServiceConfig,
    format: OutputFormat,
) -> Result<ExitCode> {
    let store = FsPolicyStore::open(&config.policy_dir)
        .await
        .map_err(CoreError::from)?;

    match action {
        PolicyAction::Latest => {
            let latest = match store.latest().await.map_err(CoreError::from)? {
                Some(version) => LatestPolicy {
                    path: Some(version.path),
                    policy: Some(version.content),
                },
                None => LatestPolicy {
                    path: None,
                    policy: None,
                },
            };
            latest.print(format)?;
        }
        PolicyAction::List => {
            VersionList(store.list().await.map_err(CoreError::from)?).print(format)?;
        }
        PolicyAction::Rollback { index } => {
            let version = store.rollback_to(index).await.map_err(CoreError::from)?;
            RollbackReport {
                rolled_back_to: index,
                path: version.path,
                policy: version.content,
            }
            .print(format)?;
        }
    }
    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use continual_policy_core::PolicyRuleSet;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = PolicyCli::try_parse_from([
            "continual-policy",
            "-vv",
            "serve",
            "--bind",
            "0.0.0.0:9090",
            "--policy-dir",
            "/tmp/policies",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            PolicyCommands::Serve { bind, policy_dir } => {
                assert_eq!(bind.unwrap().port(), 9090);
                assert_eq!(policy_dir.unwrap(), PathBuf::from("/tmp/policies"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_policy_rollback() {
        let cli = PolicyCli::try_parse_from([
            "continual-policy",
            "--format",
            "json",
            "policy",
            "rollback",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            PolicyCommands::Policy {
                action: PolicyAction::Rollback { index: 3 }
            }
        ));
        assert!(
            PolicyCli::try_parse_from(["continual-policy", "policy", "rollback", "-1"]).is_err()
        );
    }

    #[test]
    fn test_empty_query_is_invalid_input() {
        let err = execute_classify("   ", OutputFormat::Json).unwrap_err();
        assert!(err.is_user_error());
    }

    #[tokio::test]
    async fn test_policy_rollback_out_of_range() {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig {
            policy_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let store = FsPolicyStore::open(dir.path()).await.unwrap();
        store
            .commit(&PolicyRuleSet::new(json!({"add_rules": []})))
            .await
            .unwrap();

        let err = execute_policy(PolicyAction::Rollback { index: 4 }, &config, OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let code = execute_policy(PolicyAction::Rollback { index: 0 }, &config, OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(code, ExitCode::Success);
    }
}
