//! Continual Policy API
//!
//! HTTP surface, command-line interface and deployment collaborators for
//! the continual policy core.
//!
//! ## Features
//!
//! - **HTTP Surface**: axum routes for routing, learning and policy management
//! - **Model Client**: OpenAI-compatible chat-completions invoker
//! - **Test Runner**: Runs the configured test command in a code location
//! - **Configuration**: TOML file, `CONTINUAL_POLICY_*` environment and flags
//! - **Telemetry**: `tracing` logs and a Prometheus `/metrics` endpoint
//!
//! ## Architecture
//!
//! 1. **CLI** (`cli/`): `serve`, `classify`, `prompt` and `policy` commands.
//!
//! 2. **Handler** (`handler/`): Router, error envelope and request middleware.
//!
//! 3. **Client** (`client/`): [`HttpModelInvoker`] and [`CommandTestRunner`].
//!
//! 4. **Config** (`config`): [`ServiceConfig`] loading and validation.
//!
//! 5. **Telemetry** (`telemetry`): Subscriber bootstrap and [`MetricsRegistry`].
//!
//! ## CLI Usage
//!
//! ```bash
//! # Serve on the configured address
//! continual-policy --config deploy/continual-policy.toml serve
//!
//! # Show how a query is routed
//! continual-policy classify "implement a tokio echo server"
//!
//! # Roll the learned policy back to version 2
//! continual-policy policy rollback 2
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod telemetry;

pub use cli::{ExitCode, OutputFormat, PolicyCli, PolicyCommands};
pub use client::{CommandTestRunner, HttpModelInvoker};
pub use config::{LogFormat, ModelConfig, ServiceConfig, TestsConfig};
pub use error::{Result, ServiceError};
pub use handler::{create_router, ApiError, AppState, ErrorInfo, ErrorResponse, ResponseMetadata};
pub use telemetry::{init_tracing, MetricsRegistry};

/// Run the CLI application
///
/// Loads configuration, installs the tracing subscriber and maps failures to
/// an exit code.
///
/// ```rust,no_run
/// use clap::Parser;
/// use continual_policy_api::{run_cli, PolicyCli};
///
/// #[tokio::main]
/// async fn main() {
///     let exit_code = run_cli(PolicyCli::parse()).await;
///     std::process::exit(exit_code.into());
/// }
/// ```
pub async fn run_cli(cli: PolicyCli) -> ExitCode {
    let config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::InvalidInput;
        }
    };

    let log_format = if cli.log_json {
        LogFormat::Json
    } else {
        config.log_format
    };
    init_tracing(cli.verbose, log_format);

    match cli::run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_not_found() {
                ExitCode::NotFound
            } else if e.is_user_error() {
                ExitCode::InvalidInput
            } else {
                ExitCode::InternalError
            }
        }
    }
}
