//! CLI module for the continual policy service
//!
//! Starts the HTTP service and offers offline inspection of routing,
//! prompt assembly and the learned policy store.

pub mod commands;
pub mod output;

pub use commands::{build_service, PolicyAction, PolicyCli, PolicyCommands};
pub use output::{OutputFormat, Render};

use crate::config::ServiceConfig;
use crate::error::Result;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Invalid input, arguments or configuration
    InvalidInput = 3,
    /// Policy version or file not found
    NotFound = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Apply command-line overrides to `config` and run the command
pub async fn run(cli: PolicyCli, mut config: ServiceConfig) -> Result<ExitCode> {
    match cli.command {
        PolicyCommands::Serve { bind, policy_dir } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(policy_dir) = policy_dir {
                config.policy_dir = policy_dir;
            }
            commands::execute_serve(config).await
        }
        PolicyCommands::Classify { query } => commands::execute_classify(&query, cli.format),
        PolicyCommands::Prompt { query, context } => {
            commands::execute_prompt(&query, context.as_deref(), cli.format)
        }
        PolicyCommands::Policy { action } => {
            commands::execute_policy(action, &config, cli.format).await
        }
    }
}
