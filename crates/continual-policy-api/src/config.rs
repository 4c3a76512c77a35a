//! Service configuration
//!
//! Resolution order, lowest to highest precedence: built-in defaults, the
//! TOML file given with `--config`, `CONTINUAL_POLICY_*` environment
//! variables, then command-line flags (applied by the CLI).

use continual_policy_core::{CoreConfig, DEFAULT_MAX_RETRIES};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Result, ServiceError};

pub const ENV_BIND_ADDR: &str = "CONTINUAL_POLICY_BIND_ADDR";
pub const ENV_POLICY_DIR: &str = "CONTINUAL_POLICY_POLICY_DIR";
pub const ENV_MODEL_ENDPOINT: &str = "CONTINUAL_POLICY_MODEL_ENDPOINT";
pub const ENV_MODEL: &str = "CONTINUAL_POLICY_MODEL";
pub const ENV_MAX_RETRIES: &str = "CONTINUAL_POLICY_MAX_RETRIES";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Chat-completions provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Full URL of the chat-completions endpoint
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub temperature: f64,
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            timeout_ms: 60_000,
        }
    }
}

/// Test command run inside the code location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestsConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Tail of stdout/stderr kept in the test result
    pub max_output_bytes: usize,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: "cargo".to_string(),
            args: vec!["test".to_string()],
            max_output_bytes: 16 * 1024,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Schema documents directory; embedded schemas when unset
    pub contracts_dir: Option<PathBuf>,
    pub policy_dir: PathBuf,
    pub base_policy_path: PathBuf,
    pub coder_template_path: PathBuf,
    pub max_retries: u32,
    pub collaborator_timeout_ms: Option<u64>,
    pub log_format: LogFormat,
    pub model: ModelConfig,
    pub tests: TestsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            contracts_dir: None,
            policy_dir: PathBuf::from("registry/policies/learned"),
            base_policy_path: PathBuf::from("registry/policies/base.md"),
            coder_template_path: PathBuf::from("agents/coder.md"),
            max_retries: DEFAULT_MAX_RETRIES,
            collaborator_timeout_ms: None,
            log_format: LogFormat::Text,
            model: ModelConfig::default(),
            tests: TestsConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ServiceError::config(format!("invalid TOML: {}", e)))
    }

    /// Defaults, overlaid with `path` when given, then with the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ServiceError::config(format!("failed to read '{}': {}", path.display(), e))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = addr
                .parse()
                .map_err(|e| ServiceError::config(format!("{}: {}", ENV_BIND_ADDR, e)))?;
        }
        if let Some(dir) = lookup(ENV_POLICY_DIR) {
            self.policy_dir = PathBuf::from(dir);
        }
        if let Some(endpoint) = lookup(ENV_MODEL_ENDPOINT) {
            self.model.endpoint = endpoint;
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.model.model = model;
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = retries
                .parse()
                .map_err(|e| ServiceError::config(format!("{}: {}", ENV_MAX_RETRIES, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.endpoint.trim().is_empty() {
            return Err(ServiceError::config("model.endpoint must not be empty"));
        }
        if self.tests.command.trim().is_empty() {
            return Err(ServiceError::config("tests.command must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ServiceError::config(format!(
                "model.temperature must be within [0, 2], got {}",
                self.model.temperature
            )));
        }
        Ok(())
    }

    pub fn core_config(&self) -> CoreConfig {
        let config = CoreConfig::default().with_max_retries(self.max_retries);
        match self.collaborator_timeout_ms {
            Some(timeout_ms) => config.with_collaborator_timeout_ms(timeout_ms),
            None => config,
        }
    }
}
