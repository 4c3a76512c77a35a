//! Core tuning knobs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retries after the first attempt in the routed invocation loop
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Minimum score a proposed policy update needs to be committed
pub const COMMIT_THRESHOLD: f64 = 1.0;

/// Configuration shared by the invoker and the learning orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Deadline for each collaborator call. `None` leaves deadlines to the collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborator_timeout_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            collaborator_timeout_ms: None,
        }
    }
}

impl CoreConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_collaborator_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.collaborator_timeout_ms = Some(timeout_ms);
        self
    }

    /// Total attempts the routed loop may make
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn collaborator_timeout(&self) -> Option<Duration> {
        self.collaborator_timeout_ms.map(Duration::from_millis)
    }
}
