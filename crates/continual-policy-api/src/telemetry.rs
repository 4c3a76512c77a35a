//! Tracing bootstrap and metrics registry

use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use continual_policy_core::PolicyMetrics;

use crate::config::LogFormat;
use crate::error::Result;

/// Map `-v` occurrences to a default filter directive
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbosity`.
pub fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    // A second initialization (tests, embedding) keeps the first subscriber
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Prometheus registry with the policy metrics registered
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    metrics: Arc<PolicyMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let metrics = Arc::new(PolicyMetrics::new(&registry)?);
        Ok(Self { registry, metrics })
    }

    pub fn metrics(&self) -> Arc<PolicyMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(crate::error::ServiceError::from)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
