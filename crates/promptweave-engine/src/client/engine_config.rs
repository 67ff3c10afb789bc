//! Engine client configuration
//!
//! This module provides configuration structures and builders for the
//! engine client.

use std::time::Duration;

use derive_builder::Builder;
use url::Url;

use crate::error::{EngineError, EngineResult};

/// Configuration for the engine client
///
/// Contains all the settings needed to configure the engine client
/// behavior, including timeouts, polling cadence and the housekeeping
/// namespace.
#[derive(Debug, Clone, Builder)]
#[builder(
    name = "EngineBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate_config")
)]
pub struct EngineConfig {
    /// Base URL of the engine's HTTP API
    #[builder(setter(custom), default = "EngineConfig::default_base_url()")]
    pub base_url: Url,
    /// Request timeout duration
    #[builder(default = "Duration::from_secs(60)")]
    pub timeout: Duration,
    /// Connection timeout duration
    #[builder(default = "Duration::from_secs(10)")]
    pub connect_timeout: Duration,
    /// Delay between queue polls while a job is waiting
    #[builder(default = "Duration::from_secs(1)")]
    pub poll_interval: Duration,
    /// User agent string for requests
    #[builder(default = "EngineConfig::default_user_agent()")]
    pub user_agent: String,
    /// Route prefix of the housekeeping extension endpoints (asset
    /// deletion and targeted interrupts)
    #[builder(default = "EngineConfig::default_namespace()")]
    pub housekeeping_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            user_agent: Self::default_user_agent(),
            housekeeping_namespace: Self::default_namespace(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    fn default_base_url() -> Url {
        "http://127.0.0.1:8188".parse().expect("Valid default URL")
    }

    fn default_user_agent() -> String {
        format!("promptweave-engine/{}", env!("CARGO_PKG_VERSION"))
    }

    fn default_namespace() -> String {
        "promptweave".to_string()
    }
}

impl EngineBuilder {
    /// Set the base URL of the engine's HTTP API
    pub fn with_base_url(mut self, url: &str) -> EngineResult<Self> {
        self.base_url = Some(url.parse().map_err(|e| {
            EngineError::invalid_config(format!("Invalid base URL '{url}': {e}"))
        })?);
        Ok(self)
    }

    fn validate_config(&self) -> Result<(), String> {
        if let Some(timeout) = &self.timeout {
            if timeout.is_zero() {
                return Err("Timeout must be greater than 0".to_string());
            }
        }

        if let Some(connect_timeout) = &self.connect_timeout {
            if connect_timeout.is_zero() {
                return Err("Connect timeout must be greater than 0".to_string());
            }
        }

        if let Some(poll_interval) = &self.poll_interval {
            if poll_interval.is_zero() {
                return Err("Poll interval must be greater than 0".to_string());
            }
        }

        if let Some(namespace) = &self.housekeeping_namespace {
            if namespace.is_empty() || namespace.contains('/') {
                return Err("Housekeeping namespace must be a single path segment".to_string());
            }
        }

        Ok(())
    }
}
