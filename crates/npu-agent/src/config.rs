//! Configuration management for the NPU exporter

use npu_adapter::AdapterConfig;
use npu_metrics::MetricsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default collection period in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 2000;

/// Complete configuration for the exporter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Device query backend configuration
    pub adapter: AdapterConfig,

    /// Collection loop configuration
    pub sampling: SamplingConfig,

    /// Scrape endpoint configuration
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Collection loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Period between collection ticks (milliseconds)
    pub interval_ms: u64,
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Show target in logs
    pub show_target: bool,

    /// Show thread IDs in logs
    pub show_thread_ids: bool,

    /// Show line numbers in logs
    pub show_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::AgentError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> crate::Result<()> {
        let content = self.to_yaml()?;

        std::fs::write(path, content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Render the configuration as YAML
    pub fn to_yaml(&self) -> crate::Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| crate::AgentError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.adapter
            .validate()
            .map_err(|e| crate::AgentError::Config(format!("Adapter config validation failed: {}", e)))?;

        if self.sampling.interval_ms == 0 {
            return Err(crate::AgentError::Config(
                "Sampling interval must be greater than 0".to_string(),
            ));
        }

        self.metrics
            .validate()
            .map_err(|e| crate::AgentError::Config(format!("Metrics config validation failed: {}", e)))?;

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(crate::AgentError::Config(format!("Invalid log level: {}", self.logging.level))),
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            _ => return Err(crate::AgentError::Config(format!("Invalid log format: {}", self.logging.format))),
        }

        Ok(())
    }
}
