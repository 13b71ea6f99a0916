//! # npu-metrics
//!
//! Prometheus metric model and scrape endpoint for NPU telemetry.
//!
//! This crate provides:
//! - The fixed catalog of ten per-device gauge series
//! - [`MetricModel`], an explicitly owned registry holding the current value of
//!   every series for every device
//! - [`MetricsEndpoint`], the HTTP surface serving `/metrics`, `/health`,
//!   `/ready` and `/info`

pub mod catalog;
pub mod endpoint;
pub mod registry;

// Re-export commonly used types
pub use catalog::{spec_for, SeriesSpec, CATALOG, LABEL_NAMES};
pub use endpoint::{MetricsEndpoint, ServiceInfo};
pub use registry::MetricModel;

use std::net::SocketAddr;

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Default scrape listener address
pub const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    8080,
);

/// Default scrape path
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Configuration for the metrics endpoint
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,

    /// Path serving the text exposition
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

impl MetricsConfig {
    /// Validate the endpoint configuration
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(MetricsError::Config(format!(
                "metrics path must start with '/': {}",
                self.path
            )));
        }
        if matches!(self.path.as_str(), "/health" | "/ready" | "/info") {
            return Err(MetricsError::Config(format!(
                "metrics path {} collides with a built-in route",
                self.path
            )));
        }
        Ok(())
    }
}
