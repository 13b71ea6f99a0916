//! # npu-agent
//!
//! NPU telemetry exporter daemon.
//!
//! This crate wires the device query backend, the label catalog, the sampler
//! and the metric model together, runs the periodic collection loop and serves
//! the scrape endpoint until a termination signal arrives.

pub mod agent;
pub mod bridge;
pub mod config;
pub mod probe;

// Re-export commonly used types
pub use agent::{Agent, AgentBuilder};
pub use bridge::MetricsBridge;
pub use config::{AgentConfig, LoggingConfig, SamplingConfig};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Adapter error: {0}")]
    Adapter(#[from] npu_adapter::AdapterError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] npu_metrics::MetricsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Whether the error happened before any device could be sampled
    pub fn is_startup_failure(&self) -> bool {
        match self {
            AgentError::Adapter(npu_adapter::AdapterError::UnsupportedBackend(_))
            | AgentError::Adapter(npu_adapter::AdapterError::Configuration(_)) => true,
            AgentError::Adapter(e) => e.is_discovery_failure() || e.is_driver_issue(),
            AgentError::Config(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Initialize logging and build the agent
pub async fn init_agent(config: &AgentConfig) -> Result<Agent> {
    init_logging(&config.logging)?;

    tracing::info!("Initializing NPU exporter with config: {:?}", config);

    let agent = AgentBuilder::new()
        .with_config(config.clone())
        .build()
        .await?;

    Ok(agent)
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers);

    let installed = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };

    installed.map_err(|e| AgentError::Config(format!("Failed to initialize logging: {}", e)))
}
