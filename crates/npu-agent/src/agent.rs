//! Core agent implementation

use crate::{bridge::MetricsBridge, config::AgentConfig, AgentError, Result};
use npu_adapter::{create_device_query, DeviceQuery, DeviceSampler, LabelCatalog};
use npu_metrics::{MetricModel, MetricsEndpoint, ServiceInfo};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The NPU exporter: collection loop plus scrape endpoint
pub struct Agent {
    config: AgentConfig,
    catalog: Arc<LabelCatalog>,
    bridge: Arc<MetricsBridge>,
    endpoint: MetricsEndpoint,
    shutdown_tx: watch::Sender<bool>,
    collector: Option<JoinHandle<Result<()>>>,
}

impl Agent {
    pub(crate) fn new(
        config: AgentConfig,
        catalog: Arc<LabelCatalog>,
        bridge: Arc<MetricsBridge>,
        endpoint: MetricsEndpoint,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            catalog,
            bridge,
            endpoint,
            shutdown_tx,
            collector: None,
        }
    }

    /// Start serving and collecting
    pub async fn start(&mut self) -> Result<()> {
        if self.collector.is_some() {
            return Err(AgentError::Service("Agent already started".to_string()));
        }

        info!(
            "Starting NPU exporter for {} device(s)",
            self.catalog.labels()?.len()
        );

        self.endpoint.start().await?;

        self.shutdown_tx.send_replace(false);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.sampling.interval();
        self.collector = Some(tokio::spawn(Arc::clone(&self.bridge).run(period, shutdown_rx)));

        info!("NPU exporter started, serving {}", self.endpoint.metrics_url());
        Ok(())
    }

    /// Stop collecting after the in-flight tick, then stop serving
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping NPU exporter");

        self.shutdown_tx.send_replace(true);

        let mut outcome = Ok(());
        if let Some(handle) = self.collector.take() {
            outcome = join_collector(handle.await);
        }

        self.endpoint.stop().await;

        info!("NPU exporter stopped");
        outcome
    }

    /// Run until a termination signal arrives or collection fails
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let outcome = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C signal");
                Ok(())
            }
            _ = wait_for_termination() => {
                info!("Received termination signal");
                Ok(())
            }
            result = self.wait_for_collector() => {
                if let Err(ref e) = result {
                    error!("Collection loop exited: {}", e);
                }
                result
            }
        };

        let stopped = self.stop().await;
        outcome.and(stopped)
    }

    /// Get the agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    pub fn model(&self) -> &MetricModel {
        self.bridge.model()
    }

    pub fn bridge(&self) -> &Arc<MetricsBridge> {
        &self.bridge
    }

    /// Address the scrape endpoint is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.local_addr()
    }

    pub fn metrics_url(&self) -> String {
        self.endpoint.metrics_url()
    }

    pub fn is_running(&self) -> bool {
        self.collector.is_some()
    }

    async fn wait_for_collector(&mut self) -> Result<()> {
        let joined = match self.collector.as_mut() {
            Some(handle) => handle.await,
            None => return std::future::pending().await,
        };
        self.collector = None;
        join_collector(joined)
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

fn join_collector(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(AgentError::Service(format!("Collection task failed: {}", e))),
    }
}

/// Wait for termination signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
    }
}

/// Wait for termination signals (Windows)
#[cfg(not(unix))]
async fn wait_for_termination() {
    // On Windows, we only handle Ctrl+C
    let _ = signal::ctrl_c().await;
}

/// Builder for creating agents
pub struct AgentBuilder {
    config: Option<AgentConfig>,
    query: Option<Arc<dyn DeviceQuery>>,
}

impl AgentBuilder {
    /// Create a new agent builder
    pub fn new() -> Self {
        Self {
            config: None,
            query: None,
        }
    }

    /// Set the agent configuration
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `query` instead of creating one from the adapter configuration
    pub fn with_device_query(mut self, query: Arc<dyn DeviceQuery>) -> Self {
        self.query = Some(query);
        self
    }

    /// Build the agent. Device discovery happens here; any failure is fatal.
    pub async fn build(self) -> Result<Agent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let query = match self.query {
            Some(query) => query,
            None => create_device_query(&config.adapter)?,
        };

        let catalog = Arc::new(LabelCatalog::new(Arc::clone(&query)));
        let discovering = Arc::clone(&catalog);
        let devices = tokio::task::spawn_blocking(move || {
            discovering.discover().map(|labels| labels.to_vec())
        })
        .await
        .map_err(|e| AgentError::Service(format!("Device discovery task failed: {}", e)))??;

        let model = MetricModel::new()?;
        let sampler = DeviceSampler::new(Arc::clone(&query), Arc::clone(&catalog));
        let bridge = Arc::new(MetricsBridge::new(sampler, model.clone()));

        let info = ServiceInfo {
            backend: query.name().to_string(),
            library_version: query.library_version(),
            driver_version: query.driver_version(),
            devices,
        };
        let endpoint = MetricsEndpoint::new(model, info, config.metrics.clone());

        Ok(Agent::new(config, catalog, bridge, endpoint))
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_adapter::mock::MockDeviceQuery;
    use npu_adapter::{AdapterConfig, AdapterError, Backend};
    use std::time::Duration;

    fn test_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.adapter = AdapterConfig::new(Backend::Mock).with_mock_layout(2, 1);
        config.sampling.interval_ms = 20;
        config.metrics.bind_addr = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[tokio::test]
    async fn test_agent_builder_discovers_devices() {
        let agent = AgentBuilder::new()
            .with_config(test_config())
            .build()
            .await
            .unwrap();

        assert!(agent.catalog().is_discovered());
        assert_eq!(agent.catalog().labels().unwrap().len(), 2);
        assert!(!agent.model().is_ready());
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn test_build_fails_without_devices() {
        let query = Arc::new(MockDeviceQuery::with_cards(&[(0, 0)]));
        let result = AgentBuilder::new()
            .with_config(test_config())
            .with_device_query(query)
            .build()
            .await;

        assert!(matches!(result, Err(AgentError::Adapter(AdapterError::NoDevices))));
    }

    #[tokio::test]
    async fn test_build_fails_on_card_enumeration() {
        let query = Arc::new(MockDeviceQuery::with_cards(&[(0, 1)]).with_card_list_failure(-8005));
        let result = AgentBuilder::new()
            .with_config(test_config())
            .with_device_query(query)
            .build()
            .await;

        let error = result.err().unwrap();
        assert!(error.is_startup_failure());
        assert!(matches!(error, AgentError::Adapter(AdapterError::CardEnumeration(_))));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut config = test_config();
        config.sampling.interval_ms = 0;

        let result = AgentBuilder::new().with_config(config).build().await;
        assert!(matches!(result, Err(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn test_agent_lifecycle() {
        let mut agent = AgentBuilder::new()
            .with_config(test_config())
            .build()
            .await
            .unwrap();

        agent.start().await.unwrap();
        assert!(agent.is_running());
        assert!(agent.local_addr().is_some());
        assert!(agent.start().await.is_err());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !agent.model().is_ready() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        agent.stop().await.unwrap();
        assert!(!agent.is_running());
        assert!(agent.local_addr().is_none());
        assert_eq!(agent.model().device_count(), 2);
    }
}
