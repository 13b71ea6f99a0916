//! HTTP endpoint for serving metrics

use crate::{MetricModel, MetricsConfig, MetricsError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use npu_adapter::DeviceIdentity;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Static facts about the exporter reported on `/info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Device query backend name
    pub backend: String,
    pub library_version: Option<String>,
    pub driver_version: Option<String>,
    /// Identities fixed at discovery
    pub devices: Vec<DeviceIdentity>,
}

#[derive(Clone)]
struct AppState {
    model: MetricModel,
    info: Arc<ServiceInfo>,
    metrics_path: Arc<str>,
}

/// HTTP endpoint for serving metrics and health checks
pub struct MetricsEndpoint {
    model: MetricModel,
    info: Arc<ServiceInfo>,
    config: MetricsConfig,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<JoinHandle<()>>,
}

impl MetricsEndpoint {
    /// Create a new metrics endpoint
    pub fn new(model: MetricModel, info: ServiceInfo, config: MetricsConfig) -> Self {
        Self {
            model,
            info: Arc::new(info),
            config,
            local_addr: None,
            shutdown_tx: None,
            server_handle: None,
        }
    }

    /// Routes served by this endpoint
    pub fn router(&self) -> Router {
        create_app(AppState {
            model: self.model.clone(),
            info: Arc::clone(&self.info),
            metrics_path: Arc::from(self.config.path.as_str()),
        })
    }

    /// Bind the listener and start serving in the background
    pub async fn start(&mut self) -> Result<()> {
        if self.server_handle.is_some() {
            return Err(MetricsError::Config("Server already started".to_string()));
        }
        self.config.validate()?;

        let app = self.router();
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        info!("Starting metrics endpoint on {}{}", local_addr, self.config.path);

        let server_handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Metrics endpoint server error: {}", e);
            }
        });

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.server_handle = Some(server_handle);
        Ok(())
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            if let Err(e) = handle.await {
                warn!("Metrics endpoint task failed: {}", e);
            }
            info!("Metrics endpoint stopped");
        }
        self.local_addr = None;
    }

    /// Address actually bound, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Get the metrics URL
    pub fn metrics_url(&self) -> String {
        let addr = self.local_addr.unwrap_or(self.config.bind_addr);
        format!("http://{}{}", addr, self.config.path)
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.server_handle.is_some()
    }
}

impl Drop for MetricsEndpoint {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

/// Create the Axum application
fn create_app(state: AppState) -> Router {
    let metrics_path = state.metrics_path.to_string();
    Router::new()
        .route(&metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/info", get(info_handler))
        .with_state(state)
}

/// Handler for the metrics path
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.model.export() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to export NPU metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to export metrics").into_response()
        }
    }
}

/// Handler for /health endpoint
async fn health_handler() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
        .into_response()
}

/// Handler for /ready endpoint; ready once the first tick has landed
async fn ready_handler(State(state): State<AppState>) -> Response {
    let (status, label) = if state.model.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    };

    (
        status,
        Json(json!({
            "status": label,
            "ticks": state.model.ticks(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
        .into_response()
}

/// Handler for /info endpoint
async fn info_handler(State(state): State<AppState>) -> Response {
    let info = &state.info;

    (
        StatusCode::OK,
        Json(json!({
            "service": "npu-exporter",
            "version": env!("CARGO_PKG_VERSION"),
            "backend": info.backend,
            "library_version": info.library_version,
            "driver_version": info.driver_version,
            "devices": info.devices,
            "device_count": info.devices.len(),
            "endpoints": {
                "metrics": &*state.metrics_path,
                "health": "/health",
                "ready": "/ready",
                "info": "/info"
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use npu_adapter::Snapshot;
    use tower::ServiceExt;

    fn test_info() -> ServiceInfo {
        ServiceInfo {
            backend: "mock_npu".to_string(),
            library_version: Some("mock".to_string()),
            driver_version: None,
            devices: vec![DeviceIdentity::new(0, 0)],
        }
    }

    fn local_config() -> MetricsConfig {
        MetricsConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let model = MetricModel::new().unwrap();
        model.update(DeviceIdentity::new(0, 0), &Snapshot::failed());
        let endpoint = MetricsEndpoint::new(model, test_info(), local_config());

        let response = endpoint
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("# TYPE npu_health gauge"));
        assert!(text.contains(r#"npu_temperature_celsius{card_id="0",device_id="0"}"#));
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let config = MetricsConfig {
            path: "/npu".to_string(),
            ..local_config()
        };
        let endpoint = MetricsEndpoint::new(MetricModel::new().unwrap(), test_info(), config);

        let (status, body) = get_body(endpoint.router(), "/npu").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# HELP npu_power_watts"));

        let (status, _) = get_body(endpoint.router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ready_after_first_tick() {
        let model = MetricModel::new().unwrap();
        let endpoint = MetricsEndpoint::new(model.clone(), test_info(), local_config());

        let (status, body) = get_body(endpoint.router(), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("not ready"));

        model.record_tick();
        model.mark_ready();

        let (status, body) = get_body(endpoint.router(), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["ticks"], 1);
    }

    #[tokio::test]
    async fn test_health_and_info() {
        let endpoint = MetricsEndpoint::new(MetricModel::new().unwrap(), test_info(), local_config());

        let (status, _) = get_body(endpoint.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_body(endpoint.router(), "/info").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["backend"], "mock_npu");
        assert_eq!(json["device_count"], 1);
        assert_eq!(json["devices"][0]["card_id"], 0);
        assert_eq!(json["endpoints"]["metrics"], "/metrics");
        assert!(json["driver_version"].is_null());
    }

    #[tokio::test]
    async fn test_endpoint_start_stop() {
        let mut endpoint = MetricsEndpoint::new(MetricModel::new().unwrap(), test_info(), local_config());
        assert!(!endpoint.is_running());

        endpoint.start().await.unwrap();
        assert!(endpoint.is_running());
        let addr = endpoint.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(endpoint.metrics_url(), format!("http://{}/metrics", addr));

        assert!(endpoint.start().await.is_err());

        endpoint.stop().await;
        assert!(!endpoint.is_running());
        assert!(endpoint.local_addr().is_none());
    }
}
