//! End-to-end collection through the bridge and the HTTP surface

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use npu_adapter::mock::MockDeviceQuery;
use npu_adapter::{DeviceIdentity, DeviceSampler, LabelCatalog, Signal};
use npu_agent::{AgentBuilder, AgentConfig, MetricsBridge};
use npu_metrics::{MetricModel, MetricsConfig, MetricsEndpoint, ServiceInfo, CATALOG};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const FIRST: &str = r#"{card_id="0",device_id="0"}"#;
const SECOND: &str = r#"{card_id="1",device_id="0"}"#;

fn two_card_mock() -> Arc<MockDeviceQuery> {
    Arc::new(
        MockDeviceQuery::with_cards(&[(0, 1), (1, 1)])
            .with_value(Signal::AicoreUtilization, 42)
            .with_value(Signal::Power, 155)
            .with_value(Signal::Voltage, 1100),
    )
}

fn bridge_for(mock: Arc<MockDeviceQuery>) -> Arc<MetricsBridge> {
    let catalog = Arc::new(LabelCatalog::new(mock.clone()));
    catalog.discover().unwrap();
    let sampler = DeviceSampler::new(mock, catalog);
    Arc::new(MetricsBridge::new(sampler, MetricModel::new().unwrap()))
}

#[test]
fn test_single_tick_exports_every_series_per_device() {
    let bridge = bridge_for(two_card_mock());
    bridge.tick().unwrap();

    let model = bridge.model();
    for card in [0, 1] {
        let device = DeviceIdentity::new(card, 0);
        assert_eq!(model.read(device, Signal::AicoreUtilization), Some(42.0));
        assert_eq!(model.read(device, Signal::Power), Some(15.5));
        assert_eq!(model.read(device, Signal::Voltage), Some(11.0));
    }

    let text = model.export().unwrap();
    for spec in CATALOG.iter() {
        let rows: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with(&format!("{}{{", spec.name)))
            .collect();
        assert_eq!(rows.len(), 2, "{} rows: {:?}", spec.name, rows);
        assert!(rows.iter().any(|row| row.contains(FIRST)));
        assert!(rows.iter().any(|row| row.contains(SECOND)));
    }
    assert!(text.contains(&format!("npu_power_watts{} 15.5", FIRST)));
    assert!(text.contains(&format!("npu_power_watts{} 15.5", SECOND)));
}

#[test]
fn test_ticks_do_not_rediscover() {
    let mock = two_card_mock();
    let bridge = bridge_for(mock.clone());

    for _ in 0..3 {
        bridge.tick().unwrap();
    }

    assert_eq!(mock.card_list_calls(), 1);
    assert_eq!(mock.device_count_calls(), 2);
    assert_eq!(mock.read_calls(), 3 * 2 * Signal::ALL.len());
    assert_eq!(bridge.model().ticks(), 3);
}

#[test]
fn test_values_follow_latest_tick() {
    let mock = two_card_mock();
    let bridge = bridge_for(mock.clone());
    let device = DeviceIdentity::new(1, 0);

    bridge.tick().unwrap();
    mock.set_value(device, Signal::Temperature, 80);
    bridge.tick().unwrap();

    let model = bridge.model();
    assert_eq!(model.read(device, Signal::Temperature), Some(80.0));
    assert_eq!(model.read(DeviceIdentity::new(0, 0), Signal::Temperature), Some(52.0));
    assert_eq!(model.device_count(), 2);
}

#[tokio::test]
async fn test_scrape_while_collecting() {
    let mock = two_card_mock();
    let bridge = bridge_for(mock.clone());
    let endpoint = MetricsEndpoint::new(
        bridge.model().clone(),
        ServiceInfo::default(),
        MetricsConfig::default(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let collector = tokio::spawn(Arc::clone(&bridge).run(Duration::from_millis(5), shutdown_rx));

    let mut round = 0i64;
    for _ in 0..50 {
        round += 1;
        mock.set_value(DeviceIdentity::new(0, 0), Signal::Power, if round % 2 == 0 { 155 } else { 300 });

        let response = endpoint
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        for spec in CATALOG.iter() {
            assert!(text.contains(&format!("# TYPE {} gauge", spec.name)));
        }

        if let Some(power) = bridge.model().read(DeviceIdentity::new(0, 0), Signal::Power) {
            assert!(power == 15.5 || power == 30.0, "unexpected power {}", power);
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    shutdown_tx.send(true).unwrap();
    collector.await.unwrap().unwrap();
    assert!(bridge.model().is_ready());
}

#[tokio::test]
async fn test_agent_serves_over_http() {
    let mut config = AgentConfig::default();
    config.sampling.interval_ms = 10;
    config.metrics.bind_addr = "127.0.0.1:0".parse().unwrap();

    let mut agent = AgentBuilder::new()
        .with_config(config)
        .with_device_query(two_card_mock())
        .build()
        .await
        .unwrap();

    agent.start().await.unwrap();
    let addr = agent.local_addr().unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !agent.model().is_ready() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let response = client.get(agent.metrics_url()).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body = response.text().await.unwrap();
    assert!(body.contains(&format!("npu_power_watts{} 15.5", FIRST)));
    assert!(body.contains(&format!("npu_aicore_utilization_percent{}", SECOND)));

    let ready = client
        .get(format!("http://{}/ready", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(ready.status(), reqwest::StatusCode::OK);

    agent.stop().await.unwrap();
}
