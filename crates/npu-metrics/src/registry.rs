//! Metric model holding the current value of every series for every device

use crate::catalog::{CATALOG, LABEL_NAMES};
use crate::{MetricsError, Result};

use npu_adapter::{DeviceIdentity, Signal, Snapshot};
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Gauge series for the NPU catalog, backed by an explicitly owned registry
///
/// Cloning is cheap and every clone shares the same series. Each value is an
/// atomic inside its gauge, so exports running concurrently with `update` see
/// either the previous or the new value of a series, never a mix.
#[derive(Debug, Clone)]
pub struct MetricModel {
    inner: Arc<MetricModelInner>,
}

#[derive(Debug)]
struct MetricModelInner {
    registry: Registry,

    /// One vector per catalog entry, in catalog order
    series: Vec<GaugeVec>,

    /// Set once the first collection tick has completed
    ready: AtomicBool,

    ticks: AtomicU64,
}

impl MetricModel {
    /// Create and register every catalog series on a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register every catalog series on `registry`
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let mut series = Vec::with_capacity(CATALOG.len());

        for spec in CATALOG.iter() {
            let gauge = GaugeVec::new(Opts::new(spec.name, spec.help), &LABEL_NAMES).map_err(|e| {
                MetricsError::Registry(format!("Failed to create {}: {}", spec.name, e))
            })?;
            registry.register(Box::new(gauge.clone())).map_err(|e| {
                MetricsError::Registry(format!("Failed to register {}: {}", spec.name, e))
            })?;
            series.push(gauge);
        }

        debug!("Registered {} NPU series", series.len());

        Ok(Self {
            inner: Arc::new(MetricModelInner {
                registry,
                series,
                ready: AtomicBool::new(false),
                ticks: AtomicU64::new(0),
            }),
        })
    }

    /// The underlying registry, for registering additional collectors
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Overwrite every series of `identity` with the values of `snapshot`
    pub fn update(&self, identity: DeviceIdentity, snapshot: &Snapshot) {
        let card_id = identity.card_id.to_string();
        let device_id = identity.device_id.to_string();
        let labels = [card_id.as_str(), device_id.as_str()];

        for (spec, gauge) in CATALOG.iter().zip(&self.inner.series) {
            gauge
                .with_label_values(&labels)
                .set(snapshot.value(spec.signal));
        }
    }

    /// Current value of `signal` for `identity`, without creating the series
    pub fn read(&self, identity: DeviceIdentity, signal: Signal) -> Option<f64> {
        let card_id = identity.card_id.to_string();
        let device_id = identity.device_id.to_string();

        self.inner.series[signal.index()]
            .collect()
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                metric.get_label().iter().all(|pair| match pair.get_name() {
                    "card_id" => pair.get_value() == card_id,
                    "device_id" => pair.get_value() == device_id,
                    _ => false,
                })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Number of devices with at least one stored sample
    pub fn device_count(&self) -> usize {
        self.inner.series[0]
            .collect()
            .iter()
            .map(|family| family.get_metric().len())
            .sum()
    }

    /// Render every catalog series in the Prometheus text format.
    ///
    /// Catalog series come first in catalog order; a series without samples
    /// still carries its `# HELP` and `# TYPE` lines. Any other collector
    /// registered on the registry follows.
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut families: HashMap<String, MetricFamily> = self
            .inner
            .registry
            .gather()
            .into_iter()
            .map(|family| (family.get_name().to_string(), family))
            .collect();

        let mut buffer = Vec::new();
        for spec in CATALOG.iter() {
            match families.remove(spec.name) {
                Some(family) => encoder
                    .encode(std::slice::from_ref(&family), &mut buffer)
                    .map_err(|e| MetricsError::Export(format!("Failed to encode {}: {}", spec.name, e)))?,
                None => {
                    let header = format!(
                        "# HELP {name} {help}\n# TYPE {name} gauge\n",
                        name = spec.name,
                        help = spec.help
                    );
                    buffer.extend_from_slice(header.as_bytes());
                }
            }
        }

        let mut others: Vec<MetricFamily> = families.into_values().collect();
        others.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        encoder
            .encode(&others, &mut buffer)
            .map_err(|e| MetricsError::Export(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| MetricsError::Export(format!("Failed to convert metrics to string: {}", e)))
    }

    /// Count one completed collection tick
    pub fn record_tick(&self) -> u64 {
        self.inner.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.inner.ready.store(true, Ordering::SeqCst);
    }

    /// Whether at least one collection tick has completed
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }
}
