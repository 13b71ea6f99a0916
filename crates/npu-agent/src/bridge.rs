//! Periodic collection from the device sampler into the metric model

use crate::{AgentError, Result};
use npu_adapter::DeviceSampler;
use npu_metrics::MetricModel;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Couples the sampler to the metric model; the only writer of the model
pub struct MetricsBridge {
    sampler: DeviceSampler,
    model: MetricModel,
}

impl MetricsBridge {
    pub fn new(sampler: DeviceSampler, model: MetricModel) -> Self {
        Self { sampler, model }
    }

    pub fn model(&self) -> &MetricModel {
        &self.model
    }

    pub fn sampler(&self) -> &DeviceSampler {
        &self.sampler
    }

    /// Sample every discovered device once and publish the results.
    ///
    /// Per-signal failures are absorbed by the sampler; only a missing
    /// discovery surfaces as an error.
    pub fn tick(&self) -> Result<()> {
        let labels = self.sampler.catalog().labels()?;
        let snapshots = self.sampler.sample()?;

        for (identity, snapshot) in labels.iter().zip(&snapshots) {
            self.model.update(*identity, snapshot);
        }

        let ticks = self.model.record_tick();
        if !self.model.is_ready() {
            self.model.mark_ready();
            info!("First collection tick completed for {} device(s)", labels.len());
        }
        debug!("Collection tick {} updated {} device(s)", ticks, snapshots.len());
        Ok(())
    }

    /// Run `tick` every `period` until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Each tick runs to completion on the blocking pool before shutdown is
    /// checked again; ticks never overlap and missed periods are delayed.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if period.is_zero() {
            return Err(AgentError::Config("Collection period must be greater than 0".to_string()));
        }

        info!("Starting collection loop every {:?}", period);

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            let bridge = Arc::clone(&self);
            let started = Instant::now();

            match tokio::task::spawn_blocking(move || bridge.tick()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Collection tick failed: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Collection tick aborted: {}", e);
                    return Err(AgentError::Service(format!("Collection tick aborted: {}", e)));
                }
            }

            let elapsed = started.elapsed();
            if elapsed > period {
                warn!(
                    "Collection tick took {:?}, longer than the {:?} period",
                    elapsed, period
                );
            }
        }

        info!("Collection loop stopped after {} tick(s)", self.model.ticks());
        Ok(())
    }
}
