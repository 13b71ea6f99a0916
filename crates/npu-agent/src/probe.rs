//! One-shot device probe: discover, sample once and describe every device

use crate::Result;
use npu_adapter::{
    create_device_query, AdapterConfig, DeviceIdentity, DeviceQuery, DeviceSampler, LabelCatalog, Signal, Snapshot,
};
use npu_metrics::spec_for;
use std::sync::Arc;

/// Probe the devices behind `config`. Blocks on the vendor library.
pub fn probe(config: &AdapterConfig) -> Result<String> {
    let query = create_device_query(config)?;
    probe_with(query)
}

/// Probe the devices behind an existing query backend
pub fn probe_with(query: Arc<dyn DeviceQuery>) -> Result<String> {
    let catalog = Arc::new(LabelCatalog::new(Arc::clone(&query)));
    catalog.discover()?;

    let sampler = DeviceSampler::new(Arc::clone(&query), Arc::clone(&catalog));
    let labels = catalog.labels()?;
    let snapshots = sampler.sample()?;

    let mut report = format!(
        "Backend: {}\nLibrary version: {}\nDriver version: {}\n",
        query.name(),
        query.library_version().as_deref().unwrap_or("unknown"),
        query.driver_version().as_deref().unwrap_or("unknown"),
    );

    for (identity, snapshot) in labels.iter().zip(&snapshots) {
        report.push_str(&render_device(*identity, snapshot));
    }

    let healthy = snapshots
        .iter()
        .filter(|snapshot| snapshot.health_state().is_healthy())
        .count();
    report.push_str(&format!("\n{} of {} device(s) healthy\n", healthy, snapshots.len()));

    Ok(report)
}

fn render_device(identity: DeviceIdentity, snapshot: &Snapshot) -> String {
    let health = snapshot.health_state();
    let mut section = format!(
        "\n=== Card {} Device {} ===\nHealth: {} ({})\n",
        identity.card_id,
        identity.device_id,
        health,
        health.code()
    );

    for signal in Signal::ALL.into_iter().filter(|signal| *signal != Signal::Health) {
        let spec = spec_for(signal);
        let marker = if snapshot.is_valid(signal) { "" } else { " (read failed)" };
        section.push_str(&format!(
            "  {:<26} {} {}{}\n",
            signal.description(),
            snapshot.value(signal),
            spec.unit,
            marker
        ));
    }
    section
}
