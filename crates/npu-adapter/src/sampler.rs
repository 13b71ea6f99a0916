//! Per-device telemetry sampling

use crate::discovery::{DeviceIdentity, LabelCatalog};
use crate::metrics::{Signal, Snapshot};
use crate::query::DeviceQuery;
use crate::Result;

use std::sync::Arc;
use tracing::{debug, warn};

/// Reads every tracked signal of every discovered device
///
/// A failed read stores the signal's sentinel and is logged; it never stops
/// the remaining reads of the device or of other devices.
pub struct DeviceSampler {
    query: Arc<dyn DeviceQuery>,
    catalog: Arc<LabelCatalog>,
}

impl DeviceSampler {
    pub fn new(query: Arc<dyn DeviceQuery>, catalog: Arc<LabelCatalog>) -> Self {
        Self { query, catalog }
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    /// Sample every cached device, in catalog order.
    ///
    /// Fails with [`crate::AdapterError::NotReady`] if discovery has not run.
    pub fn sample(&self) -> Result<Vec<Snapshot>> {
        let labels = self.catalog.labels()?;
        Ok(self.sample_devices(labels))
    }

    /// Sample the given devices; the output is positionally aligned with `identities`
    pub fn sample_devices(&self, identities: &[DeviceIdentity]) -> Vec<Snapshot> {
        identities
            .iter()
            .map(|identity| self.sample_device(*identity))
            .collect()
    }

    /// Read all signals of one device
    pub fn sample_device(&self, identity: DeviceIdentity) -> Snapshot {
        let mut snapshot = Snapshot::failed();

        for signal in Signal::ALL {
            self.read_into(&mut snapshot, identity, signal);
        }

        let failed = snapshot.failed_signals();
        if !failed.is_empty() {
            debug!(
                "Device {} sampled with {} failed signal(s): {:?}",
                identity,
                failed.len(),
                failed
            );
        }
        snapshot
    }

    fn read_into(&self, snapshot: &mut Snapshot, identity: DeviceIdentity, signal: Signal) {
        match self.query.read_signal(identity, signal) {
            Ok(raw) => {
                if !snapshot.set_raw(signal, raw) {
                    warn!(
                        "Discarding out-of-range {} reading {} (card={}) (dev={})",
                        signal, raw, identity.card_id, identity.device_id
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Failed to get {} ({}) (card={}) (dev={})",
                    signal, e, identity.card_id, identity.device_id
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Reading, HEALTH_NOT_EXIST};
    use crate::mock::MockDeviceQuery;
    use crate::AdapterError;

    fn sampler_for(mock: MockDeviceQuery) -> (Arc<MockDeviceQuery>, DeviceSampler) {
        let mock = Arc::new(mock);
        let catalog = Arc::new(LabelCatalog::new(mock.clone()));
        (mock.clone(), DeviceSampler::new(mock, catalog))
    }

    #[test]
    fn test_sample_before_discovery() {
        let (mock, sampler) = sampler_for(MockDeviceQuery::with_cards(&[(0, 1)]));

        assert!(matches!(sampler.sample(), Err(AdapterError::NotReady)));
        assert_eq!(mock.read_calls(), 0);
    }

    #[test]
    fn test_sample_all_signals() {
        let (mock, sampler) = sampler_for(
            MockDeviceQuery::with_cards(&[(0, 2)])
                .with_value(Signal::AicoreUtilization, 42)
                .with_value(Signal::Power, 155)
                .with_value(Signal::Voltage, 1100)
                .with_value(Signal::Health, 1),
        );
        sampler.catalog().discover().unwrap();

        let snapshots = sampler.sample().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(mock.read_calls(), 2 * Signal::ALL.len());

        for snapshot in &snapshots {
            assert!(snapshot.failed_signals().is_empty());
            assert_eq!(snapshot.util_aicore, Reading::ok(42));
            assert_eq!(snapshot.power, Reading::ok(15.5));
            assert_eq!(snapshot.voltage, Reading::ok(11.0));
            assert_eq!(snapshot.health, Reading::ok(1));
        }
    }

    #[test]
    fn test_single_signal_failure_is_isolated() {
        let failing = DeviceIdentity::new(0, 1);
        let (mock, sampler) = sampler_for(
            MockDeviceQuery::with_cards(&[(0, 2), (1, 1)]).with_value(Signal::Temperature, 60),
        );
        sampler.catalog().discover().unwrap();
        mock.fail_signal(failing, Signal::Temperature, -8005);

        let snapshots = sampler.sample().unwrap();
        assert_eq!(snapshots.len(), 3);

        let broken = &snapshots[1];
        assert_eq!(broken.temperature, Reading::failed(0));
        assert_eq!(broken.failed_signals(), vec![Signal::Temperature]);

        for (index, snapshot) in snapshots.iter().enumerate() {
            if index != 1 {
                assert_eq!(snapshot.temperature, Reading::ok(60));
                assert!(snapshot.failed_signals().is_empty());
            }
        }
    }

    #[test]
    fn test_failed_health_uses_not_exist_sentinel() {
        let device = DeviceIdentity::new(0, 0);
        let (mock, sampler) = sampler_for(MockDeviceQuery::with_cards(&[(0, 1)]));
        mock.fail_device(device);

        let snapshot = sampler.sample_device(device);
        assert_eq!(snapshot.health, Reading::failed(HEALTH_NOT_EXIST));
        assert_eq!(snapshot, Snapshot::failed());
    }

    #[test]
    fn test_out_of_range_reading_is_a_failure() {
        let (_, sampler) = sampler_for(
            MockDeviceQuery::with_cards(&[(0, 1)]).with_value(Signal::AicpuFrequency, -3),
        );

        let snapshot = sampler.sample_device(DeviceIdentity::new(0, 0));
        assert_eq!(snapshot.aicpu_freq, Reading::failed(0));
        assert_eq!(snapshot.failed_signals(), vec![Signal::AicpuFrequency]);
    }

    #[test]
    fn test_output_follows_input_order() {
        let (_, sampler) = sampler_for(MockDeviceQuery::with_cards(&[(0, 1), (1, 1)]));
        let first = DeviceIdentity::new(1, 0);
        let second = DeviceIdentity::new(0, 0);
        let unknown = DeviceIdentity::new(9, 9);

        let snapshots = sampler.sample_devices(&[first, unknown, second]);
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots[0].failed_signals().is_empty());
        assert_eq!(snapshots[1], Snapshot::failed());
        assert!(snapshots[2].failed_signals().is_empty());
    }
}
