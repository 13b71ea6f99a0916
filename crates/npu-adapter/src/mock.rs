//! Mock NPU backend for development and testing

use crate::config::MockConfig;
use crate::discovery::DeviceIdentity;
use crate::metrics::Signal;
use crate::query::{DeviceQuery, QueryError, QueryResult};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Return code for reads against a device the mock does not know
pub const MOCK_ERR_INVALID_DEVICE: i32 = -8007;

/// Return code used when a read is scripted to fail without an explicit code
pub const MOCK_ERR_READ_FAILED: i32 = -8005;

/// Simulated NPU devices with scriptable values, failures and call counters
#[derive(Debug)]
pub struct MockDeviceQuery {
    cards: Vec<(i32, Result<i32, i32>)>,
    card_list_failure: Option<i32>,
    defaults: HashMap<Signal, i64>,
    device_values: RwLock<HashMap<(DeviceIdentity, Signal), i64>>,
    failures: RwLock<HashMap<(DeviceIdentity, Signal), i32>>,
    card_list_calls: AtomicUsize,
    device_count_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl MockDeviceQuery {
    /// Create a mock with the given `(card_id, device_count)` layout
    pub fn with_cards(cards: &[(i32, i32)]) -> Self {
        Self {
            cards: cards.iter().map(|&(card, count)| (card, Ok(count))).collect(),
            card_list_failure: None,
            defaults: Signal::ALL
                .into_iter()
                .map(|signal| (signal, default_raw(signal)))
                .collect(),
            device_values: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            card_list_calls: AtomicUsize::new(0),
            device_count_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock from the configured layout, cards numbered from 0
    pub fn from_config(config: &MockConfig) -> Self {
        info!(
            "Creating mock NPU backend with {} card(s) x {} device(s)",
            config.cards, config.devices_per_card
        );
        let devices = i32::try_from(config.devices_per_card).unwrap_or(i32::MAX);
        let cards: Vec<(i32, i32)> = (0..config.cards)
            .filter_map(|card| i32::try_from(card).ok())
            .map(|card| (card, devices))
            .collect();
        Self::with_cards(&cards)
    }

    /// Make card enumeration fail with `code`
    pub fn with_card_list_failure(mut self, code: i32) -> Self {
        self.card_list_failure = Some(code);
        self
    }

    /// Make the device enumeration of `card_id` fail with `code`
    pub fn with_card_failure(mut self, card_id: i32, code: i32) -> Self {
        for (card, devices) in self.cards.iter_mut() {
            if *card == card_id {
                *devices = Err(code);
            }
        }
        self
    }

    /// Raw value returned for `signal` on every device without an override
    pub fn with_value(mut self, signal: Signal, raw: i64) -> Self {
        self.defaults.insert(signal, raw);
        self
    }

    /// Override the raw value of `signal` on one device
    pub fn set_value(&self, device: DeviceIdentity, signal: Signal, raw: i64) {
        self.device_values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((device, signal), raw);
    }

    /// Make reads of `signal` on `device` fail with `code` until cleared
    pub fn fail_signal(&self, device: DeviceIdentity, signal: Signal, code: i32) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((device, signal), code);
    }

    /// Make every read on `device` fail
    pub fn fail_device(&self, device: DeviceIdentity) {
        for signal in Signal::ALL {
            self.fail_signal(device, signal, MOCK_ERR_READ_FAILED);
        }
    }

    pub fn clear_failures(&self) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn card_list_calls(&self) -> usize {
        self.card_list_calls.load(Ordering::SeqCst)
    }

    pub fn device_count_calls(&self) -> usize {
        self.device_count_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn has_device(&self, device: DeviceIdentity) -> bool {
        self.cards.iter().any(|(card, devices)| {
            *card == device.card_id
                && matches!(devices, Ok(count) if device.device_id >= 0 && device.device_id < *count)
        })
    }
}

impl DeviceQuery for MockDeviceQuery {
    fn name(&self) -> &str {
        "mock_npu"
    }

    fn card_list(&self) -> QueryResult<Vec<i32>> {
        self.card_list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.card_list_failure {
            return Err(QueryError::new(code));
        }
        Ok(self.cards.iter().map(|(card, _)| *card).collect())
    }

    fn device_count(&self, card_id: i32) -> QueryResult<i32> {
        self.device_count_calls.fetch_add(1, Ordering::SeqCst);
        match self.cards.iter().find(|(card, _)| *card == card_id) {
            Some((_, devices)) => (*devices).map_err(QueryError::new),
            None => Err(QueryError::new(MOCK_ERR_INVALID_DEVICE)),
        }
    }

    fn read_signal(&self, device: DeviceIdentity, signal: Signal) -> QueryResult<i64> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        if !self.has_device(device) {
            return Err(QueryError::new(MOCK_ERR_INVALID_DEVICE));
        }

        let failures = self.failures.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(code) = failures.get(&(device, signal)) {
            debug!("Mock read of {} on {} scripted to fail", signal, device);
            return Err(QueryError::new(*code));
        }

        let overrides = self.device_values.read().unwrap_or_else(PoisonError::into_inner);
        let raw = overrides
            .get(&(device, signal))
            .or_else(|| self.defaults.get(&signal))
            .copied()
            .unwrap_or_else(|| default_raw(signal));
        Ok(raw)
    }

    fn library_version(&self) -> Option<String> {
        Some("mock".to_string())
    }

    fn driver_version(&self) -> Option<String> {
        Some(env!("CARGO_PKG_VERSION").to_string())
    }
}

/// Plausible raw readings of an idle device
fn default_raw(signal: Signal) -> i64 {
    match signal {
        Signal::AicoreUtilization => 35,
        Signal::AicpuUtilization => 12,
        Signal::MemoryUtilization => 48,
        Signal::AicoreFrequency => 1000,
        Signal::AicpuFrequency => 1900,
        Signal::MemoryFrequency => 1600,
        Signal::Power => 753,
        Signal::Health => 0,
        Signal::Temperature => 52,
        Signal::Voltage => 87,
    }
}
