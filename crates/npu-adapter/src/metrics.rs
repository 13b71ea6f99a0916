//! NPU telemetry data structures

use crate::health::HealthState;
use serde::{Deserialize, Serialize};

/// Health code reported when the health read fails or the device is absent
pub const HEALTH_NOT_EXIST: u32 = 0xFFFF_FFFF;

/// Telemetry signals read from every device, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    AicoreUtilization,
    AicpuUtilization,
    MemoryUtilization,
    AicoreFrequency,
    AicpuFrequency,
    MemoryFrequency,
    Power,
    Health,
    Temperature,
    Voltage,
}

impl Signal {
    /// Every tracked signal, in catalog order
    pub const ALL: [Signal; 10] = [
        Signal::AicoreUtilization,
        Signal::AicpuUtilization,
        Signal::MemoryUtilization,
        Signal::AicoreFrequency,
        Signal::AicpuFrequency,
        Signal::MemoryFrequency,
        Signal::Power,
        Signal::Health,
        Signal::Temperature,
        Signal::Voltage,
    ];

    /// Position of the signal in [`Signal::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human readable name used in diagnostics
    pub fn description(self) -> &'static str {
        match self {
            Signal::AicoreUtilization => "AICore utilization rate",
            Signal::AicpuUtilization => "AICPU utilization rate",
            Signal::MemoryUtilization => "memory utilization rate",
            Signal::AicoreFrequency => "AICore frequency",
            Signal::AicpuFrequency => "AICPU frequency",
            Signal::MemoryFrequency => "memory frequency",
            Signal::Power => "power",
            Signal::Health => "health",
            Signal::Temperature => "temperature",
            Signal::Voltage => "voltage",
        }
    }

    /// Wire value stored when the signal cannot be read
    pub fn sentinel(self) -> f64 {
        match self {
            Signal::Health => f64::from(HEALTH_NOT_EXIST),
            _ => 0.0,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A single signal value together with whether the read succeeded
///
/// Failed reads keep the sentinel in `value` so the exposition format stays
/// unchanged, while `valid` lets callers tell a failure from a genuine zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading<T> {
    pub value: T,
    pub valid: bool,
}

impl<T> Reading<T> {
    /// A successful read
    pub fn ok(value: T) -> Self {
        Self { value, valid: true }
    }

    /// A failed read carrying its sentinel
    pub fn failed(sentinel: T) -> Self {
        Self {
            value: sentinel,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Every sampled signal for one device at one collection tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// AI Core utilization (%)
    pub util_aicore: Reading<u32>,

    /// AI CPU utilization (%)
    pub util_aicpu: Reading<u32>,

    /// Memory utilization (%)
    pub util_mem: Reading<u32>,

    /// AI Core frequency (MHz)
    pub aicore_freq: Reading<u32>,

    /// AI CPU frequency (MHz)
    pub aicpu_freq: Reading<u32>,

    /// Memory frequency (MHz)
    pub mem_freq: Reading<u32>,

    /// Power consumption (W), raw reading is in 0.1 W
    pub power: Reading<f64>,

    /// Health code (0 OK, 1 WARN, 2 ERROR, 3 CRITICAL)
    pub health: Reading<u32>,

    /// Temperature (°C)
    pub temperature: Reading<i32>,

    /// Voltage (V), raw reading is in 0.01 V
    pub voltage: Reading<f64>,
}

impl Snapshot {
    /// A snapshot where every signal holds its sentinel
    pub fn failed() -> Self {
        Self {
            util_aicore: Reading::failed(0),
            util_aicpu: Reading::failed(0),
            util_mem: Reading::failed(0),
            aicore_freq: Reading::failed(0),
            aicpu_freq: Reading::failed(0),
            mem_freq: Reading::failed(0),
            power: Reading::failed(0.0),
            health: Reading::failed(HEALTH_NOT_EXIST),
            temperature: Reading::failed(0),
            voltage: Reading::failed(0.0),
        }
    }

    /// Store a raw library reading for `signal`, applying its unit scaling.
    ///
    /// Returns `false` and leaves the sentinel in place when the raw value
    /// does not fit the signal's type.
    pub fn set_raw(&mut self, signal: Signal, raw: i64) -> bool {
        match signal {
            Signal::AicoreUtilization => set_unsigned(&mut self.util_aicore, raw),
            Signal::AicpuUtilization => set_unsigned(&mut self.util_aicpu, raw),
            Signal::MemoryUtilization => set_unsigned(&mut self.util_mem, raw),
            Signal::AicoreFrequency => set_unsigned(&mut self.aicore_freq, raw),
            Signal::AicpuFrequency => set_unsigned(&mut self.aicpu_freq, raw),
            Signal::MemoryFrequency => set_unsigned(&mut self.mem_freq, raw),
            Signal::Health => set_unsigned(&mut self.health, raw),
            Signal::Power => match i32::try_from(raw) {
                Ok(tenths) => {
                    self.power = Reading::ok(f64::from(tenths) / 10.0);
                    true
                }
                Err(_) => false,
            },
            Signal::Temperature => match i32::try_from(raw) {
                Ok(celsius) => {
                    self.temperature = Reading::ok(celsius);
                    true
                }
                Err(_) => false,
            },
            Signal::Voltage => match u32::try_from(raw) {
                Ok(hundredths) => {
                    self.voltage = Reading::ok(f64::from(hundredths) / 100.0);
                    true
                }
                Err(_) => false,
            },
        }
    }

    /// Wire value of `signal`, the sentinel if the read failed
    pub fn value(&self, signal: Signal) -> f64 {
        match signal {
            Signal::AicoreUtilization => f64::from(self.util_aicore.value),
            Signal::AicpuUtilization => f64::from(self.util_aicpu.value),
            Signal::MemoryUtilization => f64::from(self.util_mem.value),
            Signal::AicoreFrequency => f64::from(self.aicore_freq.value),
            Signal::AicpuFrequency => f64::from(self.aicpu_freq.value),
            Signal::MemoryFrequency => f64::from(self.mem_freq.value),
            Signal::Power => self.power.value,
            Signal::Health => f64::from(self.health.value),
            Signal::Temperature => f64::from(self.temperature.value),
            Signal::Voltage => self.voltage.value,
        }
    }

    /// Whether `signal` was read successfully
    pub fn is_valid(&self, signal: Signal) -> bool {
        match signal {
            Signal::AicoreUtilization => self.util_aicore.is_valid(),
            Signal::AicpuUtilization => self.util_aicpu.is_valid(),
            Signal::MemoryUtilization => self.util_mem.is_valid(),
            Signal::AicoreFrequency => self.aicore_freq.is_valid(),
            Signal::AicpuFrequency => self.aicpu_freq.is_valid(),
            Signal::MemoryFrequency => self.mem_freq.is_valid(),
            Signal::Power => self.power.is_valid(),
            Signal::Health => self.health.is_valid(),
            Signal::Temperature => self.temperature.is_valid(),
            Signal::Voltage => self.voltage.is_valid(),
        }
    }

    /// Signals whose read failed in this snapshot
    pub fn failed_signals(&self) -> Vec<Signal> {
        Signal::ALL
            .into_iter()
            .filter(|signal| !self.is_valid(*signal))
            .collect()
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::from_code(self.health.value)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::failed()
    }
}

fn set_unsigned(slot: &mut Reading<u32>, raw: i64) -> bool {
    match u32::try_from(raw) {
        Ok(value) => {
            *slot = Reading::ok(value);
            true
        }
        Err(_) => false,
    }
}
