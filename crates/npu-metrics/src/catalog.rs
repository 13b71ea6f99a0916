//! The fixed catalog of exported NPU series

use npu_adapter::Signal;

/// Label names carried by every series, in order
pub const LABEL_NAMES: [&str; 2] = ["card_id", "device_id"];

/// One exported gauge series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesSpec {
    pub signal: Signal,
    pub name: &'static str,
    pub help: &'static str,
    pub unit: &'static str,
}

/// Every exported series, in exposition order. Names and help strings are
/// consumed by existing dashboards and must not change.
pub const CATALOG: [SeriesSpec; 10] = [
    SeriesSpec {
        signal: Signal::AicoreUtilization,
        name: "npu_aicore_utilization_percent",
        help: "NPU AI Core utilization percentage",
        unit: "%",
    },
    SeriesSpec {
        signal: Signal::AicpuUtilization,
        name: "npu_aicpu_utilization_percent",
        help: "NPU AI CPU utilization percentage",
        unit: "%",
    },
    SeriesSpec {
        signal: Signal::MemoryUtilization,
        name: "npu_memory_utilization_percent",
        help: "NPU memory utilization percentage",
        unit: "%",
    },
    SeriesSpec {
        signal: Signal::AicoreFrequency,
        name: "npu_aicore_frequency_mhz",
        help: "NPU AI Core frequency in MHz",
        unit: "MHz",
    },
    SeriesSpec {
        signal: Signal::AicpuFrequency,
        name: "npu_aicpu_frequency_mhz",
        help: "NPU AI CPU frequency in MHz",
        unit: "MHz",
    },
    SeriesSpec {
        signal: Signal::MemoryFrequency,
        name: "npu_mem_frequency_mhz",
        help: "NPU mem frequency in MHz",
        unit: "MHz",
    },
    SeriesSpec {
        signal: Signal::Power,
        name: "npu_power_watts",
        help: "NPU power consumption in watts",
        unit: "W",
    },
    SeriesSpec {
        signal: Signal::Health,
        name: "npu_health",
        help: "NPU device health status (0:OK,1:WARN,2:ERROR,3:CRITICAL,0xFFFFFFFF:NOT_EXIST)",
        unit: "enum",
    },
    SeriesSpec {
        signal: Signal::Temperature,
        name: "npu_temperature_celsius",
        help: "NPU temperature in Celsius",
        unit: "°C",
    },
    SeriesSpec {
        signal: Signal::Voltage,
        name: "npu_voltage_volts",
        help: "NPU voltage in Volts",
        unit: "V",
    },
];

/// Catalog entry for `signal`
pub fn spec_for(signal: Signal) -> &'static SeriesSpec {
    &CATALOG[signal.index()]
}
