//! # npu-adapter
//!
//! Ascend NPU discovery and telemetry sampling.
//!
//! This crate provides:
//! - The [`DeviceQuery`] capability over the vendor management library
//! - One-shot device discovery with label caching ([`LabelCatalog`])
//! - Per-device, per-signal sampling with failure isolation ([`DeviceSampler`])
//! - Snapshot types carrying sentinel values plus explicit validity flags
//!
//! ## Supported Backends
//!
//! - **DCMI**: Ascend Device Control Management Interface (`libdcmi`)
//! - **Mock**: deterministic simulated devices for development and testing
//!
//! ## Example
//!
//! ```rust,no_run
//! use npu_adapter::{create_device_query, AdapterConfig, Backend, DeviceSampler, LabelCatalog};
//! use std::sync::Arc;
//!
//! fn main() -> npu_adapter::Result<()> {
//!     let config = AdapterConfig::new(Backend::Mock);
//!     let query = create_device_query(&config)?;
//!
//!     let catalog = Arc::new(LabelCatalog::new(Arc::clone(&query)));
//!     let devices = catalog.discover()?;
//!     println!("Found {} NPU devices", devices.len());
//!
//!     let sampler = DeviceSampler::new(query, catalog);
//!     for snapshot in sampler.sample()? {
//!         println!("{:?}", snapshot);
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod config;
pub mod discovery;
pub mod health;
pub mod metrics;
pub mod query;
pub mod sampler;

// Backend-specific modules
#[cfg(feature = "dcmi")]
pub mod dcmi;

// Mock implementation for testing
#[cfg(any(feature = "mock", test))]
pub mod mock;

// Re-export main types
pub use config::{AdapterConfig, Backend, MockConfig};
pub use discovery::{DeviceIdentity, LabelCatalog};
pub use health::HealthState;
pub use metrics::{Reading, Signal, Snapshot, HEALTH_NOT_EXIST};
pub use query::{create_device_query, DeviceQuery, QueryError, QueryResult};
pub use sampler::DeviceSampler;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors that can occur while discovering or sampling devices
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("NPU backend not supported: {0}")]
    UnsupportedBackend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("NPU library initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Card enumeration failed: {0}")]
    CardEnumeration(#[source] QueryError),

    #[error("No NPU devices found on any card")]
    NoDevices,

    #[error("Device labels are not ready: discovery has not completed")]
    NotReady,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AdapterError {
    /// Check if this error means the process has no usable device set
    pub fn is_discovery_failure(&self) -> bool {
        matches!(
            self,
            AdapterError::CardEnumeration(_) | AdapterError::NoDevices
        )
    }

    /// Check if this error indicates a library or driver issue
    pub fn is_driver_issue(&self) -> bool {
        matches!(
            self,
            AdapterError::InitializationFailed(_) | AdapterError::CardEnumeration(_)
        )
    }
}
