//! Device query capability over the NPU management library

use crate::config::{AdapterConfig, Backend};
use crate::discovery::DeviceIdentity;
use crate::metrics::Signal;
use crate::{AdapterError, Result};

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// A failed library call, carrying the library's return code
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("device query failed (ret={code})")]
pub struct QueryError {
    pub code: i32,
}

impl QueryError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Result of a single library call
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Trait defining the hardware query surface
///
/// Every call is synchronous and may fail independently of the others.
pub trait DeviceQuery: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Enumerate the cards present in the system
    fn card_list(&self) -> QueryResult<Vec<i32>>;

    /// Number of devices on `card_id`; device ids are `0..count`
    fn device_count(&self, card_id: i32) -> QueryResult<i32>;

    /// Read the raw library value of `signal` for one device
    fn read_signal(&self, device: DeviceIdentity, signal: Signal) -> QueryResult<i64>;

    /// Version of the management library, if the backend reports one
    fn library_version(&self) -> Option<String> {
        None
    }

    /// Version of the device driver, if the backend reports one
    fn driver_version(&self) -> Option<String> {
        None
    }
}

/// Create a backend-specific device query
pub fn create_device_query(config: &AdapterConfig) -> Result<Arc<dyn DeviceQuery>> {
    config.validate().map_err(AdapterError::Configuration)?;

    let query: Arc<dyn DeviceQuery> = match config.backend {
        #[cfg(feature = "dcmi")]
        Backend::Dcmi => Arc::new(crate::dcmi::DcmiDeviceQuery::new()?),

        #[cfg(any(feature = "mock", test))]
        Backend::Mock => Arc::new(crate::mock::MockDeviceQuery::from_config(&config.mock)),

        #[allow(unreachable_patterns)]
        _ => {
            warn!("NPU backend {} not supported or feature not enabled", config.backend);
            return Err(AdapterError::UnsupportedBackend(config.backend.to_string()));
        }
    };

    info!(
        "Created {} device query (library version: {}, driver version: {})",
        query.name(),
        query.library_version().as_deref().unwrap_or("unknown"),
        query.driver_version().as_deref().unwrap_or("unknown"),
    );
    Ok(query)
}
