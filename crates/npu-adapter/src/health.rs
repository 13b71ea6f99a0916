//! NPU device health codes

use crate::metrics::HEALTH_NOT_EXIST;
use serde::{Deserialize, Serialize};

/// Device health as reported by the management library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Ok,
    Warn,
    Error,
    Critical,
    /// Device absent, or the health read failed
    NotExist,
    /// Code outside the documented range
    Unknown(u32),
}

impl HealthState {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => HealthState::Ok,
            1 => HealthState::Warn,
            2 => HealthState::Error,
            3 => HealthState::Critical,
            HEALTH_NOT_EXIST => HealthState::NotExist,
            other => HealthState::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            HealthState::Ok => 0,
            HealthState::Warn => 1,
            HealthState::Error => 2,
            HealthState::Critical => 3,
            HealthState::NotExist => HEALTH_NOT_EXIST,
            HealthState::Unknown(code) => *code,
        }
    }

    /// Whether the device reports itself as fully operational
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthState::Ok)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Ok => write!(f, "OK"),
            HealthState::Warn => write!(f, "WARN"),
            HealthState::Error => write!(f, "ERROR"),
            HealthState::Critical => write!(f, "CRITICAL"),
            HealthState::NotExist => write!(f, "NOT_EXIST"),
            HealthState::Unknown(_) => write!(f, "UNKNOWN"),
        }
    }
}
