//! NPU adapter configuration

use serde::{Deserialize, Serialize};

/// NPU query backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Ascend Device Control Management Interface
    Dcmi,
    /// Simulated devices for development and testing
    Mock,
}

/// Adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Backend used to query devices
    pub backend: Backend,

    /// Simulated device layout, used by the mock backend only
    pub mock: MockConfig,
}

/// Device layout of the mock backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Number of cards, numbered from 0
    pub cards: u32,

    /// Number of devices on every card
    pub devices_per_card: u32,
}

impl AdapterConfig {
    /// Create a new adapter configuration
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            mock: MockConfig::default(),
        }
    }

    /// Set the simulated device layout
    pub fn with_mock_layout(mut self, cards: u32, devices_per_card: u32) -> Self {
        self.mock = MockConfig {
            cards,
            devices_per_card,
        };
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == Backend::Mock {
            if self.mock.cards == 0 {
                return Err("Mock backend needs at least one card".to_string());
            }
            if self.mock.devices_per_card == 0 {
                return Err("Mock backend needs at least one device per card".to_string());
            }
        }
        Ok(())
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new(Backend::default())
    }
}

impl Default for Backend {
    /// DCMI when the crate links against it, simulated devices otherwise
    fn default() -> Self {
        if cfg!(feature = "dcmi") {
            Backend::Dcmi
        } else {
            Backend::Mock
        }
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            cards: 2,
            devices_per_card: 1,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Dcmi => write!(f, "dcmi"),
            Backend::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dcmi" => Ok(Backend::Dcmi),
            "mock" => Ok(Backend::Mock),
            _ => Err(format!("Unknown NPU backend: {}", s)),
        }
    }
}
