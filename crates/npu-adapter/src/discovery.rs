//! NPU discovery and label caching

use crate::query::DeviceQuery;
use crate::{AdapterError, Result};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Identity of one accelerator device within a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub card_id: i32,
    pub device_id: i32,
}

impl DeviceIdentity {
    pub fn new(card_id: i32, device_id: i32) -> Self {
        Self { card_id, device_id }
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "card={} dev={}", self.card_id, self.device_id)
    }
}

/// Discovers the device set once and serves the cached identities afterwards
///
/// The cache is populated only by a successful discovery and never changes
/// after that.
pub struct LabelCatalog {
    query: Arc<dyn DeviceQuery>,
    labels: OnceLock<Vec<DeviceIdentity>>,
}

impl LabelCatalog {
    pub fn new(query: Arc<dyn DeviceQuery>) -> Self {
        Self {
            query,
            labels: OnceLock::new(),
        }
    }

    /// Enumerate cards and their devices on the first call, return the cache on later calls.
    ///
    /// A failed card enumeration or an empty device set is an error and leaves
    /// the cache empty. A card whose device list cannot be read is skipped.
    pub fn discover(&self) -> Result<&[DeviceIdentity]> {
        if let Some(labels) = self.labels.get() {
            debug!("Returning {} cached device labels", labels.len());
            return Ok(labels.as_slice());
        }

        let discovered = self.enumerate()?;
        Ok(self.labels.get_or_init(|| discovered).as_slice())
    }

    /// Cached identities, or [`AdapterError::NotReady`] before discovery
    pub fn labels(&self) -> Result<&[DeviceIdentity]> {
        self.labels
            .get()
            .map(Vec::as_slice)
            .ok_or(AdapterError::NotReady)
    }

    pub fn is_discovered(&self) -> bool {
        self.labels.get().is_some()
    }

    fn enumerate(&self) -> Result<Vec<DeviceIdentity>> {
        let cards = self
            .query
            .card_list()
            .map_err(AdapterError::CardEnumeration)?;
        info!("Found {} NPU card(s): {:?}", cards.len(), cards);

        let mut labels = Vec::new();
        let mut seen_cards = Vec::with_capacity(cards.len());

        for card_id in cards {
            if seen_cards.contains(&card_id) {
                warn!("Card {} listed twice, ignoring duplicate", card_id);
                continue;
            }
            seen_cards.push(card_id);

            match self.query.device_count(card_id) {
                Ok(count) if count >= 0 => {
                    debug!("Card {} has {} device(s)", card_id, count);
                    labels.extend((0..count).map(|device_id| DeviceIdentity::new(card_id, device_id)));
                }
                Ok(count) => {
                    warn!("Skipping card {}: library reported {} devices", card_id, count);
                }
                Err(e) => {
                    warn!("Skipping card {}: device enumeration failed: {}", card_id, e);
                }
            }
        }

        if labels.is_empty() {
            return Err(AdapterError::NoDevices);
        }

        info!("Discovered {} NPU device(s)", labels.len());
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDeviceQuery;

    fn catalog_for(mock: MockDeviceQuery) -> (Arc<MockDeviceQuery>, LabelCatalog) {
        let mock = Arc::new(mock);
        let catalog = LabelCatalog::new(mock.clone());
        (mock, catalog)
    }

    #[test]
    fn test_discover_is_idempotent() {
        let (mock, catalog) = catalog_for(MockDeviceQuery::with_cards(&[(0, 2), (1, 1)]));

        let first = catalog.discover().unwrap().to_vec();
        let second = catalog.discover().unwrap().to_vec();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                DeviceIdentity::new(0, 0),
                DeviceIdentity::new(0, 1),
                DeviceIdentity::new(1, 0),
            ]
        );
        assert_eq!(mock.card_list_calls(), 1);
        assert_eq!(mock.device_count_calls(), 2);
    }

    #[test]
    fn test_labels_before_discovery() {
        let (_, catalog) = catalog_for(MockDeviceQuery::with_cards(&[(0, 1)]));

        assert!(!catalog.is_discovered());
        assert!(matches!(catalog.labels(), Err(AdapterError::NotReady)));

        catalog.discover().unwrap();
        assert!(catalog.is_discovered());
        assert_eq!(catalog.labels().unwrap(), &[DeviceIdentity::new(0, 0)]);
    }

    #[test]
    fn test_card_enumeration_failure_is_fatal() {
        let (_, catalog) =
            catalog_for(MockDeviceQuery::with_cards(&[(0, 1)]).with_card_list_failure(-8005));

        let result = catalog.discover();
        assert!(matches!(result, Err(AdapterError::CardEnumeration(e)) if e.code == -8005));
        assert!(!catalog.is_discovered());
    }

    #[test]
    fn test_failed_card_is_skipped() {
        let (_, catalog) = catalog_for(
            MockDeviceQuery::with_cards(&[(0, 1), (1, 1), (2, 1)]).with_card_failure(1, -8007),
        );

        let labels = catalog.discover().unwrap();
        assert_eq!(labels, &[DeviceIdentity::new(0, 0), DeviceIdentity::new(2, 0)]);
    }

    #[test]
    fn test_no_devices_is_an_error() {
        let (_, catalog) = catalog_for(MockDeviceQuery::with_cards(&[(0, 0), (1, 0)]));
        assert!(matches!(catalog.discover(), Err(AdapterError::NoDevices)));
        assert!(!catalog.is_discovered());

        let (_, catalog) = catalog_for(MockDeviceQuery::with_cards(&[]));
        assert!(matches!(catalog.discover(), Err(AdapterError::NoDevices)));
    }

    #[test]
    fn test_every_card_failing_is_no_devices() {
        let (_, catalog) = catalog_for(
            MockDeviceQuery::with_cards(&[(0, 1), (1, 1)])
                .with_card_failure(0, -8007)
                .with_card_failure(1, -8007),
        );
        assert!(matches!(catalog.discover(), Err(AdapterError::NoDevices)));
    }

    #[test]
    fn test_duplicate_cards_ignored() {
        let (mock, catalog) = catalog_for(MockDeviceQuery::with_cards(&[(3, 1), (3, 1)]));
        assert_eq!(catalog.discover().unwrap(), &[DeviceIdentity::new(3, 0)]);
        assert_eq!(mock.device_count_calls(), 1);
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(DeviceIdentity::new(1, 0).to_string(), "card=1 dev=0");
    }
}
