use crate::data::Fingerprint;
use crate::prelude::{FingerprintError, FingerprintResult};
use std::sync::RwLock;

/// Port to whatever persists raw calibration fingerprints.
pub trait FingerprintStore: Send + Sync {
    /// Every raw fingerprint of `classifier`, in insertion order.
    fn fetch_all(&self, classifier: &str) -> FingerprintResult<Vec<Fingerprint>>;

    fn append(&self, fingerprint: Fingerprint) -> FingerprintResult<()>;

    fn count(&self, classifier: &str) -> FingerprintResult<usize> {
        Ok(self.fetch_all(classifier)?.len())
    }
}

/// In-process store shared by any number of classifiers.
#[derive(Default)]
pub struct MemoryFingerprintStore {
    records: RwLock<Vec<Fingerprint>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn fetch_all(&self, classifier: &str) -> FingerprintResult<Vec<Fingerprint>> {
        let records = self
            .records
            .read()
            .map_err(|_| FingerprintError::Store("fingerprint store lock poisoned".into()))?;
        Ok(records
            .iter()
            .filter(|fingerprint| fingerprint.classifier == classifier)
            .cloned()
            .collect())
    }

    fn append(&self, fingerprint: Fingerprint) -> FingerprintResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| FingerprintError::Store("fingerprint store lock poisoned".into()))?;
        records.push(fingerprint);
        Ok(())
    }

    fn count(&self, classifier: &str) -> FingerprintResult<usize> {
        let records = self
            .records
            .read()
            .map_err(|_| FingerprintError::Store("fingerprint store lock poisoned".into()))?;
        Ok(records
            .iter()
            .filter(|fingerprint| fingerprint.classifier == classifier)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Position;

    #[test]
    fn fetch_filters_by_classifier_in_insertion_order() {
        let store = MemoryFingerprintStore::new();
        let first = Fingerprint::new("wlan", Position::new_2d(0.0, 0.0));
        let second = Fingerprint::new("geo", Position::new_2d(1.0, 0.0));
        let third = Fingerprint::new("wlan", Position::new_2d(2.0, 0.0));
        store.append(first.clone()).unwrap();
        store.append(second).unwrap();
        store.append(third.clone()).unwrap();

        let wlan = store.fetch_all("wlan").unwrap();
        assert_eq!(wlan.len(), 2);
        assert_eq!(wlan[0].uid, first.uid);
        assert_eq!(wlan[1].uid, third.uid);
        assert_eq!(store.count("geo").unwrap(), 1);
        assert_eq!(store.count("ble").unwrap(), 0);
    }
}
