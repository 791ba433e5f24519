use crate::data::position::Position;
use std::collections::BTreeMap;
use uuid::Uuid;

/// One calibration record: a position paired with the raw samples recorded per feature key.
///
/// Feature keys are kept in a `BTreeMap`, so iteration and the derived vector follow
/// lexicographic key order. Only finite samples are ever stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub uid: Uuid,
    pub classifier: String,
    /// Uid of the object (user, device) that captured the data.
    pub source: Option<String>,
    pub created_at: Option<f64>,
    pub position: Position,
    features: BTreeMap<String, Vec<f64>>,
    vector: Vec<f64>,
    processed: bool,
}

impl Fingerprint {
    pub fn new(classifier: impl Into<String>, position: Position) -> Self {
        Self::with_uid(Uuid::new_v4(), classifier, position)
    }

    pub fn with_uid(uid: Uuid, classifier: impl Into<String>, position: Position) -> Self {
        Self {
            uid,
            classifier: classifier.into(),
            source: None,
            created_at: None,
            position,
            features: BTreeMap::new(),
            vector: Vec::new(),
            processed: false,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_created_at(mut self, timestamp: f64) -> Self {
        self.created_at = Some(timestamp);
        self
    }

    /// Appends one sample for `key`. Non-finite values are rejected and leave the
    /// fingerprint untouched; returns whether the sample was stored.
    pub fn add_feature(&mut self, key: impl Into<String>, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.features.entry(key.into()).or_default().push(value);
        self.processed = false;
        true
    }

    /// Concatenates every finite sample of `samples` onto the list for `key`.
    pub fn extend_feature(&mut self, key: &str, samples: &[f64]) {
        let usable: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if usable.is_empty() {
            return;
        }
        match self.features.get_mut(key) {
            Some(existing) => existing.extend(usable),
            None => {
                self.features.insert(key.to_owned(), usable);
            }
        }
        self.processed = false;
    }

    /// Gap filling: a single synthetic sample for a key this capture never observed.
    pub(crate) fn fill_missing(&mut self, key: &str, value: f64) {
        if !self.features.contains_key(key) {
            self.features.insert(key.to_owned(), vec![value]);
            self.processed = false;
        }
    }

    pub fn has_feature(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    pub fn feature(&self, key: &str) -> Option<&[f64]> {
        self.features.get(key).map(Vec::as_slice)
    }

    pub fn features(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.features
            .iter()
            .map(|(key, samples)| (key.as_str(), samples.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn has_usable_samples(&self) -> bool {
        self.features.values().any(|samples| !samples.is_empty())
    }

    /// Derives the dense vector: one aggregated scalar per key, in key order.
    pub fn compute_vector<F>(&mut self, aggregate: F)
    where
        F: Fn(&[f64], &str) -> f64,
    {
        self.vector = self
            .features
            .iter()
            .map(|(key, samples)| aggregate(samples, key))
            .collect();
        self.processed = true;
    }

    /// Dense vector from the last `compute_vector`; stale when `is_processed` is false.
    pub fn vector(&self) -> &[f64] {
        &self.vector
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }
}
