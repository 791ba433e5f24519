use crate::data::{Fingerprint, Measurement};
use crate::math::{DistanceMetric, WeightFunction};
use crate::processing::{Aggregation, CacheGeneration, Estimate, GroupBy};
use serde::{Deserialize, Serialize};

/// Substitute used for a zero query-to-candidate distance before weighting.
pub const DEFAULT_EPSILON: f64 = 1e-5;

/// Shared configuration for one fingerprinting service and its estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintingConfig {
    /// Calibration set this service owns; never mixed with other classifiers.
    pub classifier: String,
    /// Value injected for feature keys a capture or a query did not observe.
    pub default_value: f64,
    pub k: usize,
    pub weighted: bool,
    /// Brute-force matching instead of the k-d tree.
    pub naive: bool,
    pub distance: DistanceMetric,
    pub weight: WeightFunction,
    pub epsilon: f64,
    /// Rebuild the cache after every inserted fingerprint.
    pub auto_update: bool,
    /// A locked service never stores captures, it only estimates.
    pub locked: bool,
    pub group_by: GroupBy,
    pub aggregation: Aggregation,
}

impl Default for FingerprintingConfig {
    fn default() -> Self {
        Self {
            classifier: String::new(),
            default_value: 0.0,
            k: 1,
            weighted: false,
            naive: false,
            distance: DistanceMetric::default(),
            weight: WeightFunction::default(),
            epsilon: DEFAULT_EPSILON,
            auto_update: false,
            locked: true,
            group_by: GroupBy::default(),
            aggregation: Aggregation::default(),
        }
    }
}

impl FingerprintingConfig {
    pub fn with_classifier(classifier: impl Into<String>) -> Self {
        Self {
            classifier: classifier.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> FingerprintResult<()> {
        if self.k == 0 {
            return Err(FingerprintError::InvalidConfig(
                "k must be at least 1".into(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(FingerprintError::InvalidConfig(format!(
                "epsilon must be a positive finite value, got {}",
                self.epsilon
            )));
        }
        if !self.default_value.is_finite() {
            return Err(FingerprintError::InvalidConfig(
                "default value must be finite".into(),
            ));
        }
        if let GroupBy::Grid { cell, .. } = self.group_by {
            if !cell.is_finite() || cell <= 0.0 {
                return Err(FingerprintError::InvalidConfig(format!(
                    "grid cell must be a positive finite size, got {}",
                    cell
                )));
            }
        }
        Ok(())
    }
}

/// Common error type for the fingerprinting core.
#[derive(thiserror::Error, Debug)]
pub enum FingerprintError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("store failure: {0}")]
    Store(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type FingerprintResult<T> = Result<T, FingerprintError>;

/// Capability surface of a fingerprinting engine: turn the raw calibration set into a
/// cache generation, and resolve live measurements against a generation.
pub trait FingerprintEngine: Send + Sync {
    fn rebuild(&self, raw: &[Fingerprint], epoch: u64) -> FingerprintResult<CacheGeneration>;

    /// `Ok(None)` means the measurement could not be resolved against `generation`.
    fn estimate(
        &self,
        measurement: &Measurement,
        generation: &CacheGeneration,
    ) -> FingerprintResult<Option<Estimate>>;
}
