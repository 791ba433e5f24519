use crate::data::{Fingerprint, Measurement, Position};
use crate::math::{DistanceMetric, MatrixHelper, WeightFunction};
use crate::prelude::{
    FingerprintEngine, FingerprintError, FingerprintResult, FingerprintingConfig, DEFAULT_EPSILON,
};
use crate::processing::aggregation::{CacheBuilder, CacheGeneration};
use ndarray::{Array1, Array2};
use uuid::Uuid;

/// One calibration entry that contributed to an estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub fingerprint: Uuid,
    pub position: Position,
    /// Matching distance after zero-distance substitution.
    pub distance: f64,
    /// Share of this neighbour in the combined coordinate.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub position: Position,
    /// Ranked nearest first.
    pub neighbours: Vec<Neighbour>,
}

/// k-nearest-neighbour position estimator over one cache generation.
#[derive(Debug, Clone, Copy)]
pub struct KnnEstimator {
    pub k: usize,
    pub weighted: bool,
    pub naive: bool,
    pub distance: DistanceMetric,
    pub weight: WeightFunction,
    pub epsilon: f64,
    pub default_value: f64,
}

impl Default for KnnEstimator {
    fn default() -> Self {
        Self {
            k: 1,
            weighted: false,
            naive: false,
            distance: DistanceMetric::default(),
            weight: WeightFunction::default(),
            epsilon: DEFAULT_EPSILON,
            default_value: 0.0,
        }
    }
}

impl KnnEstimator {
    pub fn from_config(config: &FingerprintingConfig) -> Self {
        Self {
            k: config.k,
            weighted: config.weighted,
            naive: config.naive,
            distance: config.distance,
            weight: config.weight,
            epsilon: config.epsilon,
            default_value: config.default_value,
        }
    }

    /// Dense query vector in the generation's key order. Keys the measurement did not
    /// observe take the default value; keys the cache does not know are dropped.
    ///
    /// `None` when no usable reading overlaps the cache's key set.
    pub fn query_vector(
        &self,
        measurement: &Measurement,
        generation: &CacheGeneration,
    ) -> Option<Vec<f64>> {
        let readings = measurement.resolved_readings();
        let references = generation.cached_references();
        let overlapping = readings
            .keys()
            .filter(|key| references.contains(**key))
            .count();
        if overlapping == 0 {
            return None;
        }
        Some(
            references
                .iter()
                .map(|key| {
                    readings
                        .get(key.as_str())
                        .copied()
                        .unwrap_or(self.default_value)
                })
                .collect(),
        )
    }

    pub fn estimate(
        &self,
        measurement: &Measurement,
        generation: &CacheGeneration,
    ) -> FingerprintResult<Option<Estimate>> {
        if self.k == 0 {
            return Err(FingerprintError::InvalidConfig(
                "k must be at least 1".into(),
            ));
        }
        if generation.is_empty() {
            return Ok(None);
        }
        let Some(query) = self.query_vector(measurement, generation) else {
            return Ok(None);
        };

        let matches = self.matches(&query, generation)?;
        if matches.is_empty() {
            return Ok(None);
        }
        self.combine(&matches, generation.fingerprints()).map(Some)
    }

    /// Indices into the generation plus distances, nearest first, at most `k` long.
    fn matches(
        &self,
        query: &[f64],
        generation: &CacheGeneration,
    ) -> FingerprintResult<Vec<(usize, f64)>> {
        let index = generation
            .index()
            .filter(|index| !self.naive && index.metric() == self.distance);
        let mut matches: Vec<(usize, f64)> = match index {
            Some(index) => {
                ensure_dimension(index.dimension(), query.len())?;
                index
                    .nearest(query, self.k)
                    .into_iter()
                    .map(|(&slot, distance)| (slot, distance))
                    .collect()
            }
            None => {
                let mut scored = Vec::with_capacity(generation.len());
                for (slot, fingerprint) in generation.fingerprints().iter().enumerate() {
                    ensure_dimension(fingerprint.vector().len(), query.len())?;
                    scored.push((slot, self.distance.distance(query, fingerprint.vector())));
                }
                scored.sort_by(|a, b| a.1.total_cmp(&b.1));
                scored.truncate(self.k);
                scored
            }
        };

        for (_, distance) in &mut matches {
            if *distance == 0.0 {
                *distance = self.epsilon;
            }
        }
        Ok(matches)
    }

    fn combine(
        &self,
        matches: &[(usize, f64)],
        fingerprints: &[Fingerprint],
    ) -> FingerprintResult<Estimate> {
        let count = matches.len();
        let coordinates = Array2::from_shape_fn((count, 3), |(row, axis)| {
            fingerprints[matches[row].0].position.coordinates()[axis]
        });
        let weights: Array1<f64> = if self.weighted {
            matches
                .iter()
                .map(|&(_, distance)| self.weight.weight(distance))
                .collect()
        } else {
            Array1::from_elem(count, 1.0 / count as f64)
        };

        let centroid = MatrixHelper::weighted_centroid(coordinates.view(), weights.view())
            .ok_or_else(|| {
                FingerprintError::InvalidInput(
                    "neighbour weights do not sum to a positive finite value".into(),
                )
            })?;
        let total: f64 = weights.sum();

        let nearest = &fingerprints[matches[0].0];
        let position = nearest
            .position
            .with_coordinates([centroid[0], centroid[1], centroid[2]]);
        let neighbours = matches
            .iter()
            .zip(weights.iter())
            .map(|(&(slot, distance), &weight)| Neighbour {
                fingerprint: fingerprints[slot].uid,
                position: fingerprints[slot].position.clone(),
                distance,
                weight: weight / total,
            })
            .collect();

        Ok(Estimate {
            position,
            neighbours,
        })
    }
}

fn ensure_dimension(expected: usize, actual: usize) -> FingerprintResult<()> {
    if expected != actual {
        return Err(FingerprintError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Default engine: grouping/averaging cache builder plus KNN estimation. Non-naive
/// configurations get a k-d tree attached to every generation.
#[derive(Debug, Clone, Copy)]
pub struct KnnEngine {
    builder: CacheBuilder,
    estimator: KnnEstimator,
}

impl KnnEngine {
    pub fn new(builder: CacheBuilder, estimator: KnnEstimator) -> Self {
        Self { builder, estimator }
    }

    pub fn from_config(config: &FingerprintingConfig) -> Self {
        Self::new(
            CacheBuilder::from_config(config),
            KnnEstimator::from_config(config),
        )
    }

    pub fn estimator(&self) -> &KnnEstimator {
        &self.estimator
    }
}

impl FingerprintEngine for KnnEngine {
    fn rebuild(&self, raw: &[Fingerprint], epoch: u64) -> FingerprintResult<CacheGeneration> {
        let generation = self.builder.rebuild(raw, epoch);
        if self.estimator.naive {
            Ok(generation)
        } else {
            generation.with_index(self.estimator.distance)
        }
    }

    fn estimate(
        &self,
        measurement: &Measurement,
        generation: &CacheGeneration,
    ) -> FingerprintResult<Option<Estimate>> {
        self.estimator.estimate(measurement, generation)
    }
}
