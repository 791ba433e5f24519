use crate::data::Fingerprint;
use crate::math::{DistanceMetric, StatsHelper};
use crate::prelude::{FingerprintResult, FingerprintingConfig};
use crate::processing::grouping::{GroupBy, GroupKey};
use crate::processing::kdtree::KdTree;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Reduces the raw samples of one feature key to the scalar stored in the vector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
    Min,
    Max,
    /// Receives the key as well, so different sensor axes can be reduced differently.
    #[serde(skip)]
    Custom(fn(&[f64], &str) -> f64),
}

impl Aggregation {
    pub fn aggregate(&self, samples: &[f64], key: &str) -> f64 {
        match self {
            Aggregation::Mean => StatsHelper::mean(samples),
            Aggregation::Median => StatsHelper::median(samples),
            Aggregation::Min => StatsHelper::min(samples),
            Aggregation::Max => StatsHelper::max(samples),
            Aggregation::Custom(aggregate) => aggregate(samples, key),
        }
    }
}

/// Immutable snapshot produced by one aggregation pass.
///
/// Every entry shares the key universe in `cached_references`, so every vector has
/// `dimension()` elements. The optional index is built over exactly these vectors, with
/// the entry's position in `fingerprints()` as payload.
#[derive(Debug)]
pub struct CacheGeneration {
    epoch: u64,
    fingerprints: Vec<Fingerprint>,
    cached_references: BTreeSet<String>,
    index: Option<KdTree<usize>>,
}

impl CacheGeneration {
    pub fn empty(epoch: u64) -> Self {
        Self {
            epoch,
            fingerprints: Vec::new(),
            cached_references: BTreeSet::new(),
            index: None,
        }
    }

    /// Generation assembled from entries whose vectors are already computed, as a custom
    /// engine would produce it. No index is attached.
    pub fn new(
        epoch: u64,
        fingerprints: Vec<Fingerprint>,
        cached_references: BTreeSet<String>,
    ) -> Self {
        Self {
            epoch,
            fingerprints,
            cached_references,
            index: None,
        }
    }

    /// Builds the k-d tree over the entry vectors.
    pub fn with_index(mut self, metric: DistanceMetric) -> FingerprintResult<Self> {
        let points: Vec<(Vec<f64>, usize)> = self
            .fingerprints
            .iter()
            .enumerate()
            .map(|(slot, fingerprint)| (fingerprint.vector().to_vec(), slot))
            .collect();
        self.index = Some(KdTree::build(points, metric)?);
        Ok(self)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    pub fn cached_references(&self) -> &BTreeSet<String> {
        &self.cached_references
    }

    pub fn dimension(&self) -> usize {
        self.cached_references.len()
    }

    pub fn index(&self) -> Option<&KdTree<usize>> {
        self.index.as_ref()
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// Rebuilds a consistent set of dense vectors from the complete raw fingerprint set.
#[derive(Debug, Clone, Copy)]
pub struct CacheBuilder {
    group_by: GroupBy,
    aggregation: Aggregation,
    default_value: f64,
}

impl CacheBuilder {
    pub fn new(group_by: GroupBy, aggregation: Aggregation, default_value: f64) -> Self {
        Self {
            group_by,
            aggregation,
            default_value,
        }
    }

    pub fn from_config(config: &FingerprintingConfig) -> Self {
        Self::new(config.group_by, config.aggregation, config.default_value)
    }

    pub fn rebuild(&self, raw: &[Fingerprint], epoch: u64) -> CacheGeneration {
        let mut slots: HashMap<GroupKey, usize> = HashMap::new();
        let mut entries: Vec<Fingerprint> = Vec::new();

        for fingerprint in raw.iter().filter(|f| f.has_usable_samples()) {
            let group = self.group_by.key(&fingerprint.position);
            match slots.get(&group) {
                Some(&slot) => {
                    let existing = &mut entries[slot];
                    for (key, samples) in fingerprint.features() {
                        existing.extend_feature(key, samples);
                    }
                }
                None => {
                    slots.insert(group, entries.len());
                    entries.push(fingerprint.clone());
                }
            }
        }

        let cached_references: BTreeSet<String> = entries
            .iter()
            .flat_map(|entry| entry.keys().map(str::to_owned))
            .collect();

        let aggregation = self.aggregation;
        for entry in &mut entries {
            for key in &cached_references {
                entry.fill_missing(key, self.default_value);
            }
            entry.compute_vector(|samples, key| aggregation.aggregate(samples, key));
        }

        CacheGeneration::new(epoch, entries, cached_references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Position;

    fn capture(x: f64, y: f64, features: &[(&str, f64)]) -> Fingerprint {
        let mut fingerprint = Fingerprint::new("wlan", Position::new_2d(x, y));
        for (key, value) in features {
            fingerprint.add_feature(*key, *value);
        }
        fingerprint
    }

    fn builder() -> CacheBuilder {
        CacheBuilder::new(GroupBy::default(), Aggregation::Mean, -100.0)
    }

    #[test]
    fn single_capture_is_averaged() {
        let mut fingerprint = Fingerprint::new("wlan", Position::new_2d(0.0, 0.0));
        fingerprint.extend_feature("X", &[1.0, 2.0, 3.0]);
        let generation = builder().rebuild(&[fingerprint], 1);
        assert_eq!(generation.fingerprints()[0].vector(), &[2.0]);
    }

    #[test]
    fn empty_raw_set_gives_empty_generation() {
        let generation = builder().rebuild(&[], 3);
        assert!(generation.is_empty());
        assert_eq!(generation.dimension(), 0);
        assert_eq!(generation.epoch(), 3);
    }

    #[test]
    fn equal_group_keys_concatenate_samples() {
        let raw = vec![
            capture(1.0, 1.0, &[("AP_1", -60.0), ("AP_2", -70.0)]),
            capture(1.0, 1.0, &[("AP_1", -64.0), ("AP_3", -80.0)]),
        ];
        let generation = builder().rebuild(&raw, 1);
        assert_eq!(generation.len(), 1);

        let entry = &generation.fingerprints()[0];
        assert_eq!(entry.feature("AP_1"), Some(&[-60.0, -64.0][..]));
        assert_eq!(entry.feature("AP_2"), Some(&[-70.0][..]));
        assert_eq!(entry.feature("AP_3"), Some(&[-80.0][..]));
        assert_eq!(entry.uid, raw[0].uid);
        assert_eq!(entry.vector(), &[-62.0, -70.0, -80.0]);
    }

    #[test]
    fn missing_keys_receive_one_default_sample() {
        let raw = vec![
            capture(0.0, 0.0, &[("AP_1", -60.0)]),
            capture(5.0, 0.0, &[("AP_2", -50.0), ("AP_2", -52.0)]),
        ];
        let generation = builder().rebuild(&raw, 1);
        assert_eq!(generation.len(), 2);
        assert_eq!(generation.fingerprints()[0].feature("AP_2"), Some(&[-100.0][..]));
        assert_eq!(generation.fingerprints()[1].feature("AP_1"), Some(&[-100.0][..]));
        assert_eq!(generation.fingerprints()[1].vector(), &[-100.0, -51.0]);
    }

    #[test]
    fn every_vector_matches_the_key_universe() {
        let raw = vec![
            capture(0.0, 0.0, &[("A", 1.0)]),
            capture(1.0, 0.0, &[("B", 1.0), ("C", 2.0)]),
            capture(2.0, 0.0, &[("D", 1.0)]),
        ];
        let generation = builder().rebuild(&raw, 1);
        assert_eq!(generation.dimension(), 4);
        for entry in generation.fingerprints() {
            assert_eq!(entry.vector().len(), generation.dimension());
            assert!(entry.is_processed());
        }
    }

    #[test]
    fn captures_without_usable_samples_are_skipped() {
        let raw = vec![
            capture(0.0, 0.0, &[("AP_1", f64::NAN)]),
            capture(1.0, 0.0, &[("AP_2", -40.0)]),
        ];
        let generation = builder().rebuild(&raw, 1);
        assert_eq!(generation.len(), 1);
        assert_eq!(
            generation.cached_references().iter().collect::<Vec<_>>(),
            vec!["AP_2"]
        );
    }

    #[test]
    fn rebuild_is_deterministic() {
        let raw = vec![
            capture(2.0, 0.0, &[("b", 3.0), ("a", 1.0)]),
            capture(0.0, 0.0, &[("c", 2.0)]),
            capture(2.0, 0.0, &[("a", 5.0)]),
        ];
        let first = builder().rebuild(&raw, 1);
        let second = builder().rebuild(&raw, 1);
        let vectors = |g: &CacheGeneration| {
            g.fingerprints()
                .iter()
                .map(|f| (f.uid, f.vector().iter().map(|v| v.to_bits()).collect::<Vec<_>>()))
                .collect::<Vec<_>>()
        };
        assert_eq!(vectors(&first), vectors(&second));
        assert_eq!(first.fingerprints()[0].vector(), &[3.0, 3.0, -100.0]);
    }

    #[test]
    fn custom_aggregation_sees_the_key() {
        fn per_axis(samples: &[f64], key: &str) -> f64 {
            if key.starts_with("MAG_") {
                StatsHelper::max(samples)
            } else {
                StatsHelper::mean(samples)
            }
        }
        let raw = vec![capture(
            0.0,
            0.0,
            &[("MAG_X", 1.0), ("MAG_X", 5.0), ("AP_1", 1.0), ("AP_1", 5.0)],
        )];
        let builder = CacheBuilder::new(GroupBy::default(), Aggregation::Custom(per_axis), 0.0);
        let generation = builder.rebuild(&raw, 1);
        assert_eq!(generation.fingerprints()[0].vector(), &[3.0, 5.0]);
    }

    #[test]
    fn index_covers_every_entry() {
        let raw = vec![
            capture(0.0, 0.0, &[("A", 1.0), ("B", 1.0)]),
            capture(10.0, 0.0, &[("A", 1.0), ("B", 9.0)]),
        ];
        let generation = builder()
            .rebuild(&raw, 1)
            .with_index(DistanceMetric::Euclidean)
            .unwrap();
        let index = generation.index().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);
    }
}
