use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Distance strategy between two dense feature vectors of equal length.
///
/// The k-d tree bounds a subtree by the metric distance to the query's projection onto the
/// splitting plane, so indexed matching is exact for any metric that does not shrink when
/// a single per-axis difference grows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    Chebyshev,
    #[serde(skip)]
    Custom(fn(&[f64], &[f64]) -> f64),
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.between(ArrayView1::from(a), ArrayView1::from(b))
    }

    pub fn between(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let deltas = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match self {
            DistanceMetric::Euclidean => deltas.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => deltas.sum(),
            DistanceMetric::Chebyshev => deltas.fold(0.0, f64::max),
            DistanceMetric::Custom(metric) => match (a.as_slice(), b.as_slice()) {
                (Some(a), Some(b)) => metric(a, b),
                _ => metric(&a.to_vec(), &b.to_vec()),
            },
        }
    }
}

impl PartialEq for DistanceMetric {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DistanceMetric::Custom(a), DistanceMetric::Custom(b)) => *a as usize == *b as usize,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_is_symmetric_norm_of_difference() {
        let metric = DistanceMetric::Euclidean;
        assert_eq!(metric.distance(&[1.0, 1.0], &[1.0, 9.0]), 8.0);
        assert_eq!(metric.distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(metric.distance(&[3.0, 4.0], &[0.0, 0.0]), 5.0);
        assert_eq!(metric.distance(&[2.0, 2.0], &[2.0, 2.0]), 0.0);
    }

    #[test]
    fn manhattan_and_chebyshev() {
        assert_eq!(DistanceMetric::Manhattan.distance(&[0.0, 0.0], &[3.0, -4.0]), 7.0);
        assert_eq!(DistanceMetric::Chebyshev.distance(&[0.0, 0.0], &[3.0, -4.0]), 4.0);
    }

    #[test]
    fn custom_metric_receives_both_vectors() {
        fn squared(a: &[f64], b: &[f64]) -> f64 {
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
        }
        let metric = DistanceMetric::Custom(squared);
        assert_eq!(metric.distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }

    #[test]
    fn metrics_compare_by_strategy() {
        fn squared(a: &[f64], b: &[f64]) -> f64 {
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
        }
        assert_eq!(DistanceMetric::Euclidean, DistanceMetric::default());
        assert_ne!(DistanceMetric::Euclidean, DistanceMetric::Manhattan);
        let custom = DistanceMetric::Custom(squared);
        assert_eq!(custom, custom);
        assert_ne!(custom, DistanceMetric::Chebyshev);
    }

    #[test]
    fn metric_names_parse_from_config() {
        let metric: DistanceMetric = serde_json::from_str("\"manhattan\"").unwrap();
        assert!(matches!(metric, DistanceMetric::Manhattan));
    }
}
