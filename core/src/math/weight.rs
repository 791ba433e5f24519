use serde::{Deserialize, Serialize};

/// Weight strategy applied to neighbour distances during weighted combination.
///
/// Both shipped strategies diverge at zero; the estimator replaces a zero distance with
/// its configured epsilon before calling `weight`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFunction {
    /// `1 / d`
    #[default]
    #[serde(alias = "default")]
    Inverse,
    /// `1 / d²`
    #[serde(alias = "square")]
    InverseSquare,
    #[serde(skip)]
    Custom(fn(f64) -> f64),
}

impl WeightFunction {
    pub fn weight(&self, distance: f64) -> f64 {
        match self {
            WeightFunction::Inverse => 1.0 / distance,
            WeightFunction::InverseSquare => 1.0 / distance.powi(2),
            WeightFunction::Custom(weight) => weight(distance),
        }
    }
}
