pub mod distance;
pub mod matrix;
pub mod stats;
pub mod weight;

pub use distance::DistanceMetric;
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
pub use weight::WeightFunction;
