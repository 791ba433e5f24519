pub mod aggregation;
pub mod grouping;
pub mod kdtree;
pub mod knn;

pub use aggregation::{Aggregation, CacheBuilder, CacheGeneration};
pub use grouping::{GroupBy, GroupKey};
pub use kdtree::KdTree;
pub use knn::{Estimate, KnnEngine, KnnEstimator, Neighbour};
