use ndarray::{Array1, ArrayView1, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Weighted mean of the rows of `rows`: `Σ wᵢ·rowᵢ / Σ wᵢ`.
    ///
    /// Returns `None` when the weights do not sum to a positive finite value.
    pub fn weighted_centroid(rows: ArrayView2<f64>, weights: ArrayView1<f64>) -> Option<Array1<f64>> {
        let total = weights.sum();
        if !total.is_finite() || total <= 0.0 || rows.nrows() != weights.len() {
            return None;
        }
        Some(weights.dot(&rows) / total)
    }
}
