/// Received power in dBm at `distance` metres under the log-distance path-loss model.
/// Distances below one metre are clamped to the reference distance.
pub fn log_distance_rssi(reference_power: f64, exponent: f64, distance: f64) -> f64 {
    reference_power - 10.0 * exponent * distance.max(1.0).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_drops_by_ten_n_per_decade() {
        assert_eq!(log_distance_rssi(-40.0, 2.0, 1.0), -40.0);
        assert!((log_distance_rssi(-40.0, 2.0, 10.0) + 60.0).abs() < 1e-9);
        assert_eq!(log_distance_rssi(-40.0, 2.0, 0.2), -40.0);
    }
}
