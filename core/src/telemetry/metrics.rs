use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

/// Counters accumulated by one fingerprinting service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rebuilds: usize,
    pub calibrations: usize,
    pub estimates: usize,
    pub unresolved: usize,
    pub errors: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_rebuild(&self) {
        self.update(|metrics| metrics.rebuilds += 1);
    }

    pub fn record_calibration(&self) {
        self.update(|metrics| metrics.calibrations += 1);
    }

    pub fn record_estimate(&self, resolved: bool) {
        self.update(|metrics| {
            metrics.estimates += 1;
            if !resolved {
                metrics.unresolved += 1;
            }
        });
    }

    pub fn record_error(&self) {
        self.update(|metrics| metrics.errors += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRecorder::new();
        metrics.record_rebuild();
        metrics.record_estimate(true);
        metrics.record_estimate(false);
        metrics.record_calibration();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rebuilds, 1);
        assert_eq!(snapshot.estimates, 2);
        assert_eq!(snapshot.unresolved, 1);
        assert_eq!(snapshot.calibrations, 1);
        assert_eq!(snapshot.errors, 0);
    }
}
