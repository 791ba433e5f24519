use crate::workflow::runner::{EstimationRecord, WorkflowResult};
use fpcore::data::Position;
use serde::{Deserialize, Serialize};

/// Most recent notes kept for `/payload`.
const NOTE_CAPACITY: usize = 50;

/// Snapshot served on `/payload` for the visualizer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisualizationModel {
    pub epoch: u64,
    pub calibration_points: Vec<Position>,
    pub estimates: Vec<EstimationRecord>,
    pub fingerprint_count: usize,
    pub key_count: usize,
    pub mean_error: Option<f64>,
    pub max_error: Option<f64>,
    pub notes: Vec<String>,
    pub scenario_metadata: Option<String>,
}

impl VisualizationModel {
    pub fn from_result(result: &WorkflowResult, scenario: Option<String>) -> Self {
        let mut notes = vec![format!(
            "{} of {} probes resolved",
            result.resolved_count(),
            result.estimates.len()
        )];
        if let Some(rms) = result.rms_error {
            notes.push(format!("rms error {:.2} m", rms));
        }
        Self {
            epoch: result.epoch,
            calibration_points: result.calibration_points.clone(),
            estimates: result.estimates.clone(),
            fingerprint_count: result.fingerprint_count,
            key_count: result.key_count,
            mean_error: result.mean_error,
            max_error: result.max_error,
            notes,
            scenario_metadata: scenario,
        }
    }

    /// Appends a live estimate produced through `/ingest`.
    pub fn record_live(&mut self, uid: &str, position: &Position) {
        self.notes.push(format!(
            "live {} -> ({:.2}, {:.2})",
            uid, position.x, position.y
        ));
        if self.notes.len() > NOTE_CAPACITY {
            let excess = self.notes.len() - NOTE_CAPACITY;
            self.notes.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_notes_keep_only_the_latest_entries() {
        let mut model = VisualizationModel::default();
        for index in 0..120 {
            model.record_live(&format!("phone-{}", index), &Position::new_2d(1.0, 2.0));
        }
        assert_eq!(model.notes.len(), NOTE_CAPACITY);
        assert_eq!(model.notes[0], "live phone-70 -> (1.00, 2.00)");
        assert_eq!(
            model.notes.last().map(String::as_str),
            Some("live phone-119 -> (1.00, 2.00)")
        );
    }
}
