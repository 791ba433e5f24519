use crate::data::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single named reading, e.g. the RSSI of one access point or one magnetometer axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub key: String,
    pub value: f64,
    /// Kind of reference the key points at (`"rf_transmitter"`, `"magnetometer"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Reading {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Live measurement object exchanged with collaborators.
///
/// Calibration captures carry a position; queries leave it unset and get it filled in
/// by the estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub readings: Vec<Reading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl Measurement {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            position: None,
            readings: Vec::new(),
            timestamp: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_reading(mut self, key: impl Into<String>, value: f64) -> Self {
        self.readings.push(Reading::new(key, value));
        self
    }

    pub fn push_reading(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    pub fn has_readings(&self) -> bool {
        !self.readings.is_empty()
    }

    /// One value per key: non-finite readings are dropped, repeated keys are averaged.
    pub fn resolved_readings(&self) -> BTreeMap<&str, f64> {
        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for reading in self.readings.iter().filter(|r| r.value.is_finite()) {
            let slot = sums.entry(reading.key.as_str()).or_insert((0.0, 0));
            slot.0 += reading.value;
            slot.1 += 1;
        }
        sums.into_iter()
            .map(|(key, (sum, count))| (key, sum / count as f64))
            .collect()
    }
}
