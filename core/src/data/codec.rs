use crate::data::fingerprint::Fingerprint;
use crate::data::position::Position;
use crate::prelude::{FingerprintError, FingerprintResult};
use crate::processing::CacheGeneration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Portable schema of a fingerprint: the feature keys in order and one sample list per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub uid: Uuid,
    pub classifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<f64>,
    pub position: Position,
    pub keys: Vec<String>,
    pub samples: Vec<Vec<f64>>,
    /// Exported for consumers of a generation; decoding ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f64>>,
}

impl From<&Fingerprint> for FingerprintRecord {
    fn from(fingerprint: &Fingerprint) -> Self {
        let (keys, samples): (Vec<String>, Vec<Vec<f64>>) = fingerprint
            .features()
            .map(|(key, samples)| (key.to_owned(), samples.to_vec()))
            .unzip();
        Self {
            uid: fingerprint.uid,
            classifier: fingerprint.classifier.clone(),
            source: fingerprint.source.clone(),
            created_at: fingerprint.created_at,
            position: fingerprint.position.clone(),
            keys,
            samples,
            vector: fingerprint
                .is_processed()
                .then(|| fingerprint.vector().to_vec()),
        }
    }
}

impl TryFrom<FingerprintRecord> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(record: FingerprintRecord) -> FingerprintResult<Self> {
        if record.keys.len() != record.samples.len() {
            return Err(FingerprintError::InvalidInput(format!(
                "{} feature keys but {} sample lists",
                record.keys.len(),
                record.samples.len()
            )));
        }

        let mut seen = HashSet::with_capacity(record.keys.len());
        let mut fingerprint = Fingerprint::with_uid(record.uid, record.classifier, record.position);
        fingerprint.source = record.source;
        fingerprint.created_at = record.created_at;
        for (key, samples) in record.keys.iter().zip(&record.samples) {
            if !seen.insert(key.as_str()) {
                return Err(FingerprintError::InvalidInput(format!(
                    "duplicate feature key {}",
                    key
                )));
            }
            fingerprint.extend_feature(key, samples);
        }
        Ok(fingerprint)
    }
}

/// Snapshot export of one cache generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub epoch: u64,
    pub keys: Vec<String>,
    pub entries: Vec<FingerprintRecord>,
}

impl From<&CacheGeneration> for GenerationRecord {
    fn from(generation: &CacheGeneration) -> Self {
        Self {
            epoch: generation.epoch(),
            keys: generation.cached_references().iter().cloned().collect(),
            entries: generation
                .fingerprints()
                .iter()
                .map(FingerprintRecord::from)
                .collect(),
        }
    }
}

pub fn encode_fingerprint(fingerprint: &Fingerprint) -> FingerprintResult<String> {
    Ok(serde_json::to_string(&FingerprintRecord::from(fingerprint))?)
}

pub fn decode_fingerprint(encoded: &str) -> FingerprintResult<Fingerprint> {
    let record: FingerprintRecord = serde_json::from_str(encoded)?;
    Fingerprint::try_from(record)
}

pub fn encode_generation(generation: &CacheGeneration) -> FingerprintResult<String> {
    Ok(serde_json::to_string(&GenerationRecord::from(generation))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{Aggregation, CacheBuilder, GroupBy};

    #[test]
    fn decoded_fingerprint_keeps_keys_and_samples() {
        let mut fingerprint = Fingerprint::new("geo", Position::new_2d(1.0, 1.0))
            .with_source("phone")
            .with_created_at(12.5);
        fingerprint.add_feature("MAG_Y", 2.0);
        fingerprint.add_feature("MAG_X", 1.0);
        fingerprint.add_feature("MAG_X", 3.0);

        let decoded = decode_fingerprint(&encode_fingerprint(&fingerprint).unwrap()).unwrap();
        assert_eq!(decoded.uid, fingerprint.uid);
        assert_eq!(decoded.source.as_deref(), Some("phone"));
        assert_eq!(decoded.feature("MAG_X"), Some(&[1.0, 3.0][..]));
        assert_eq!(decoded.keys().collect::<Vec<_>>(), vec!["MAG_X", "MAG_Y"]);
        assert!(!decoded.is_processed());
    }

    #[test]
    fn mismatched_sample_lists_are_rejected() {
        let encoded = r#"{"uid":"67e55044-10b1-426f-9247-bb680e5fe0c8","classifier":"wlan",
            "position":{"x":0.0,"y":0.0},"keys":["AP_1","AP_2"],"samples":[[-60.0]]}"#;
        assert!(matches!(
            decode_fingerprint(encoded),
            Err(FingerprintError::InvalidInput(_))
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let encoded = r#"{"uid":"67e55044-10b1-426f-9247-bb680e5fe0c8","classifier":"wlan",
            "position":{"x":0.0,"y":0.0},"keys":["AP_1","AP_1"],"samples":[[-60.0],[-61.0]]}"#;
        assert!(decode_fingerprint(encoded).is_err());
    }

    #[test]
    fn malformed_json_surfaces_codec_error() {
        assert!(matches!(
            decode_fingerprint("{not json"),
            Err(FingerprintError::Codec(_))
        ));
    }

    #[test]
    fn generation_export_lists_vectors() {
        let mut fingerprint = Fingerprint::new("wlan", Position::new_2d(0.0, 0.0));
        fingerprint.add_feature("X", 1.0);
        fingerprint.add_feature("X", 3.0);
        let builder = CacheBuilder::new(GroupBy::default(), Aggregation::Mean, 0.0);
        let generation = builder.rebuild(&[fingerprint], 4);

        let record: GenerationRecord =
            serde_json::from_str(&encode_generation(&generation).unwrap()).unwrap();
        assert_eq!(record.epoch, 4);
        assert_eq!(record.keys, vec!["X".to_string()]);
        assert_eq!(record.entries[0].vector, Some(vec![2.0]));
    }
}
