use crate::generator::profile::Survey;
use crate::workflow::config::WorkflowConfig;
use anyhow::{anyhow, Context};
use fpcore::data::{Measurement, Position};
use fpcore::math::StatsHelper;
use fpcore::service::{FingerprintService, MemoryFingerprintStore};
use fpcore::telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Outcome of estimating one held-out probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationRecord {
    pub probe: String,
    pub truth: Position,
    pub estimate: Option<Position>,
    pub error: Option<f64>,
    pub neighbours: usize,
}

pub struct WorkflowResult {
    pub epoch: u64,
    pub stored_captures: usize,
    pub fingerprint_count: usize,
    pub key_count: usize,
    pub calibration_points: Vec<Position>,
    pub estimates: Vec<EstimationRecord>,
    pub mean_error: Option<f64>,
    pub rms_error: Option<f64>,
    pub max_error: Option<f64>,
    pub metrics: MetricsSnapshot,
}

impl WorkflowResult {
    pub fn resolved_count(&self) -> usize {
        self.estimates
            .iter()
            .filter(|record| record.estimate.is_some())
            .count()
    }
}

/// Drives survey runs; the service of the latest run stays live for ingestion.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    live: Arc<RwLock<Arc<FingerprintService>>>,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> anyhow::Result<Self> {
        let service = Self::fresh_service(&config)?;
        Ok(Self {
            config,
            live: Arc::new(RwLock::new(service)),
        })
    }

    fn fresh_service(config: &WorkflowConfig) -> anyhow::Result<Arc<FingerprintService>> {
        let service = FingerprintService::new(
            Arc::new(MemoryFingerprintStore::new()),
            config.to_fingerprinting_config(),
        )
        .context("creating fingerprinting service")?;
        Ok(Arc::new(service))
    }

    pub fn service(&self) -> anyhow::Result<Arc<FingerprintService>> {
        let guard = self
            .live
            .read()
            .map_err(|_| anyhow!("live service lock poisoned"))?;
        Ok(Arc::clone(&guard))
    }

    /// Calibrates a fresh service with the survey, rebuilds once and estimates every probe.
    pub async fn execute(&self, survey: &Survey) -> anyhow::Result<WorkflowResult> {
        let service = Self::fresh_service(&self.config)?;

        let mut stored_captures = 0;
        for measurement in &survey.calibration {
            let stored = service
                .calibrate(measurement)
                .await
                .with_context(|| format!("calibrating with {}", measurement.uid))?;
            if stored.is_some() {
                stored_captures += 1;
            }
        }

        let generation = service.update().await.context("rebuilding fingerprint cache")?;

        let mut estimates = Vec::with_capacity(survey.probes.len());
        for probe in &survey.probes {
            let estimate = service
                .estimate(&probe.measurement)
                .with_context(|| format!("estimating {}", probe.measurement.uid))?;
            let record = match estimate {
                Some(estimate) => EstimationRecord {
                    probe: probe.measurement.uid.clone(),
                    truth: probe.truth.clone(),
                    error: Some(estimate.position.distance_to(&probe.truth)),
                    neighbours: estimate.neighbours.len(),
                    estimate: Some(estimate.position),
                },
                None => EstimationRecord {
                    probe: probe.measurement.uid.clone(),
                    truth: probe.truth.clone(),
                    estimate: None,
                    error: None,
                    neighbours: 0,
                },
            };
            estimates.push(record);
        }

        let errors: Vec<f64> = estimates.iter().filter_map(|record| record.error).collect();
        let summary = |reduce: fn(&[f64]) -> f64| (!errors.is_empty()).then(|| reduce(&errors));

        let result = WorkflowResult {
            epoch: generation.epoch(),
            stored_captures,
            fingerprint_count: generation.len(),
            key_count: generation.dimension(),
            calibration_points: generation
                .fingerprints()
                .iter()
                .map(|fingerprint| fingerprint.position.clone())
                .collect(),
            estimates,
            mean_error: summary(StatsHelper::mean),
            rms_error: summary(StatsHelper::rms),
            max_error: summary(StatsHelper::max),
            metrics: service.metrics(),
        };

        let mut live = self
            .live
            .write()
            .map_err(|_| anyhow!("live service lock poisoned"))?;
        *live = service;
        Ok(result)
    }

    /// Hands a live measurement to the current service's dispatch.
    pub async fn ingest(&self, measurement: Measurement) -> anyhow::Result<Measurement> {
        let service = self.service()?;
        service
            .process(measurement)
            .await
            .context("processing ingested measurement")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_survey_from_config, GeneratorConfig};

    fn small_config() -> WorkflowConfig {
        let mut cfg = WorkflowConfig::from_args(2.0, 3, true, false);
        cfg.generator = GeneratorConfig {
            width: 10.0,
            height: 10.0,
            spacing: 2.0,
            access_points: 4,
            captures_per_point: 2,
            probes: 5,
            noise: 0.0,
            seed: 3,
            ..Default::default()
        };
        cfg
    }

    #[tokio::test]
    async fn runner_executes_workflow() {
        let cfg = small_config();
        let runner = Runner::new(cfg.clone()).unwrap();
        let survey = build_survey_from_config(&cfg.generator).unwrap();
        let result = runner.execute(&survey).await.unwrap();

        assert_eq!(result.epoch, 1);
        assert_eq!(result.stored_captures, 72);
        // repeated captures at a grid point merge into one entry
        assert_eq!(result.fingerprint_count, 36);
        assert_eq!(result.key_count, 4);
        assert_eq!(result.resolved_count(), 5);
        assert!(result.estimates.iter().all(|record| record.neighbours == 3));
        assert!(result.mean_error.unwrap() < 10.0);
        assert!(result.rms_error.unwrap() >= result.mean_error.unwrap() - 1e-9);
        assert!(result.max_error.unwrap() >= result.mean_error.unwrap());
        assert_eq!(result.metrics.estimates, 5);
    }

    #[tokio::test]
    async fn ingest_locates_against_the_latest_run() {
        let cfg = small_config();
        let runner = Runner::new(cfg.clone()).unwrap();
        let survey = build_survey_from_config(&cfg.generator).unwrap();
        runner.execute(&survey).await.unwrap();

        let located = runner
            .ingest(survey.probes[0].measurement.clone())
            .await
            .unwrap();
        assert!(located.position.is_some());
    }
}
