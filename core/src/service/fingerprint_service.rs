use crate::data::{Fingerprint, Measurement, Reading};
use crate::prelude::{FingerprintEngine, FingerprintError, FingerprintResult, FingerprintingConfig};
use crate::processing::{CacheGeneration, Estimate, KnnEngine};
use crate::service::store::FingerprintStore;
use crate::telemetry::{LogManager, MetricsRecorder, MetricsSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Decides whether a calibration reading becomes a fingerprint feature.
pub type ReadingFilter = Arc<dyn Fn(&Reading) -> bool + Send + Sync>;

/// Owns the calibration set of one classifier and publishes its cache generations.
///
/// Readers hold an `Arc<CacheGeneration>` and are never affected by a later rebuild; the
/// new generation replaces the published one in a single `watch` send. Rebuilds are
/// serialized, and a request arriving while one is running is served by the next pass
/// instead of queuing one pass per caller.
pub struct FingerprintService<E: FingerprintEngine = KnnEngine> {
    config: FingerprintingConfig,
    engine: E,
    store: Arc<dyn FingerprintStore>,
    filter: Option<ReadingFilter>,
    publisher: watch::Sender<Arc<CacheGeneration>>,
    requested: AtomicU64,
    /// Last request ticket covered by a published generation.
    rebuild_gate: Mutex<u64>,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl FingerprintService<KnnEngine> {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        config: FingerprintingConfig,
    ) -> FingerprintResult<Self> {
        let engine = KnnEngine::from_config(&config);
        Self::with_engine(store, config, engine)
    }
}

impl<E: FingerprintEngine> FingerprintService<E> {
    pub fn with_engine(
        store: Arc<dyn FingerprintStore>,
        config: FingerprintingConfig,
        engine: E,
    ) -> FingerprintResult<Self> {
        config.validate()?;
        let (publisher, _) = watch::channel(Arc::new(CacheGeneration::empty(0)));
        let logger = LogManager::new(format!("fingerprinting:{}", config.classifier));
        Ok(Self {
            config,
            engine,
            store,
            filter: None,
            publisher,
            requested: AtomicU64::new(0),
            rebuild_gate: Mutex::new(0),
            metrics: MetricsRecorder::new(),
            logger,
        })
    }

    pub fn with_reading_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Reading) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn classifier(&self) -> &str {
        &self.config.classifier
    }

    pub fn config(&self) -> &FingerprintingConfig {
        &self.config
    }

    pub fn is_locked(&self) -> bool {
        self.config.locked
    }

    /// The generation published most recently; epoch 0 before the first rebuild.
    pub fn current(&self) -> Arc<CacheGeneration> {
        self.publisher.borrow().clone()
    }

    /// Receiver notified on every published generation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<CacheGeneration>> {
        self.publisher.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Rebuilds the cache from the full raw set and publishes the result.
    pub async fn update(&self) -> FingerprintResult<Arc<CacheGeneration>> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let mut completed = self.rebuild_gate.lock().await;
        if *completed >= ticket {
            return Ok(self.current());
        }

        // Everything requested so far reads the store after this point.
        let target = self.requested.load(Ordering::SeqCst);
        let epoch = self.current().epoch() + 1;
        let generation = match self.rebuild(epoch) {
            Ok(generation) => Arc::new(generation),
            Err(err) => {
                self.metrics.record_error();
                self.logger.warn(&format!("rebuild {} failed: {}", epoch, err));
                return Err(err);
            }
        };

        self.publisher.send_replace(Arc::clone(&generation));
        *completed = target;
        self.metrics.record_rebuild();
        self.logger.record(&format!(
            "published generation {} with {} fingerprints over {} keys",
            generation.epoch(),
            generation.len(),
            generation.dimension()
        ));
        Ok(generation)
    }

    fn rebuild(&self, epoch: u64) -> FingerprintResult<CacheGeneration> {
        let raw = self.store.fetch_all(&self.config.classifier)?;
        self.logger
            .detail(&format!("rebuilding from {} raw fingerprints", raw.len()));
        self.engine.rebuild(&raw, epoch)
    }

    /// Appends one raw fingerprint of this service's classifier.
    pub async fn insert(&self, fingerprint: Fingerprint) -> FingerprintResult<()> {
        if fingerprint.classifier != self.config.classifier {
            return Err(FingerprintError::InvalidInput(format!(
                "fingerprint classifier {} does not match service classifier {}",
                fingerprint.classifier, self.config.classifier
            )));
        }
        self.store.append(fingerprint)?;
        if self.config.auto_update {
            self.update().await?;
        }
        Ok(())
    }

    /// Turns a positioned measurement into a stored raw fingerprint. `Ok(None)` when no
    /// reading survives the filter.
    pub async fn calibrate(&self, measurement: &Measurement) -> FingerprintResult<Option<Fingerprint>> {
        let position = measurement.position.clone().ok_or_else(|| {
            FingerprintError::InvalidInput(format!(
                "calibration measurement {} has no position",
                measurement.uid
            ))
        })?;

        let mut fingerprint = Fingerprint::new(self.config.classifier.clone(), position)
            .with_source(measurement.uid.clone());
        if let Some(timestamp) = measurement.timestamp {
            fingerprint = fingerprint.with_created_at(timestamp);
        }
        for reading in measurement.readings.iter().filter(|r| self.accepts(r)) {
            fingerprint.add_feature(reading.key.clone(), reading.value);
        }

        if !fingerprint.has_usable_samples() {
            self.logger.detail(&format!(
                "measurement {} left no usable features",
                measurement.uid
            ));
            return Ok(None);
        }

        self.insert(fingerprint.clone()).await?;
        self.metrics.record_calibration();
        Ok(Some(fingerprint))
    }

    fn accepts(&self, reading: &Reading) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(reading))
    }

    /// Estimates against the currently published generation.
    pub fn estimate(&self, measurement: &Measurement) -> FingerprintResult<Option<Estimate>> {
        let generation = self.current();
        match self.engine.estimate(measurement, &generation) {
            Ok(estimate) => {
                self.metrics.record_estimate(estimate.is_some());
                if estimate.is_none() {
                    self.logger.detail(&format!(
                        "measurement {} unresolved against generation {}",
                        measurement.uid,
                        generation.epoch()
                    ));
                }
                Ok(estimate)
            }
            Err(err) => {
                self.metrics.record_error();
                Err(err)
            }
        }
    }

    /// Fills in the estimated position; the measurement is returned untouched when it
    /// cannot be resolved.
    pub fn locate(&self, mut measurement: Measurement) -> FingerprintResult<Measurement> {
        if let Some(estimate) = self.estimate(&measurement)? {
            measurement.position = Some(estimate.position);
        }
        Ok(measurement)
    }

    /// Calibrates positioned measurements while unlocked, locates everything else.
    pub async fn process(&self, measurement: Measurement) -> FingerprintResult<Measurement> {
        if measurement.position.is_some() && !self.config.locked {
            self.calibrate(&measurement).await?;
            Ok(measurement)
        } else if measurement.has_readings() {
            self.locate(measurement)
        } else {
            Ok(measurement)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Position;
    use crate::service::store::MemoryFingerprintStore;

    fn config(classifier: &str) -> FingerprintingConfig {
        FingerprintingConfig {
            locked: false,
            default_value: -100.0,
            ..FingerprintingConfig::with_classifier(classifier)
        }
    }

    fn service(config: FingerprintingConfig) -> FingerprintService {
        FingerprintService::new(Arc::new(MemoryFingerprintStore::new()), config).unwrap()
    }

    fn capture(x: f64, y: f64, readings: &[(&str, f64)]) -> Measurement {
        let mut measurement = Measurement::new("survey").with_position(Position::new_2d(x, y));
        for (key, value) in readings {
            measurement.push_reading(Reading::new(*key, *value));
        }
        measurement
    }

    #[tokio::test]
    async fn update_publishes_a_new_generation() {
        let service = service(config("wlan"));
        let mut receiver = service.subscribe();
        assert_eq!(service.current().epoch(), 0);
        assert!(service.current().is_empty());

        service
            .calibrate(&capture(0.0, 0.0, &[("AP_1", -50.0)]))
            .await
            .unwrap();
        let generation = service.update().await.unwrap();

        assert_eq!(generation.epoch(), 1);
        assert_eq!(generation.len(), 1);
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().epoch(), 1);
        assert_eq!(service.metrics().rebuilds, 1);
    }

    #[tokio::test]
    async fn published_generations_are_never_mutated() {
        let service = service(config("wlan"));
        service
            .calibrate(&capture(0.0, 0.0, &[("AP_1", -50.0)]))
            .await
            .unwrap();
        let held = service.update().await.unwrap();

        service
            .calibrate(&capture(4.0, 0.0, &[("AP_2", -40.0)]))
            .await
            .unwrap();
        let next = service.update().await.unwrap();

        assert_eq!(held.len(), 1);
        assert_eq!(held.dimension(), 1);
        assert_eq!(held.fingerprints()[0].vector(), &[-50.0]);
        assert_eq!(next.len(), 2);
        assert_eq!(next.dimension(), 2);
    }

    #[tokio::test]
    async fn waiting_requests_are_coalesced_into_one_rebuild() {
        let service = service(config("wlan"));
        service
            .calibrate(&capture(0.0, 0.0, &[("AP_1", -50.0)]))
            .await
            .unwrap();

        let gate = service.rebuild_gate.lock().await;
        let release = async move {
            tokio::task::yield_now().await;
            drop(gate);
        };
        let (first, second, ()) = tokio::join!(service.update(), service.update(), release);

        let first = first.unwrap();
        let second = second.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.epoch(), 1);
        assert_eq!(service.metrics().rebuilds, 1);
    }

    #[tokio::test]
    async fn auto_update_rebuilds_after_every_insert() {
        let service = service(FingerprintingConfig {
            auto_update: true,
            ..config("wlan")
        });
        service
            .calibrate(&capture(0.0, 0.0, &[("AP_1", -50.0)]))
            .await
            .unwrap();
        service
            .calibrate(&capture(1.0, 0.0, &[("AP_1", -55.0)]))
            .await
            .unwrap();
        assert_eq!(service.current().epoch(), 2);
        assert_eq!(service.current().len(), 2);
    }

    #[tokio::test]
    async fn classifiers_sharing_a_store_stay_apart() {
        let store: Arc<dyn FingerprintStore> = Arc::new(MemoryFingerprintStore::new());
        let wlan = FingerprintService::new(Arc::clone(&store), config("wlan")).unwrap();
        let geo = FingerprintService::new(Arc::clone(&store), config("geo")).unwrap();

        wlan.calibrate(&capture(0.0, 0.0, &[("AP_1", -50.0)]))
            .await
            .unwrap();
        geo.calibrate(&capture(0.0, 0.0, &[("MAG_X", 20.0)]))
            .await
            .unwrap();

        let generation = wlan.update().await.unwrap();
        assert_eq!(generation.len(), 1);
        assert_eq!(
            generation.cached_references().iter().collect::<Vec<_>>(),
            vec!["AP_1"]
        );

        let foreign = Fingerprint::new("geo", Position::new_2d(0.0, 0.0));
        assert!(wlan.insert(foreign).await.is_err());
    }

    #[tokio::test]
    async fn calibration_applies_filter_and_drops_nan() {
        let service = service(config("geo"))
            .with_reading_filter(|reading: &Reading| reading.key.starts_with("MAG_"));
        let stored = service
            .calibrate(&capture(
                1.0,
                2.0,
                &[("MAG_X", 20.0), ("MAG_Y", f64::NAN), ("AP_1", -60.0)],
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["MAG_X"]);
        assert_eq!(stored.source.as_deref(), Some("survey"));

        let skipped = service
            .calibrate(&capture(1.0, 2.0, &[("AP_1", -60.0)]))
            .await
            .unwrap();
        assert!(skipped.is_none());
        assert_eq!(service.metrics().calibrations, 1);

        let unpositioned = Measurement::new("probe").with_reading("MAG_X", 1.0);
        assert!(service.calibrate(&unpositioned).await.is_err());
    }

    #[tokio::test]
    async fn process_dispatches_on_lock_state() {
        let open = service(config("wlan"));
        open.process(capture(0.0, 0.0, &[("AP_1", -40.0), ("AP_2", -80.0)]))
            .await
            .unwrap();
        open.process(capture(10.0, 0.0, &[("AP_1", -80.0), ("AP_2", -40.0)]))
            .await
            .unwrap();
        open.update().await.unwrap();

        let probe = Measurement::new("probe")
            .with_reading("AP_1", -79.0)
            .with_reading("AP_2", -41.0);
        let located = open.process(probe).await.unwrap();
        let position = located.position.unwrap();
        assert_eq!((position.x, position.y), (10.0, 0.0));

        let locked = service(FingerprintingConfig {
            locked: true,
            ..config("wlan")
        });
        locked
            .process(capture(0.0, 0.0, &[("AP_1", -40.0)]))
            .await
            .unwrap();
        assert_eq!(locked.metrics().calibrations, 0);

        let empty = locked.process(Measurement::new("idle")).await.unwrap();
        assert!(empty.position.is_none());
    }

    #[tokio::test]
    async fn unresolved_estimates_are_counted() {
        let service = service(config("wlan"));
        let result = service
            .estimate(&Measurement::new("probe").with_reading("AP_1", -60.0))
            .unwrap();
        assert!(result.is_none());
        let metrics = service.metrics();
        assert_eq!(metrics.estimates, 1);
        assert_eq!(metrics.unresolved, 1);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = FingerprintingConfig {
            k: 0,
            ..config("wlan")
        };
        assert!(FingerprintService::new(Arc::new(MemoryFingerprintStore::new()), config).is_err());
    }
}
