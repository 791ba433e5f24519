use crate::generator::profile::{build_survey_from_config, GeneratorConfig};
use crate::gui_bridge::model::VisualizationModel;
use crate::workflow::runner::Runner;
use anyhow::{anyhow, Result};
use fpcore::data::Measurement;
use log::{error, info};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter};

fn gui_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

#[derive(Debug)]
struct WarpError;

impl warp::reject::Reject for WarpError {}

type SharedModel = Arc<RwLock<VisualizationModel>>;

/// Bridge that hosts the visualization HTTP endpoint and routes live measurements.
pub struct GuiBridge {
    state: SharedModel,
    runner: Arc<Runner>,
}

impl GuiBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            state: Arc::new(RwLock::new(VisualizationModel::default())),
            runner,
        }
    }

    /// Starts the HTTP endpoint on its own thread and runtime.
    pub fn serve(&self) {
        let state_for_filter = self.state.clone();
        let runner = self.runner.clone();
        let state_filter = warp::any().map(move || state_for_filter.clone());
        let runner_filter = warp::any().map(move || runner.clone());

        let get_route = warp::path("payload")
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: SharedModel| match state.read() {
                Ok(model) => warp::reply::with_status(warp::reply::json(&*model), StatusCode::OK),
                Err(_) => warp::reply::with_status(
                    warp::reply::json(&json!({"status": "unavailable"})),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            });

        let post_route = warp::path("ingest")
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter.clone())
            .and(runner_filter.clone())
            .and_then(
                |measurement: Measurement, state: SharedModel, runner: Arc<Runner>| async move {
                    let was_query = measurement.position.is_none();
                    match runner.ingest(measurement).await {
                        Ok(processed) => {
                            if let (true, Some(position)) = (was_query, processed.position.as_ref()) {
                                if let Ok(mut guard) = state.write() {
                                    guard.record_live(&processed.uid, position);
                                }
                            }
                            Ok::<_, warp::Rejection>(warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "ok",
                                    "measurement": processed,
                                })),
                                StatusCode::OK,
                            ))
                        }
                        Err(err) => {
                            error!("ingest error: {:#}", err);
                            Err(warp::reject::custom(WarpError))
                        }
                    }
                },
            );

        let generator_route = warp::path("ingest-config")
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter)
            .and(runner_filter)
            .and_then(
                |config: GeneratorConfig, state: SharedModel, runner: Arc<Runner>| async move {
                    let outcome = match build_survey_from_config(&config) {
                        Ok(survey) => runner.execute(&survey).await,
                        Err(err) => Err(err),
                    };
                    match outcome {
                        Ok(result) => {
                            if let Ok(mut guard) = state.write() {
                                *guard = VisualizationModel::from_result(
                                    &result,
                                    config.scenario.clone(),
                                );
                            }
                            if let Some(name) = config.scenario.as_ref() {
                                info!(
                                    "[GUI] Scenario {} -> {} fingerprints, mean error {:?}",
                                    name, result.fingerprint_count, result.mean_error
                                );
                            }
                            Ok::<_, warp::Rejection>(warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "ok",
                                    "fingerprints": result.fingerprint_count,
                                    "resolved": result.resolved_count(),
                                    "description": config.description.clone().unwrap_or_default()
                                })),
                                StatusCode::OK,
                            ))
                        }
                        Err(err) => {
                            error!("ingest-config error: {:#}", err);
                            Err(warp::reject::custom(WarpError))
                        }
                    }
                },
            );

        thread::spawn(move || {
            let routes = get_route.or(post_route).or(generator_route);
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("failed to build bridge runtime: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                warp::serve(routes).run(gui_bind_address()).await;
            });
        });
    }

    pub fn publish(&self, model: &VisualizationModel) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow!("visualization state lock poisoned"))?;
        *guard = model.clone();
        info!(
            "[GUI] calibration points: {}, estimates: {}",
            guard.calibration_points.len(),
            guard.estimates.len()
        );
        Ok(())
    }

    pub fn publish_status(&self, message: &str) {
        println!("[GUI] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> VisualizationModel {
        self.state.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::build_survey_from_config;
    use crate::workflow::config::WorkflowConfig;

    #[tokio::test]
    async fn gui_bridge_updates_state() {
        let mut cfg = WorkflowConfig::from_args(5.0, 2, false, true);
        cfg.generator.width = 10.0;
        cfg.generator.height = 5.0;
        cfg.generator.probes = 3;
        let runner = Arc::new(Runner::new(cfg.clone()).unwrap());
        let gui = GuiBridge::new(runner.clone());
        let survey = build_survey_from_config(&cfg.generator).unwrap();
        let result = runner.execute(&survey).await.unwrap();

        let model = VisualizationModel::from_result(&result, Some("corridor".into()));
        gui.publish(&model).unwrap();
        let snapshot = gui.snapshot();
        assert_eq!(snapshot.fingerprint_count, 6);
        assert_eq!(snapshot.estimates.len(), 3);
        assert_eq!(snapshot.scenario_metadata.as_deref(), Some("corridor"));
    }
}
