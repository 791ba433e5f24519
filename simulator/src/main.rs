use anyhow::Context;
use clap::Parser;
use generator::profile::build_survey_from_config;
use gui_bridge::bridge::GuiBridge;
use gui_bridge::model::VisualizationModel;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Fingerprint survey and positioning driver")]
struct Args {
    /// Run one synthetic survey, estimate the probes and emit an accuracy summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Calibration grid spacing in metres
    #[arg(long, default_value_t = 2.0)]
    grid: f64,
    #[arg(long, default_value_t = 3)]
    k: usize,
    #[arg(long, default_value_t = false)]
    weighted: bool,
    /// Brute-force matching instead of the k-d tree
    #[arg(long, default_value_t = false)]
    naive: bool,
    /// Keep the GUI bridge alive for live measurements
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.grid, args.k, args.weighted, args.naive)
    };

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating workflow runtime")?;
    let runner = Arc::new(Runner::new(workflow_config.clone())?);
    let gui_bridge = GuiBridge::new(runner.clone());

    if args.offline {
        let survey = build_survey_from_config(&workflow_config.generator)?;
        let result = runtime.block_on(runner.execute(&survey))?;

        println!(
            "Offline run -> fingerprints {}, keys {}, resolved {}/{}, mean error {}",
            result.fingerprint_count,
            result.key_count,
            result.resolved_count(),
            result.estimates.len(),
            format_error(result.mean_error)
        );

        let model = VisualizationModel::from_result(
            &result,
            workflow_config.generator.scenario.clone(),
        );
        gui_bridge.publish(&model)?;
        gui_bridge.publish_status("Offline survey results ready.");

        let report = format!(
            "epoch={} captures={} fingerprints={} keys={} resolved={}/{} k={} weighted={} naive={} mean_error={} rms_error={} max_error={}\n",
            result.epoch,
            result.stored_captures,
            result.fingerprint_count,
            result.key_count,
            result.resolved_count(),
            result.estimates.len(),
            workflow_config.fingerprinting.k,
            workflow_config.fingerprinting.weighted,
            workflow_config.fingerprinting.naive,
            format_error(result.mean_error),
            format_error(result.rms_error),
            format_error(result.max_error)
        );
        let report_path = PathBuf::from("tools/data/offline_estimation.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(report_path)?;
        file.write_all(report.as_bytes())?;
    }
    if args.serve {
        gui_bridge.serve();
        gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}

fn format_error(error: Option<f64>) -> String {
    error.map_or_else(|| "n/a".into(), |value| format!("{:.3}", value))
}
