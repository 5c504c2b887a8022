use anyhow::{Context, Result};
use chrono::Local;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::ArgMatches;

use crate::{
    api::{capture::SshCaptureAgent, lanforge::LanforgeClient, sim::SimulatedBench},
    cli::{
        config::RoamTestConfig,
        report::{
            log_totals, read_json, reduce, write_json, RoamReport, TestSetup, PARTIAL_FILE,
            RESULTS_FILE,
        },
    },
    core::{
        aggregate::RunAggregate,
        runner::{Collaborators, IterationController, RunSettings},
        types::Bssid,
    },
    utils::sleep::{StopSignal, TokioPacer},
};

/// Run whatever the command line asks for
pub async fn dispatch(matches: &ArgMatches, stop: StopSignal) -> Result<()> {
    if let Some(path) = matches.get_one::<String>("from-results") {
        return regenerate(Path::new(path));
    }

    let config = load_config(matches)?;
    let settings = config.validate()?;
    let collaborators = if matches.get_flag("dry-run") {
        log::info!("Dry run: using a simulated bench, no device will be touched");
        let bench = Arc::new(simulated_bench(&settings));
        Collaborators {
            controller: bench.clone(),
            capture: bench.clone(),
            pacer: bench,
        }
    } else {
        let controller = Arc::new(LanforgeClient::new(&config.controller)?);
        let capture = Arc::new(SshCaptureAgent::new(config.capture_target()?));
        Collaborators {
            controller,
            capture,
            pacer: Arc::new(TokioPacer),
        }
    };

    let output_dir = execute(&config, settings, collaborators, stop).await?;
    log::info!("Results written to {}", output_dir.display());
    Ok(())
}

/// File configuration (if any) with command line overrides applied
pub fn load_config(matches: &ArgMatches) -> Result<RoamTestConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => RoamTestConfig::from_file(Path::new(path))?,
        None => RoamTestConfig::default(),
    };
    config.apply_matches(matches);
    Ok(config)
}

/// A bench whose APs sit behind the configured attenuators.
///
/// Configured BSSIDs are assigned to attenuators in order; the rest get
/// locally administered addresses. Every station starts on the first AP and
/// roams once its AP passes half the maximum attenuation.
pub fn simulated_bench(settings: &RunSettings) -> SimulatedBench {
    let mut bench = SimulatedBench::new(settings.max_attenuation / 2);
    for (index, attenuator) in settings.attenuators.iter().enumerate() {
        let ap = settings
            .bssids
            .get(index)
            .map(Bssid::to_string)
            .unwrap_or_else(|| format!("02:00:00:00:00:{:02X}", index + 1));
        bench = bench.with_attenuator(attenuator.as_str(), &ap);
    }
    if let Some(first) = settings.attenuators.first() {
        for station in &settings.stations {
            bench = bench.with_station(station.as_str(), first.as_str());
        }
    }
    bench
}

/// Run the test and hand off its results.
///
/// Returns the directory holding `roam_results.json`. An aborted run leaves
/// only `partial_run.json` behind and comes back as an error.
pub async fn execute(
    config: &RoamTestConfig,
    settings: RunSettings,
    collaborators: Collaborators,
    stop: StopSignal,
) -> Result<PathBuf> {
    let setup = TestSetup::new(&config.controller, &settings);
    let controller =
        IterationController::prepare(settings, collaborators.clone(), stop).await?;

    let output_dir = config
        .result_dir
        .join(Local::now().format("%Y-%m-%d-%H-%M-%S").to_string());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let output = match controller.run().await {
        Ok(output) => output,
        Err(aborted) => {
            let path = output_dir.join(PARTIAL_FILE);
            write_json(&path, &aborted.partial)?;
            log::warn!("Partial results saved to {}", path.display());
            return Err(aborted.into());
        }
    };

    if config.capture.fetch {
        for remote in &output.capture_files {
            match collaborators.capture.fetch_file(remote, &output_dir).await {
                Ok(local) => log::info!("Fetched capture {remote} to {}", local.display()),
                Err(err) => log::warn!("Could not fetch capture {remote}: {err:#}"),
            }
        }
    }

    let report = RoamReport::build(setup, &output)?;
    log_totals(&report.totals);
    write_json(&output_dir.join(RESULTS_FILE), &report)?;
    Ok(output_dir)
}

/// Recompute totals from a saved result file and print them as JSON
pub fn regenerate(path: &Path) -> Result<()> {
    let (run, seed) = match read_json::<RoamReport>(path) {
        Ok(report) => (report.run, report.setup.bssids),
        Err(_) => (read_json::<RunAggregate>(path)?, Vec::new()),
    };
    if !run.is_complete() {
        log::warn!(
            "{} holds {} of {} iterations; totals cover the completed ones only",
            path.display(),
            run.committed(),
            run.capacity()
        );
    }

    let (totals, per_pair) = reduce(&run, &seed)?;
    log_totals(&totals);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "totals": totals,
            "per_pair": per_pair,
        }))?
    );
    Ok(())
}
