/// Iteration controller - the state machine driving one roam test run
///
/// ```text
/// Idle -> RoleAssigned(pair) -> Ramping(pair, iteration, step) ...
///      -> IterationDone(pair, iteration) -> Ramping(.., iteration + 1, 0)
///                                        -> RoleAssigned(pair + 1)
///                                        -> RunDone
/// ```
///
/// Every transition is one call to [`IterationController::advance`]. Network
/// calls are issued one at a time, and pacing goes through the [`Pacer`]
/// deadline API. An operator stop is honored only between ramp steps.
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use crate::{
    api::traits::{CaptureAgent, DeviceController, MonitorSpec, Pacer},
    core::{
        aggregate::RunAggregate,
        detector::RoamDetector,
        error::{RoamError, RunAborted},
        rf::{RfEnvironment, Roles},
        schedule::{build_pairs, AttenuatorPair, RampSchedule},
        telemetry::TelemetryReader,
        types::{AttenuatorId, Bssid, StationId},
    },
    utils::sleep::{deadline_after, StopSignal},
};

/// Validated, already-parsed run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub attenuators: Vec<AttenuatorId>,
    pub stations: Vec<StationId>,
    /// Informational; seeds the per-BSSID table.
    pub bssids: Vec<Bssid>,
    pub step: u32,
    pub max_attenuation: u32,
    pub iterations: usize,
    pub wait_time: Duration,
    /// Fixed delay after each capture start and stop.
    pub capture_settle: Duration,
    pub capture_interface: String,
    /// Remote capture path with `{iteration}`, `{pair}`, `{active}` and
    /// `{passive}` placeholders.
    pub capture_template: String,
    /// Monitor port rebuilt before every capture; `None` leaves the interface as is.
    pub monitor: Option<MonitorSpec>,
    pub max_missed_polls: u32,
}

/// The external services a run drives.
#[derive(Clone)]
pub struct Collaborators {
    pub controller: Arc<dyn DeviceController>,
    pub capture: Arc<dyn CaptureAgent>,
    pub pacer: Arc<dyn Pacer>,
}

#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunPhase {
    Idle,
    RoleAssigned {
        pair: usize,
    },
    Ramping {
        pair: usize,
        iteration: usize,
        step: usize,
    },
    IterationDone {
        pair: usize,
        iteration: usize,
    },
    RunDone,
}

/// A completed run.
#[derive(Debug)]
pub struct RunOutput {
    pub aggregate: RunAggregate,
    /// Remote capture files in the order they were written.
    pub capture_files: Vec<String>,
    pub dropped_stations: Vec<StationId>,
}

/// Render the remote capture path for `(pair, iteration)`; `iteration` is 1-based.
pub fn render_capture_path(template: &str, pair: usize, iteration: usize, roles: &Roles) -> String {
    template
        .replace("{iteration}", &iteration.to_string())
        .replace("{pair}", &pair.to_string())
        .replace("{active}", roles.active.as_str())
        .replace("{passive}", roles.passive.as_str())
}

pub struct IterationController {
    settings: RunSettings,
    pairs: Vec<AttenuatorPair>,
    ramp: RampSchedule,
    rf: RfEnvironment,
    telemetry: TelemetryReader,
    controller: Arc<dyn DeviceController>,
    capture: Arc<dyn CaptureAgent>,
    pacer: Arc<dyn Pacer>,
    stop: StopSignal,

    phase: RunPhase,
    roles: Option<Roles>,
    detector: Option<RoamDetector>,
    capture_running: bool,
    capture_files: Vec<String>,
    aggregate: RunAggregate,
}

impl IterationController {
    /// Build the schedule and check the RF environment.
    ///
    /// Configuration errors surface here, before any attenuation is changed.
    pub async fn prepare(
        settings: RunSettings,
        collaborators: Collaborators,
        stop: StopSignal,
    ) -> Result<Self, RoamError> {
        let pairs = build_pairs(&settings.attenuators)?;
        let ramp = RampSchedule::new(settings.step, settings.max_attenuation)?;
        log::info!(
            "Test will be performed on the APs with the following attenuator combinations: {}",
            pairs
                .iter()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        log::info!(
            "Ramp has {} steps of {} up to {}",
            ramp.len(),
            settings.step,
            settings.max_attenuation
        );

        let rf = RfEnvironment::discover(
            collaborators.controller.clone(),
            settings.attenuators.clone(),
            settings.max_attenuation,
        )
        .await?;
        let telemetry = TelemetryReader::new(
            collaborators.controller.clone(),
            settings.stations.clone(),
            settings.max_missed_polls,
        );
        let aggregate =
            RunAggregate::new(pairs.clone(), settings.iterations, settings.stations.clone());

        Ok(Self {
            settings,
            pairs,
            ramp,
            rf,
            telemetry,
            controller: collaborators.controller,
            capture: collaborators.capture,
            pacer: collaborators.pacer,
            stop,
            phase: RunPhase::Idle,
            roles: None,
            detector: None,
            capture_running: false,
            capture_files: Vec::new(),
            aggregate,
        })
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    pub fn roles(&self) -> Option<&Roles> {
        self.roles.as_ref()
    }

    /// Perform exactly one state transition and return the new phase.
    pub async fn advance(&mut self) -> Result<RunPhase, RoamError> {
        let next = match self.phase.clone() {
            RunPhase::Idle => {
                if self.settings.iterations == 0 {
                    RunPhase::RunDone
                } else {
                    self.enter_pair(0).await?
                }
            }
            RunPhase::RoleAssigned { pair } => {
                self.begin_iteration(pair, 0).await?;
                RunPhase::Ramping {
                    pair,
                    iteration: 0,
                    step: 0,
                }
            }
            RunPhase::Ramping {
                pair,
                iteration,
                step,
            } => {
                self.ramp_step(step).await?;
                if step + 1 < self.ramp.len() {
                    self.check_stop(pair, iteration, step)?;
                    RunPhase::Ramping {
                        pair,
                        iteration,
                        step: step + 1,
                    }
                } else {
                    self.finish_iteration(pair, iteration).await?;
                    RunPhase::IterationDone { pair, iteration }
                }
            }
            RunPhase::IterationDone { pair, iteration } => {
                if iteration + 1 < self.settings.iterations {
                    self.check_stop(pair, iteration, self.ramp.len() - 1)?;
                    self.begin_iteration(pair, iteration + 1).await?;
                    RunPhase::Ramping {
                        pair,
                        iteration: iteration + 1,
                        step: 0,
                    }
                } else if pair + 1 < self.pairs.len() {
                    self.check_stop(pair, iteration, self.ramp.len() - 1)?;
                    self.enter_pair(pair + 1).await?
                } else {
                    RunPhase::RunDone
                }
            }
            RunPhase::RunDone => RunPhase::RunDone,
        };

        log::debug!("Roam test phase {} -> {next}", self.phase);
        self.phase = next.clone();
        Ok(next)
    }

    /// Drive the state machine to completion.
    pub async fn run(mut self) -> Result<RunOutput, RunAborted> {
        log::info!(
            "Performing roaming test for {} iteration(s) over {} attenuator pair(s) with {} station(s)",
            self.settings.iterations,
            self.pairs.len(),
            self.settings.stations.len()
        );

        loop {
            match self.advance().await {
                Ok(RunPhase::RunDone) => break,
                Ok(_) => {}
                Err(error) => return Err(self.abort(error).await),
            }
        }

        log::info!("Roam test complete");
        Ok(RunOutput {
            aggregate: self.aggregate,
            capture_files: self.capture_files,
            dropped_stations: self.telemetry.dropped().to_vec(),
        })
    }

    async fn abort(mut self, error: RoamError) -> RunAborted {
        if self.capture_running {
            if let Err(err) = self.capture.stop_capture().await {
                log::warn!("Could not stop the sniffer while aborting: {err:#}");
            }
            self.capture_running = false;
        }
        log::error!("Roam test aborted: {error}");
        RunAborted {
            error,
            partial: self.aggregate,
        }
    }

    fn check_stop(&self, pair: usize, iteration: usize, step: usize) -> Result<(), RoamError> {
        if self.stop.is_requested() {
            return Err(RoamError::Interrupted {
                pair,
                iteration,
                step,
            });
        }
        Ok(())
    }

    fn current_roles(&self) -> Result<Roles, RoamError> {
        self.roles
            .clone()
            .ok_or_else(|| RoamError::Inconsistent("no attenuator pair is in role".to_string()))
    }

    async fn enter_pair(&mut self, pair: usize) -> Result<RunPhase, RoamError> {
        let target = self.pairs.get(pair).cloned().ok_or_else(|| {
            RoamError::Inconsistent(format!("pair index {pair} is out of the schedule"))
        })?;
        log::info!("Roaming test started on the attenuator combination {target}");
        self.roles = Some(self.rf.assign_roles(&target).await?);
        Ok(RunPhase::RoleAssigned { pair })
    }

    async fn begin_iteration(&mut self, pair: usize, iteration: usize) -> Result<(), RoamError> {
        let roles = self.current_roles()?;
        log::info!(
            "Initiating iteration {} on pair {pair} (active {}, passive {})",
            iteration + 1,
            roles.active,
            roles.passive
        );

        if let Some(monitor) = &self.settings.monitor {
            self.controller
                .create_monitor(monitor)
                .await
                .map_err(|err| RoamError::Capture {
                    action: "create monitor",
                    reason: format!("{err:#}"),
                })?;
        }

        let path = render_capture_path(
            &self.settings.capture_template,
            pair,
            iteration + 1,
            &roles,
        );
        self.capture
            .start_capture(&self.settings.capture_interface, &path)
            .await
            .map_err(|err| RoamError::Capture {
                action: "start capture",
                reason: format!("{err:#}"),
            })?;
        self.capture_running = true;
        self.capture_files.push(path);
        self.pacer
            .wait_until(deadline_after(self.settings.capture_settle))
            .await;

        let baselines = self.telemetry.capture_baselines().await;
        for (station, bssid) in &baselines {
            match bssid {
                Some(bssid) => log::debug!("Station {station} starts on {bssid}"),
                None => log::warn!(
                    "Station {station} has no usable BSSID, excluding it from iteration {}",
                    iteration + 1
                ),
            }
        }
        self.detector = Some(RoamDetector::begin(&baselines));
        Ok(())
    }

    async fn ramp_step(&mut self, step: usize) -> Result<(), RoamError> {
        let roles = self.current_roles()?;
        let (up, down) = self.ramp.step(step).ok_or_else(|| {
            RoamError::Inconsistent(format!("ramp step {step} is out of the schedule"))
        })?;

        log::info!("Setting the attenuation to {up} for attenuator {}", roles.active);
        log::info!("Setting the attenuation to {down} for attenuator {}", roles.passive);
        self.rf.apply_step(&roles, up, down).await?;

        log::info!(
            "Waiting for {} seconds before monitoring the stations",
            self.settings.wait_time.as_secs_f64()
        );
        self.pacer
            .wait_until(deadline_after(self.settings.wait_time))
            .await;

        let readings = self.telemetry.poll_all().await;
        let detector = self
            .detector
            .as_mut()
            .ok_or_else(|| RoamError::Inconsistent("ramp step outside an iteration".to_string()))?;
        for (station, reading) in &readings {
            if detector.observe(station, step, reading.as_ref()) {
                if let Some(event) = detector.event(station) {
                    log::info!(
                        "Station {station} roamed from {} to {} at step {step} ({up}/{down})",
                        event
                            .bssid_before
                            .as_ref()
                            .map_or("unknown".to_string(), Bssid::to_string),
                        event
                            .bssid_after
                            .as_ref()
                            .map_or("unknown".to_string(), Bssid::to_string),
                    );
                }
            }
        }
        Ok(())
    }

    async fn finish_iteration(&mut self, pair: usize, iteration: usize) -> Result<(), RoamError> {
        let detector = self.detector.take().ok_or_else(|| {
            RoamError::Inconsistent("iteration finished without a detector".to_string())
        })?;
        let result = detector.finish();
        log::info!(
            "Iteration {} on pair {pair} complete: {} of {} eligible station(s) roamed",
            iteration + 1,
            result.roamed(),
            result.eligible()
        );
        self.aggregate.commit(pair, iteration, result)?;

        log::info!("Stopping sniffer");
        let stopped = self.capture.stop_capture().await;
        // a failed stop is not retried on abort
        self.capture_running = false;
        stopped.map_err(|err| RoamError::Capture {
            action: "stop capture",
            reason: format!("{err:#}"),
        })?;
        self.pacer
            .wait_until(deadline_after(self.settings.capture_settle))
            .await;

        self.roles = self.roles.take().map(Roles::swap);
        Ok(())
    }
}
