use std::{sync::Arc, time::Duration};

use roamctl::{
    api::{
        sim::{CaptureCall, SimulatedBench},
        traits::MonitorSpec,
    },
    cli::{
        actions::{execute, simulated_bench},
        config::RoamTestConfig,
        report::{read_json, RoamReport, RESULTS_FILE},
    },
    core::{
        aggregate::RoamTotals,
        error::RoamError,
        runner::{Collaborators, IterationController, RunPhase, RunSettings},
        types::{AttenuatorId, Bssid, StationId},
    },
    utils::sleep::StopSignal,
};

const AP1: &str = "aa:bb:cc:dd:ee:01";
const AP2: &str = "aa:bb:cc:dd:ee:02";
const AP3: &str = "aa:bb:cc:dd:ee:03";

fn sta(id: &str) -> StationId {
    StationId::parse(id).unwrap()
}

fn bssid(raw: &str) -> Bssid {
    Bssid::normalize(raw).unwrap()
}

fn settings(attenuators: &[&str], stations: &[&str], iterations: usize) -> RunSettings {
    RunSettings {
        attenuators: attenuators.iter().map(|a| AttenuatorId::new(*a)).collect(),
        stations: stations.iter().map(|s| sta(s)).collect(),
        bssids: vec![bssid(AP1), bssid(AP2)],
        step: 100,
        max_attenuation: 950,
        iterations,
        wait_time: Duration::from_secs(30),
        capture_settle: Duration::from_secs(2),
        capture_interface: "sniffer0".to_string(),
        capture_template: "/home/lanforge/Desktop/iteration_{iteration}_roam_{pair}.pcap"
            .to_string(),
        monitor: Some(MonitorSpec {
            radio: sta("1.1.wiphy0"),
            name: "sniffer0".to_string(),
            channel: "AUTO".to_string(),
            frequency: None,
        }),
        max_missed_polls: 3,
    }
}

fn two_ap_bench(threshold: u32) -> SimulatedBench {
    SimulatedBench::new(threshold)
        .with_attenuator("A1", AP1)
        .with_attenuator("A2", AP2)
        .with_station("1.1.sta0000", "A1")
        .with_station("1.1.sta0001", "A1")
}

fn collaborators(bench: &Arc<SimulatedBench>) -> Collaborators {
    Collaborators {
        controller: bench.clone(),
        capture: bench.clone(),
        pacer: bench.clone(),
    }
}

async fn prepare(bench: &Arc<SimulatedBench>, settings: RunSettings) -> IterationController {
    IterationController::prepare(settings, collaborators(bench), StopSignal::new())
        .await
        .unwrap()
}

/// Two attenuators, one iteration, two stations that roam at the ramp midpoint
#[tokio::test]
async fn test_two_attenuator_scenario() {
    let bench = Arc::new(two_ap_bench(500));
    let run_settings = settings(&["A1", "A2"], &["1.1.sta0000", "1.1.sta0001"], 1);
    let output = prepare(&bench, run_settings.clone()).await.run().await.unwrap();

    let run = &output.aggregate;
    assert!(run.is_complete());
    let first = run.get(0, 0).unwrap();
    for station in ["1.1.sta0000", "1.1.sta0001"] {
        let event = &first.events[&sta(station)];
        assert!(event.roamed);
        assert_eq!(event.bssid_before, Some(bssid(AP1)));
        assert_eq!(event.bssid_after, Some(bssid(AP2)));
        // the station stays on AP2 until the ramp ends, and the last differing sample wins
        assert_eq!(event.step, Some(10));
    }

    let pair0 = RoamTotals::for_pair(run, 0, &run_settings.bssids).unwrap();
    assert_eq!(
        (pair0.attempted, pair0.successful, pair0.failed),
        (2, 2, 0)
    );
    assert_eq!(pair0.per_station_totals[&sta("1.1.sta0000")], 1);
    assert_eq!(pair0.per_station_totals[&sta("1.1.sta0001")], 1);
    assert_eq!(pair0.per_bssid_totals[&bssid(AP2)], 2);
    assert_eq!(pair0.per_bssid_totals[&bssid(AP1)], 0);

    // the wrap-around pair sends both stations back
    let totals = RoamTotals::from_run(run, &run_settings.bssids).unwrap();
    assert_eq!(
        (totals.attempted, totals.successful, totals.failed),
        (4, 4, 0)
    );
    assert_eq!(totals.per_bssid_totals[&bssid(AP1)], 2);
    assert_eq!(totals.per_bssid_totals[&bssid(AP2)], 2);
}

#[tokio::test]
async fn test_three_attenuators_pair_order_and_captures() {
    let bench = Arc::new(
        SimulatedBench::new(500)
            .with_attenuator("A1", AP1)
            .with_attenuator("A2", AP2)
            .with_attenuator("A3", AP3)
            .with_station("1.1.sta0000", "A1"),
    );
    let output = prepare(&bench, settings(&["A1", "A2", "A3"], &["1.1.sta0000"], 1))
        .await
        .run()
        .await
        .unwrap();

    let pairs: Vec<String> = output
        .aggregate
        .pairs
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(pairs, vec!["A1 - A2", "A2 - A3", "A3 - A1"]);

    assert_eq!(
        output.capture_files,
        vec![
            "/home/lanforge/Desktop/iteration_1_roam_0.pcap",
            "/home/lanforge/Desktop/iteration_1_roam_1.pcap",
            "/home/lanforge/Desktop/iteration_1_roam_2.pcap",
        ]
    );
    let captures = bench.captures();
    assert_eq!(captures.len(), 9);
    assert_eq!(
        captures[0],
        CaptureCall::Monitor {
            radio: sta("1.1.wiphy0"),
            name: "sniffer0".to_string()
        }
    );
    assert!(matches!(&captures[1], CaptureCall::Start { interface, .. } if interface == "sniffer0"));
    assert_eq!(captures[2], CaptureCall::Stop);

    let totals = RoamTotals::from_run(&output.aggregate, &[]).unwrap();
    assert_eq!(totals.attempted, 3);
    assert_eq!(totals.successful, 3);
}

#[tokio::test]
async fn test_unused_attenuator_stays_at_maximum() {
    let bench = Arc::new(
        SimulatedBench::new(500)
            .with_attenuator("A1", AP1)
            .with_attenuator("A2", AP2)
            .with_attenuator("A3", AP3)
            .with_station("1.1.sta0000", "A1"),
    );
    let mut controller = prepare(&bench, settings(&["A1", "A2", "A3"], &["1.1.sta0000"], 2)).await;

    let mut checked = 0;
    loop {
        let phase = controller.advance().await.unwrap();
        if let RunPhase::Ramping { pair: 1, .. } = phase {
            assert_eq!(bench.attenuation("A1"), Some(950));
            checked += 1;
        }
        if phase == RunPhase::RunDone {
            break;
        }
    }
    // 11 steps in each of the two iterations of pair 1
    assert_eq!(checked, 22);
}

#[tokio::test]
async fn test_capture_failure_keeps_partial_results() {
    let bench = Arc::new(two_ap_bench(500).fail_capture_start_at(2));
    let aborted = prepare(&bench, settings(&["A1", "A2"], &["1.1.sta0000"], 1))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        aborted.error,
        RoamError::Capture {
            action: "start capture",
            ..
        }
    ));
    assert_eq!(aborted.partial.committed(), 1);
    assert!(aborted.partial.get(0, 0).is_some());
    assert!(aborted.partial.get(1, 0).is_none());
}

#[tokio::test]
async fn test_capture_stop_failure_keeps_measured_iteration() {
    let bench = Arc::new(two_ap_bench(500).fail_capture_stop_at(1));
    let aborted = prepare(&bench, settings(&["A1", "A2"], &["1.1.sta0000"], 1))
        .await
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        aborted.error,
        RoamError::Capture {
            action: "stop capture",
            ..
        }
    ));
    assert_eq!(aborted.partial.committed(), 1);
    assert!(aborted.partial.get(0, 0).is_some());
    // the failed stop is not sent again while aborting
    let captures = bench.captures();
    assert!(!captures.contains(&CaptureCall::Stop));
    assert_eq!(
        captures
            .iter()
            .filter(|call| matches!(call, CaptureCall::Start { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_dropped_station_reduces_attempts() {
    let bench = Arc::new(two_ap_bench(500));
    bench.silence_station(&sta("1.1.sta0001"));
    let output = prepare(&bench, settings(&["A1", "A2"], &["1.1.sta0000", "1.1.sta0001"], 1))
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(output.dropped_stations, vec![sta("1.1.sta0001")]);
    let first = output.aggregate.get(0, 0).unwrap();
    assert!(!first.events[&sta("1.1.sta0001")].eligible);
    assert!(!output
        .aggregate
        .get(1, 0)
        .unwrap()
        .events
        .contains_key(&sta("1.1.sta0001")));

    let totals = RoamTotals::from_run(&output.aggregate, &[]).unwrap();
    assert_eq!(totals.attempted, 2);
    assert_eq!(totals.successful, 2);
    assert_eq!(totals.per_station_totals[&sta("1.1.sta0001")], 0);
}

#[tokio::test]
async fn test_stations_that_never_roam() {
    let bench = Arc::new(two_ap_bench(2000));
    let output = prepare(&bench, settings(&["A1", "A2"], &["1.1.sta0000", "1.1.sta0001"], 1))
        .await
        .run()
        .await
        .unwrap();

    let totals = RoamTotals::from_run(&output.aggregate, &[bssid(AP1)]).unwrap();
    assert_eq!(
        (totals.attempted, totals.successful, totals.failed),
        (4, 0, 4)
    );
    assert_eq!(totals.per_bssid_totals[&bssid(AP1)], 0);
    assert_eq!(totals.per_station_failed[&sta("1.1.sta0000")], 2);
}

#[tokio::test]
async fn test_stop_request_ends_run_after_step() {
    let bench = Arc::new(two_ap_bench(500));
    let stop = StopSignal::new();
    stop.request_stop();
    let aborted = IterationController::prepare(
        settings(&["A1", "A2"], &["1.1.sta0000"], 1),
        collaborators(&bench),
        stop,
    )
    .await
    .unwrap()
    .run()
    .await
    .unwrap_err();

    assert_eq!(
        aborted.error,
        RoamError::Interrupted {
            pair: 0,
            iteration: 0,
            step: 0
        }
    );
    assert_eq!(aborted.partial.committed(), 0);
    assert_eq!(bench.captures().last(), Some(&CaptureCall::Stop));
}

#[tokio::test]
async fn test_unknown_attenuator_fails_before_any_write() {
    let bench = Arc::new(two_ap_bench(500));
    let result = IterationController::prepare(
        settings(&["A1", "A9"], &["1.1.sta0000"], 1),
        collaborators(&bench),
        StopSignal::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(RoamError::UnknownAttenuator { serial }) if serial == "A9"
    ));
    assert!(bench.writes().is_empty());
}

#[tokio::test]
async fn test_dry_run_writes_results() {
    let result_dir = std::env::temp_dir().join(format!("roamctl-dry-run-{}", std::process::id()));
    let mut config = RoamTestConfig {
        stations: vec!["1.1.sta0000".to_string(), "1.1.sta0001".to_string()],
        attenuators: vec!["1.1.3094".to_string(), "1.1.3095".to_string()],
        bssids: vec![AP1.to_string(), AP2.to_string()],
        iterations: 1,
        result_dir: result_dir.clone(),
        ..Default::default()
    };
    config.capture.settle_ms = 0;

    let run_settings = config.validate().unwrap();
    let bench = Arc::new(simulated_bench(&run_settings));
    let output_dir = execute(&config, run_settings, collaborators(&bench), StopSignal::new())
        .await
        .unwrap();

    let report: RoamReport = read_json(&output_dir.join(RESULTS_FILE)).unwrap();
    assert_eq!(report.totals.attempted, 4);
    assert_eq!(report.totals.successful, 4);
    assert_eq!(report.per_pair.len(), 2);
    assert_eq!(report.per_pair[0].totals.successful, 2);
    assert_eq!(report.capture_files.len(), 2);
    assert!(bench
        .captures()
        .iter()
        .any(|call| matches!(call, CaptureCall::Fetch { .. })));

    std::fs::remove_dir_all(&result_dir).unwrap();
}
