//! End-to-end runs through the `Simulation` control surface.

use std::time::Duration;

use lifeline_core::{AstronautState, OXYGEN_MAX};
use lifeline_engine::{
    CrewSpec, SessionConfig, SessionOutcome, Simulation, SimulationConfig, SimulationEvent,
};
use lifeline_test_utils::{wait_until, EventLog};

const BOUND: Duration = Duration::from_secs(10);

fn fast(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed: Some(seed),
        session: SessionConfig {
            tick_delay: Duration::from_millis(2),
            emergency_hold: Duration::from_millis(2),
            standard_hold: Duration::from_millis(3),
            acquire_timeout: None,
        },
        ..SimulationConfig::default()
    }
}

#[test]
fn crew_keeps_breathing_with_refills() {
    let mut sim = Simulation::new(fast(11)).unwrap();
    let mut log = EventLog::new(sim.subscribe());
    sim.start_crew(vec![CrewSpec::new("Neil", 40), CrewSpec::new("Buzz", 45)])
        .unwrap();

    assert!(log.wait_for(BOUND, |events| {
        events
            .iter()
            .filter(|e| matches!(e, SimulationEvent::AccessReleased { .. }))
            .count()
            >= 4
    }));

    let report = sim.stop();
    assert!(report.reports.iter().all(|r| r.outcome == SessionOutcome::Stopped));
    assert!(report.reports.iter().map(|r| r.refills).sum::<u64>() >= 4);
    for a in sim.crew_snapshot() {
        assert_ne!(a.state, AstronautState::Terminated);
        assert!(a.oxygen <= OXYGEN_MAX);
    }

    let metrics = sim.dispenser_snapshot().unwrap().metrics;
    assert_eq!(metrics.grants, metrics.releases);
}

#[test]
fn grant_and_release_alternate_per_holder() {
    let mut sim = Simulation::new(fast(12)).unwrap();
    let mut log = EventLog::new(sim.subscribe());
    sim.start(4, Duration::from_millis(1)).unwrap();
    assert!(log.wait_for(BOUND, |events| {
        events
            .iter()
            .filter(|e| matches!(e, SimulationEvent::AccessGranted { .. }))
            .count()
            >= 10
    }));
    sim.stop();
    log.pump();

    let mut holder = None;
    for event in log.events() {
        match event {
            SimulationEvent::AccessGranted { astronaut, .. } => {
                assert_eq!(holder, None, "grant while {holder:?} held");
                holder = Some(*astronaut);
            }
            SimulationEvent::AccessReleased { astronaut, .. } => {
                assert_eq!(holder, Some(*astronaut));
                holder = None;
            }
            _ => {}
        }
    }
}

#[test]
fn starved_crew_fails_mission() {
    let config = SimulationConfig {
        session: SessionConfig {
            emergency_hold: Duration::from_secs(30),
            standard_hold: Duration::from_secs(30),
            acquire_timeout: Some(Duration::from_millis(5)),
            ..fast(13).session
        },
        ..fast(13)
    };
    let mut sim = Simulation::new(config).unwrap();
    let mut log = EventLog::new(sim.subscribe());
    // Both start low; whoever wins the first grant holds for 30s.
    sim.start_crew(vec![CrewSpec::new("Neil", 12), CrewSpec::new("Buzz", 12)])
        .unwrap();

    assert!(log.wait_for(BOUND, |events| {
        events
            .iter()
            .any(|e| matches!(e, SimulationEvent::MissionFailed { .. }))
    }));
    let report = sim.stop();
    let failed: Vec<_> = report
        .reports
        .iter()
        .filter(|r| r.outcome == SessionOutcome::MissionFailed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].final_oxygen, 0);
    assert!(failed[0].timeouts >= 1);
    assert!(sim
        .crew_snapshot()
        .iter()
        .any(|a| a.state == AstronautState::Terminated && a.oxygen == 0));
}

#[test]
fn subscriptions_survive_reset() {
    let mut sim = Simulation::new(fast(14)).unwrap();
    let mut log = EventLog::new(sim.subscribe());

    sim.start_crew(vec![CrewSpec::new("Sally", 31)]).unwrap();
    assert!(log.wait_for(BOUND, |e| !e.is_empty()));
    sim.reset();
    assert!(sim.crew_snapshot().is_empty());

    let before = log.pump().len();
    sim.start_crew(vec![CrewSpec::new("Chris", 31)]).unwrap();
    assert!(log.wait_for(BOUND, |e| e.len() > before));
    assert!(wait_until(BOUND, || sim
        .crew_snapshot()
        .first()
        .is_some_and(|a| a.cycles > 0)));
    sim.stop();
    assert_eq!(sim.crew_snapshot()[0].name, "Chris");
}

#[test]
fn restart_after_stop_starts_fresh() {
    let mut sim = Simulation::new(fast(15)).unwrap();
    sim.start(2, Duration::from_millis(2)).unwrap();
    sim.stop();
    sim.start(3, Duration::from_millis(2)).unwrap();
    assert!(sim.is_running());
    assert_eq!(sim.crew_snapshot().len(), 3);
    let snap = sim.dispenser_snapshot().unwrap();
    assert!(!snap.closed);
    sim.stop();
}
