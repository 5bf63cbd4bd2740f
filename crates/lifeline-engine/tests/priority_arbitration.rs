//! Dispenser ordering under contention.
//!
//! Every scenario parks a blocker in the dispenser, lines up waiters while
//! it holds, then frees it and records the grant order from the event
//! stream.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lifeline_core::{AstronautId, AstronautState, DispenserError, Priority, Vitals};
use lifeline_engine::{CancelFlag, Dispenser, EventBus, SimulationEvent};
use lifeline_test_utils::{vitals_at, wait_until, EventLog};
use proptest::prelude::*;

const BOUND: Duration = Duration::from_secs(5);
const BLOCKER: u32 = 999;

fn dispenser_with_log() -> (Arc<Dispenser>, EventLog<SimulationEvent>) {
    let bus = EventBus::new();
    let log = EventLog::new(bus.subscribe());
    (Arc::new(Dispenser::with_events(bus)), log)
}

/// Spawn a waiter that grabs the dispenser and lets go immediately.
fn queue(dispenser: &Arc<Dispenser>, vitals: Arc<Vitals>) -> JoinHandle<Result<(), DispenserError>> {
    let before = dispenser.waiting_count();
    let d = Arc::clone(dispenser);
    let handle = thread::spawn(move || d.acquire(&vitals, None, &CancelFlag::new())?.release());
    assert!(
        wait_until(BOUND, || dispenser.waiting_count() == before + 1),
        "waiter never queued"
    );
    handle
}

fn grant_order(log: &EventLog<SimulationEvent>) -> Vec<u32> {
    log.events()
        .iter()
        .filter_map(|e| match e {
            SimulationEvent::AccessGranted { astronaut, .. } if astronaut.0 != BLOCKER => {
                Some(astronaut.0)
            }
            _ => None,
        })
        .collect()
}

fn run_scenario(levels: &[(u32, u8)]) -> Vec<u32> {
    let (dispenser, mut log) = dispenser_with_log();
    let blocker = vitals_at(BLOCKER, 50);
    let hold = dispenser
        .acquire(&blocker, None, &CancelFlag::new())
        .unwrap();

    let handles: Vec<_> = levels
        .iter()
        .map(|&(id, oxygen)| queue(&dispenser, vitals_at(id, oxygen)))
        .collect();

    hold.release().unwrap();
    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert!(log.wait_for(BOUND, |events| {
        events
            .iter()
            .filter(|e| matches!(e, SimulationEvent::AccessReleased { .. }))
            .count()
            == levels.len() + 1
    }));
    grant_order(&log)
}

#[test]
fn critical_beats_low_in_same_window() {
    assert_eq!(run_scenario(&[(2, 60), (1, 5)]), vec![1, 2]);
}

#[test]
fn late_emergency_overtakes_earlier_low_priority_waiter() {
    assert_eq!(run_scenario(&[(1, 80), (2, 90), (3, 3)]), vec![3, 1, 2]);
}

#[test]
fn four_astronaut_demo_order() {
    // Started in reverse priority order.
    let order = run_scenario(&[(4, 60), (3, 25), (2, 12), (1, 5)]);
    assert_eq!(order, vec![1, 2, 3, 4]);
}

#[test]
fn equal_priority_is_first_come_first_served() {
    assert_eq!(run_scenario(&[(1, 15), (2, 12), (3, 18)]), vec![1, 2, 3]);
}

#[test]
fn level_drop_while_waiting_raises_priority() {
    let (dispenser, mut log) = dispenser_with_log();
    let blocker = vitals_at(BLOCKER, 50);
    let hold = dispenser
        .acquire(&blocker, None, &CancelFlag::new())
        .unwrap();

    let first = queue(&dispenser, vitals_at(1, 25));
    let sinking = vitals_at(2, 28);
    let second = queue(&dispenser, Arc::clone(&sinking));

    // Astronaut 2 keeps breathing while it waits.
    sinking.record(7, 0, AstronautState::Emergency, 12);
    let snap = dispenser.snapshot();
    assert_eq!(snap.waiting[0].astronaut, AstronautId(2));

    hold.release().unwrap();
    first.join().unwrap().unwrap();
    second.join().unwrap().unwrap();
    assert!(log.wait_for(BOUND, |e| e.len() >= 8));
    assert_eq!(grant_order(&log), vec![2, 1]);
}

#[test]
fn active_hold_is_never_preempted() {
    let (dispenser, _log) = dispenser_with_log();
    let holder = vitals_at(1, 80);
    let hold = dispenser.acquire(&holder, None, &CancelFlag::new()).unwrap();

    let urgent = queue(&dispenser, vitals_at(2, 1));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(dispenser.holder(), Some(AstronautId(1)));

    hold.release().unwrap();
    urgent.join().unwrap().unwrap();
}

#[test]
fn unreleased_hold_keeps_waiters_queued_and_queries_responsive() {
    let dispenser = Arc::new(Dispenser::new());
    let holder = vitals_at(1, 50);
    let hold = dispenser.acquire(&holder, None, &CancelFlag::new()).unwrap();
    std::mem::forget(hold);

    let cancel = CancelFlag::new();
    let waiters: Vec<_> = (2..=4)
        .map(|id| {
            let d = Arc::clone(&dispenser);
            let c = cancel.clone();
            let before = dispenser.waiting_count();
            let h = thread::spawn(move || d.acquire(&vitals_at(id, 10), None, &c).map(|_| ()));
            assert!(wait_until(BOUND, || dispenser.waiting_count() == before + 1));
            h
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    assert!(dispenser.waiting_count() > 0);
    assert!(dispenser.is_busy());
    assert_eq!(dispenser.snapshot().waiting.len(), 3);

    cancel.cancel();
    dispenser.interrupt();
    for w in waiters {
        assert!(matches!(
            w.join().unwrap(),
            Err(DispenserError::Cancelled { .. })
        ));
    }
    assert_eq!(dispenser.waiting_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn grants_follow_priority_then_arrival(
        levels in prop::collection::vec(1u8..=100, 1..6),
    ) {
        let scenario: Vec<(u32, u8)> = levels
            .iter()
            .enumerate()
            .map(|(i, &oxygen)| (i as u32 + 1, oxygen))
            .collect();

        let mut expected = scenario.clone();
        expected.sort_by_key(|&(id, oxygen)| {
            (std::cmp::Reverse(Priority::from_oxygen(oxygen)), id)
        });
        let expected: Vec<u32> = expected.into_iter().map(|(id, _)| id).collect();

        prop_assert_eq!(run_scenario(&scenario), expected);
    }
}
