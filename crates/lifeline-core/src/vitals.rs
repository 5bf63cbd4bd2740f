//! Lock-free publication of an astronaut's readings.
//!
//! An [`Astronaut`](crate::Astronaut) is owned and mutated by exactly one
//! session thread. Everyone else (the dispenser computing wait-set priority,
//! the presentation layer polling snapshots) reads through a shared
//! [`Vitals`] cell. The owner republishes after every mutation with
//! `Release` stores; readers use `Acquire` loads.
//!
//! Each field is individually consistent. A reader racing a publish may see
//! the new oxygen with the old fatigue; no consumer relies on cross-field
//! atomicity.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::astronaut::{AstronautSnapshot, AstronautState, Priority};
use crate::id::AstronautId;

/// Shared, read-mostly view of one astronaut.
#[derive(Debug)]
pub struct Vitals {
    id: AstronautId,
    name: String,
    oxygen: AtomicU8,
    fatigue: AtomicU8,
    state: AtomicU8,
    cycles: AtomicU64,
}

// Compile-time assertion: Vitals must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Vitals>();
};

impl Vitals {
    /// Create a vitals cell with an initial reading and zero cycles.
    pub fn new(
        id: AstronautId,
        name: impl Into<String>,
        oxygen: u8,
        fatigue: u8,
        state: AstronautState,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            oxygen: AtomicU8::new(oxygen),
            fatigue: AtomicU8::new(fatigue),
            state: AtomicU8::new(state.as_u8()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Publish a new reading.
    ///
    /// Must only be called by the single writer that owns this astronaut.
    pub fn record(&self, oxygen: u8, fatigue: u8, state: AstronautState, cycles: u64) {
        self.oxygen.store(oxygen, Ordering::Release);
        self.fatigue.store(fatigue, Ordering::Release);
        self.cycles.store(cycles, Ordering::Release);
        // State last: a reader that observes Terminated also observes level 0.
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Astronaut identifier.
    pub fn id(&self) -> AstronautId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest published oxygen level.
    pub fn oxygen(&self) -> u8 {
        self.oxygen.load(Ordering::Acquire)
    }

    /// Latest published fatigue.
    pub fn fatigue(&self) -> u8 {
        self.fatigue.load(Ordering::Acquire)
    }

    /// Latest published state.
    pub fn state(&self) -> AstronautState {
        AstronautState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of effective ticks lived.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Priority derived from the live oxygen level. Never cached.
    pub fn priority(&self) -> Priority {
        Priority::from_oxygen(self.oxygen())
    }

    /// Whether the astronaut has terminated.
    pub fn is_terminated(&self) -> bool {
        self.state() == AstronautState::Terminated
    }

    /// Owned copy of the current reading.
    pub fn snapshot(&self) -> AstronautSnapshot {
        let state = self.state();
        let oxygen = self.oxygen();
        AstronautSnapshot {
            id: self.id,
            name: self.name.clone(),
            oxygen,
            state,
            fatigue: self.fatigue(),
            priority: Priority::from_oxygen(oxygen),
            cycles: self.cycles(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_read_back() {
        let v = Vitals::new(AstronautId(1), "Neil", 100, 0, AstronautState::Normal);
        v.record(8, 12, AstronautState::Emergency, 40);
        assert_eq!(v.oxygen(), 8);
        assert_eq!(v.fatigue(), 12);
        assert_eq!(v.state(), AstronautState::Emergency);
        assert_eq!(v.cycles(), 40);
        assert_eq!(v.priority(), Priority::CRITICAL);
    }

    #[test]
    fn snapshot_carries_derived_priority() {
        let v = Vitals::new(AstronautId(2), "Buzz", 25, 0, AstronautState::Normal);
        let snap = v.snapshot();
        assert_eq!(snap.name, "Buzz");
        assert_eq!(snap.priority, Priority::ELEVATED);
        assert!(!v.is_terminated());
    }

    #[test]
    fn readers_see_updates_across_threads() {
        use std::sync::Arc;

        let v = Arc::new(Vitals::new(AstronautId(3), "Sally", 100, 0, AstronautState::Normal));
        let writer = Arc::clone(&v);
        std::thread::spawn(move || writer.record(0, 0, AstronautState::Terminated, 9))
            .join()
            .unwrap();
        assert!(v.is_terminated());
        assert_eq!(v.oxygen(), 0);
    }
}
