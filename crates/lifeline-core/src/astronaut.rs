//! The astronaut: a resource consumer with an urgency state machine.
//!
//! # States
//!
//! ```text
//!            level < 10              level == 0
//!   Normal ─────────────► Emergency ───────────► Terminated
//!     ▲  └──────────────────────────────────────────▲
//!     │                level == 0
//!     │ next tick / complete_recovery()
//!     │
//!   Recovering ◄──── replenish() (any non-terminal state)
//! ```
//!
//! Terminated is permanent. An astronaut is mutated only by its own
//! session thread; every mutation is republished to the shared
//! [`Vitals`] cell so other threads can read it without locking.

use std::fmt;
use std::sync::Arc;

use crate::id::AstronautId;
use crate::respiration::{Respiration, SeededRespiration, BASE_DRAW_MAX, BASE_DRAW_MIN};
use crate::vitals::Vitals;

/// Full tank.
pub const OXYGEN_MAX: u8 = 100;

/// Below this level the astronaut enters [`AstronautState::Emergency`].
pub const EMERGENCY_THRESHOLD: u8 = 10;

/// Below this level the astronaut asks for the dispenser.
pub const REPLENISH_THRESHOLD: u8 = 30;

/// Fatigue ceiling.
pub const FATIGUE_MAX: u8 = 100;

/// Fatigue rises on every N-th tick.
const FATIGUE_CADENCE: u64 = 4;
const FATIGUE_GAIN: u8 = 5;
const REST_RELIEF: u8 = 3;
const REFILL_RELIEF: u8 = 40;
/// Hyperventilation.
const EMERGENCY_PENALTY: u8 = 2;
const FATIGUE_PENALTY_DIVISOR: u8 = 30;

// ── AstronautState ───────────────────────────────────────────────

/// Urgency-derived state of an astronaut.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AstronautState {
    /// Breathing normally.
    Normal,
    /// Oxygen critically low; consumption is penalised.
    Emergency,
    /// Just refilled; returns to Normal after one tick.
    Recovering,
    /// Out of oxygen. Terminal.
    Terminated,
}

impl AstronautState {
    /// Human-readable label for display layers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Emergency => "Emergency",
            Self::Recovering => "Recovering",
            Self::Terminated => "Terminated",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Emergency => 1,
            Self::Recovering => 2,
            Self::Terminated => 3,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Emergency,
            2 => Self::Recovering,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for AstronautState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Priority ─────────────────────────────────────────────────────

/// Dispenser ordering rank. Higher is more urgent.
///
/// Always derived from the current oxygen level via
/// [`Priority::from_oxygen`]; nothing stores a priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(pub u8);

impl Priority {
    /// Level 30 and above.
    pub const LOW: Priority = Priority(1);
    /// Level in `[20, 30)`.
    pub const ELEVATED: Priority = Priority(2);
    /// Level in `[10, 20)`.
    pub const HIGH: Priority = Priority(3);
    /// Level below 10.
    pub const CRITICAL: Priority = Priority(4);

    /// Monotone mapping from oxygen level to priority.
    pub fn from_oxygen(oxygen: u8) -> Self {
        match oxygen {
            0..=9 => Self::CRITICAL,
            10..=19 => Self::HIGH,
            20..=29 => Self::ELEVATED,
            _ => Self::LOW,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// ── AstronautSnapshot ────────────────────────────────────────────

/// Owned, point-in-time reading of one astronaut for display layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AstronautSnapshot {
    /// Astronaut identifier.
    pub id: AstronautId,
    /// Display name.
    pub name: String,
    /// Oxygen level in `[0, 100]`.
    pub oxygen: u8,
    /// Current state.
    pub state: AstronautState,
    /// Fatigue in `[0, 100]`.
    pub fatigue: u8,
    /// Priority derived from `oxygen`.
    pub priority: Priority,
    /// Effective ticks lived.
    pub cycles: u64,
}

// ── Astronaut ────────────────────────────────────────────────────

/// A single resource consumer.
///
/// Generic over its [`Respiration`] source so tests can script the
/// per-tick random draws. Production code uses [`SeededRespiration`].
#[derive(Debug)]
pub struct Astronaut<S = SeededRespiration> {
    vitals: Arc<Vitals>,
    oxygen: u8,
    fatigue: u8,
    state: AstronautState,
    active: bool,
    cycles: u64,
    respiration: S,
}

impl Astronaut<SeededRespiration> {
    /// Create an astronaut breathing from a seeded RNG.
    ///
    /// `initial_oxygen` is clamped into `[0, 100]`.
    pub fn new(id: AstronautId, name: impl Into<String>, initial_oxygen: i32, seed: u64) -> Self {
        Self::with_respiration(id, name, initial_oxygen, SeededRespiration::new(seed))
    }
}

impl<S: Respiration> Astronaut<S> {
    /// Create an astronaut with an explicit respiration source.
    ///
    /// `initial_oxygen` is clamped into `[0, 100]`; out-of-range input is
    /// normalised rather than rejected.
    pub fn with_respiration(
        id: AstronautId,
        name: impl Into<String>,
        initial_oxygen: i32,
        respiration: S,
    ) -> Self {
        let oxygen = initial_oxygen.clamp(0, OXYGEN_MAX as i32) as u8;
        let state = AstronautState::Normal;
        Self {
            vitals: Arc::new(Vitals::new(id, name, oxygen, 0, state)),
            oxygen,
            fatigue: 0,
            state,
            active: true,
            cycles: 0,
            respiration,
        }
    }

    /// Live one lifecycle tick: fatigue, consumption, threshold checks.
    ///
    /// Returns the oxygen consumed, or 0 if the astronaut is terminated or
    /// inactive (in which case nothing changes).
    pub fn tick(&mut self) -> u8 {
        if !self.active || self.state == AstronautState::Terminated {
            return 0;
        }

        self.cycles += 1;

        // One-tick cooldown after a refill.
        if self.state == AstronautState::Recovering {
            self.state = AstronautState::Normal;
        }

        self.update_fatigue();

        let consumption = self.consumption();
        self.oxygen = self.oxygen.saturating_sub(consumption);

        if self.oxygen == 0 {
            self.state = AstronautState::Terminated;
            self.active = false;
        } else if self.oxygen < EMERGENCY_THRESHOLD {
            self.state = AstronautState::Emergency;
        }

        self.publish();
        consumption
    }

    fn update_fatigue(&mut self) {
        if self.cycles % FATIGUE_CADENCE == 0 {
            self.fatigue = self.fatigue.saturating_add(FATIGUE_GAIN).min(FATIGUE_MAX);
        }
        if self.respiration.rests() {
            self.fatigue = self.fatigue.saturating_sub(REST_RELIEF);
        }
    }

    fn consumption(&mut self) -> u8 {
        let mut draw = self
            .respiration
            .base_draw()
            .clamp(BASE_DRAW_MIN, BASE_DRAW_MAX);
        if self.state == AstronautState::Emergency {
            draw += EMERGENCY_PENALTY;
        }
        draw + self.fatigue / FATIGUE_PENALTY_DIVISOR
    }

    /// Whether the astronaut should ask for the dispenser.
    pub fn needs_replenishment(&self) -> bool {
        self.oxygen < REPLENISH_THRESHOLD && self.state != AstronautState::Terminated
    }

    /// Whether the astronaut is in [`AstronautState::Emergency`].
    pub fn is_critical(&self) -> bool {
        self.state == AstronautState::Emergency
    }

    /// Priority derived from the current level.
    pub fn priority(&self) -> Priority {
        Priority::from_oxygen(self.oxygen)
    }

    /// Refill to 100 and shed fatigue. No-op if terminated.
    pub fn replenish(&mut self) {
        if self.state == AstronautState::Terminated {
            return;
        }
        self.oxygen = OXYGEN_MAX;
        self.fatigue = self.fatigue.saturating_sub(REFILL_RELIEF);
        self.state = AstronautState::Recovering;
        self.publish();
    }

    /// Leave [`AstronautState::Recovering`]. No-op in any other state.
    pub fn complete_recovery(&mut self) {
        if self.state == AstronautState::Recovering {
            self.state = AstronautState::Normal;
            self.publish();
        }
    }

    /// Terminated with an empty tank.
    pub fn has_failed_mission(&self) -> bool {
        self.state == AstronautState::Terminated && self.oxygen == 0
    }

    /// Stop ticking without terminating. Further ticks are no-ops.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Astronaut identifier.
    pub fn id(&self) -> AstronautId {
        self.vitals.id()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        self.vitals.name()
    }

    /// Oxygen level in `[0, 100]`.
    pub fn oxygen(&self) -> u8 {
        self.oxygen
    }

    /// Fatigue in `[0, 100]`.
    pub fn fatigue(&self) -> u8 {
        self.fatigue
    }

    /// Current state.
    pub fn state(&self) -> AstronautState {
        self.state
    }

    /// Effective ticks lived.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether ticks still have an effect.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Shared vitals cell for readers on other threads.
    pub fn vitals(&self) -> &Arc<Vitals> {
        &self.vitals
    }

    /// Owned point-in-time reading.
    pub fn snapshot(&self) -> AstronautSnapshot {
        AstronautSnapshot {
            id: self.id(),
            name: self.name().to_string(),
            oxygen: self.oxygen,
            state: self.state,
            fatigue: self.fatigue,
            priority: self.priority(),
            cycles: self.cycles,
        }
    }

    fn publish(&self) {
        self.vitals
            .record(self.oxygen, self.fatigue, self.state, self.cycles);
    }
}

impl<S> fmt::Display for Astronaut<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | O2: {}% | fatigue: {} | state: {} | cycles: {}",
            self.vitals.name(),
            self.oxygen,
            self.fatigue,
            self.state,
            self.cycles
        )
    }
}
