//! Session and simulation configuration, validation, and error types.
//!
//! [`SimulationConfig`] is the input for constructing a
//! [`Simulation`](crate::Simulation). [`validate()`](SimulationConfig::validate)
//! checks structural invariants before any thread is spawned.

use std::time::Duration;

use thiserror::Error;

/// Largest crew a single run accepts.
pub const MAX_CREW: usize = 100;

// ── SessionConfig ─────────────────────────────────────────────────

/// Timing for one astronaut's session loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause between lifecycle ticks. Default: 1000ms.
    pub tick_delay: Duration,
    /// Hold length when the astronaut is in Emergency at grant time.
    /// Default: 800ms.
    pub emergency_hold: Duration,
    /// Hold length otherwise. Default: 1500ms.
    pub standard_hold: Duration,
    /// Maximum time to wait for the dispenser. `None` waits until granted
    /// or stopped. Default: `None`.
    pub acquire_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_delay: Duration::from_millis(1000),
            emergency_hold: Duration::from_millis(800),
            standard_hold: Duration::from_millis(1500),
            acquire_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Hold length for an astronaut that is (or is not) critical.
    pub fn hold_duration(&self, critical: bool) -> Duration {
        if critical {
            self.emergency_hold
        } else {
            self.standard_hold
        }
    }

    /// Check that every duration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_delay.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "tick_delay" });
        }
        if self.emergency_hold.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "emergency_hold",
            });
        }
        if self.standard_hold.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "standard_hold",
            });
        }
        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroDuration {
                field: "acquire_timeout",
            });
        }
        Ok(())
    }
}

// ── SimulationConfig ──────────────────────────────────────────────

/// Configuration for a [`Simulation`](crate::Simulation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Crew size used by
    /// [`start_default`](crate::Simulation::start_default). Default: 5.
    pub crew_size: usize,
    /// Initial oxygen for generated crews; clamped into `[0, 100]`.
    /// Default: 100.
    pub initial_oxygen: i32,
    /// Base seed for per-astronaut respiration. `None` draws one from
    /// OS entropy at each start. Default: `None`.
    pub seed: Option<u64>,
    /// Session loop timing.
    pub session: SessionConfig,
    /// How long `stop()` waits for session threads before detaching them.
    /// Default: 1000ms.
    pub stop_grace: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            crew_size: 5,
            initial_oxygen: 100,
            seed: None,
            session: SessionConfig::default(),
            stop_grace: Duration::from_millis(1000),
        }
    }
}

impl SimulationConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_crew_size(self.crew_size)?;
        self.session.validate()?;
        if self.stop_grace.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "stop_grace",
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_crew_size(crew_size: usize) -> Result<(), ConfigError> {
    if crew_size == 0 || crew_size > MAX_CREW {
        return Err(ConfigError::CrewSizeOutOfRange {
            configured: crew_size,
        });
    }
    Ok(())
}

// ── CrewSpec ──────────────────────────────────────────────────────

/// One astronaut to create at the start of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrewSpec {
    /// Display name.
    pub name: String,
    /// Initial oxygen; clamped into `[0, 100]`.
    pub initial_oxygen: i32,
}

impl CrewSpec {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, initial_oxygen: i32) -> Self {
        Self {
            name: name.into(),
            initial_oxygen,
        }
    }
}

// ── ConfigError ───────────────────────────────────────────────────

/// Errors detected while validating configuration.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration that must be positive was zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },
    /// Crew size outside `1..=MAX_CREW`.
    #[error("crew size {configured} outside 1..={max}", max = MAX_CREW)]
    CrewSizeOutOfRange {
        /// The configured size.
        configured: usize,
    },
}
