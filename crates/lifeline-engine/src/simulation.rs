//! Run coordinator: crew creation, thread lifecycle, observation.
//!
//! A [`Simulation`] owns at most one run at a time. Each run gets a fresh
//! [`Dispenser`] and one named OS thread per astronaut. The coordinator
//! itself never blocks on a session thread except inside [`Simulation::stop`],
//! which is bounded by [`SimulationConfig::stop_grace`].
//!
//! # Stop sequence
//!
//! 1. Close the dispenser (pending requests return `Cancelled`).
//! 2. Request stop on every session (cancel flag, interrupt, unpark).
//! 3. Poll `JoinHandle::is_finished` until all are done or the grace
//!    period expires.
//! 4. Join finished threads, detach the rest.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use lifeline_core::{Astronaut, AstronautId, AstronautSnapshot, Vitals};
use rand::Rng;
use thiserror::Error;

use crate::config::{validate_crew_size, ConfigError, CrewSpec, SessionConfig, SimulationConfig};
use crate::dispenser::{Dispenser, DispenserSnapshot};
use crate::events::{EventBus, SimulationEvent};
use crate::session::{SessionControl, SessionReport, SessionRunner};

/// Golden-ratio increment spreading per-astronaut seeds.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

// ── Errors ───────────────────────────────────────────────────────

/// Errors from the simulation control surface.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// `start` was called while a run is live.
    #[error("simulation is already running")]
    AlreadyRunning,
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The OS refused to spawn a session thread.
    #[error("failed to spawn session thread {name}: {reason}")]
    ThreadSpawnFailed {
        /// Intended thread name.
        name: String,
        /// OS error text.
        reason: String,
    },
}

// ── StopReport ───────────────────────────────────────────────────

/// Result of [`Simulation::stop`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Wall time spent stopping.
    pub total_ms: u64,
    /// Session threads that finished and were joined.
    pub sessions_joined: usize,
    /// Session threads still running when the grace period expired.
    pub sessions_detached: usize,
    /// Reports from joined sessions, in crew order.
    pub reports: Vec<SessionReport>,
}

// ── Simulation ───────────────────────────────────────────────────

#[derive(Debug)]
struct CrewMember {
    vitals: Arc<Vitals>,
    control: Arc<SessionControl>,
    handle: Option<JoinHandle<SessionReport>>,
}

/// Owns the crew, the dispenser, and the session threads of one run.
///
/// Subscriptions made through [`subscribe`](Self::subscribe) outlive runs:
/// a subscriber receives events from every later run as well.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    events: EventBus,
    dispenser: Option<Arc<Dispenser>>,
    crew: Vec<CrewMember>,
    running: bool,
}

impl Simulation {
    /// Validate `config` and build an idle simulation.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Self {
            config,
            events: EventBus::new(),
            dispenser: None,
            crew: Vec::new(),
            running: false,
        })
    }

    /// Start a run of `crew_size` generated astronauts named
    /// `"Astronaut 1"`, `"Astronaut 2"`, and so on, all at the configured
    /// initial oxygen, ticking every `tick_delay`.
    ///
    /// State from a previous, stopped run is discarded.
    pub fn start(&mut self, crew_size: usize, tick_delay: Duration) -> Result<(), SimulationError> {
        validate_crew_size(crew_size)?;
        let session = SessionConfig {
            tick_delay,
            ..self.config.session.clone()
        };
        session.validate()?;
        let crew = (1..=crew_size)
            .map(|i| CrewSpec::new(format!("Astronaut {i}"), self.config.initial_oxygen))
            .collect();
        self.launch(crew, session)
    }

    /// Start a run sized by [`SimulationConfig::crew_size`] and timed by
    /// [`SimulationConfig::session`].
    pub fn start_default(&mut self) -> Result<(), SimulationError> {
        self.start(self.config.crew_size, self.config.session.tick_delay)
    }

    /// Start a run with explicit names and initial levels.
    pub fn start_crew(&mut self, crew: Vec<CrewSpec>) -> Result<(), SimulationError> {
        validate_crew_size(crew.len())?;
        let session = self.config.session.clone();
        self.launch(crew, session)
    }

    fn launch(&mut self, crew: Vec<CrewSpec>, session: SessionConfig) -> Result<(), SimulationError> {
        if self.running {
            return Err(SimulationError::AlreadyRunning);
        }
        self.discard();

        let base_seed = self.config.seed.unwrap_or_else(|| rand::rng().random());
        let dispenser = Arc::new(Dispenser::with_events(self.events.clone()));
        self.dispenser = Some(Arc::clone(&dispenser));
        self.running = true;

        tracing::info!(
            crew = crew.len(),
            tick_delay_ms = session.tick_delay.as_millis() as u64,
            seed = base_seed,
            "simulation starting"
        );

        for (i, recruit) in crew.into_iter().enumerate() {
            let n = i + 1;
            let astronaut = Astronaut::new(
                AstronautId(n as u32),
                recruit.name,
                recruit.initial_oxygen,
                seed_for(base_seed, n),
            );
            let vitals = Arc::clone(astronaut.vitals());
            let control = Arc::new(SessionControl::new(Arc::clone(&dispenser)));
            let runner = SessionRunner::new(
                astronaut,
                Arc::clone(&control),
                session.clone(),
                self.events.clone(),
            );

            let name = format!("lifeline-session-{n}");
            match thread::Builder::new()
                .name(name.clone())
                .spawn(move || runner.run())
            {
                Ok(handle) => self.crew.push(CrewMember {
                    vitals,
                    control,
                    handle: Some(handle),
                }),
                Err(e) => {
                    tracing::error!(thread = %name, error = %e, "session spawn failed");
                    self.stop();
                    return Err(SimulationError::ThreadSpawnFailed {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Stop the current run.
    ///
    /// Safe while acquires are in flight. Waits up to
    /// [`stop_grace`](SimulationConfig::stop_grace) for session threads;
    /// threads still running after that are detached. Astronaut and
    /// dispenser state stay observable until the next start or
    /// [`reset`](Self::reset). A no-op if nothing is running.
    pub fn stop(&mut self) -> StopReport {
        if !self.running {
            return StopReport::default();
        }
        let start = Instant::now();

        if let Some(dispenser) = &self.dispenser {
            dispenser.close();
        }
        for member in &self.crew {
            member.control.request_stop();
        }

        // A grace period past the end of the clock waits for every session.
        let deadline = start.checked_add(self.config.stop_grace);
        while !self.all_finished() && deadline.is_none_or(|d| Instant::now() < d) {
            thread::sleep(Duration::from_millis(1));
        }

        let mut report = StopReport::default();
        for member in &mut self.crew {
            let Some(handle) = member.handle.take() else {
                continue;
            };
            if !handle.is_finished() {
                tracing::warn!(
                    astronaut = %member.vitals.id(),
                    "session did not stop within grace period, detaching"
                );
                report.sessions_detached += 1;
                continue;
            }
            match handle.join() {
                Ok(session) => report.reports.push(session),
                Err(_) => {
                    tracing::error!(astronaut = %member.vitals.id(), "session thread panicked");
                }
            }
            report.sessions_joined += 1;
        }

        self.running = false;
        report.total_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            total_ms = report.total_ms,
            joined = report.sessions_joined,
            detached = report.sessions_detached,
            "simulation stopped"
        );
        report
    }

    /// Stop, then discard every astronaut and the dispenser.
    pub fn reset(&mut self) {
        self.stop();
        self.discard();
    }

    fn discard(&mut self) {
        self.crew.clear();
        self.dispenser = None;
    }

    fn all_finished(&self) -> bool {
        self.crew
            .iter()
            .all(|m| m.handle.as_ref().is_none_or(|h| h.is_finished()))
    }

    /// Whether a run is live.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Latest readings of every astronaut, in crew order.
    pub fn crew_snapshot(&self) -> Vec<AstronautSnapshot> {
        self.crew.iter().map(|m| m.vitals.snapshot()).collect()
    }

    /// Dispenser state of the current (or last stopped) run.
    pub fn dispenser_snapshot(&self) -> Option<DispenserSnapshot> {
        self.dispenser.as_ref().map(|d| d.snapshot())
    }

    /// The dispenser of the current (or last stopped) run.
    pub fn dispenser(&self) -> Option<&Arc<Dispenser>> {
        self.dispenser.as_ref()
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<SimulationEvent> {
        self.events.subscribe()
    }

    /// The validated configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.running {
            self.stop();
        }
    }
}

fn seed_for(base: u64, n: usize) -> u64 {
    base ^ (n as u64).wrapping_mul(SEED_STRIDE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> SimulationConfig {
        SimulationConfig {
            seed: Some(7),
            session: SessionConfig {
                tick_delay: Duration::from_millis(5),
                emergency_hold: Duration::from_millis(2),
                standard_hold: Duration::from_millis(3),
                acquire_timeout: None,
            },
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SimulationConfig {
            crew_size: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(
            Simulation::new(cfg).unwrap_err(),
            SimulationError::Config(ConfigError::CrewSizeOutOfRange { configured: 0 })
        );
    }

    #[test]
    fn start_rejects_bad_arguments() {
        let mut sim = Simulation::new(quick_config()).unwrap();
        assert!(matches!(
            sim.start(0, Duration::from_millis(5)),
            Err(SimulationError::Config(_))
        ));
        assert!(matches!(
            sim.start(3, Duration::ZERO),
            Err(SimulationError::Config(ConfigError::ZeroDuration { .. }))
        ));
        assert!(matches!(
            sim.start_crew(Vec::new()),
            Err(SimulationError::Config(_))
        ));
        assert!(!sim.is_running());
    }

    #[test]
    fn second_start_while_running_fails() {
        let mut sim = Simulation::new(quick_config()).unwrap();
        sim.start(2, Duration::from_millis(5)).unwrap();
        assert_eq!(
            sim.start(2, Duration::from_millis(5)),
            Err(SimulationError::AlreadyRunning)
        );
        sim.stop();
    }

    #[test]
    fn generated_crew_is_named_and_numbered() {
        let mut sim = Simulation::new(quick_config()).unwrap();
        sim.start(3, Duration::from_millis(5)).unwrap();
        let crew = sim.crew_snapshot();
        let names: Vec<&str> = crew.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Astronaut 1", "Astronaut 2", "Astronaut 3"]);
        assert_eq!(crew[2].id, AstronautId(3));
        sim.stop();
    }

    #[test]
    fn stop_joins_everyone_and_is_idempotent() {
        let mut sim = Simulation::new(quick_config()).unwrap();
        sim.start(4, Duration::from_millis(5)).unwrap();
        let report = sim.stop();
        assert_eq!(report.sessions_joined, 4);
        assert_eq!(report.sessions_detached, 0);
        assert_eq!(report.reports.len(), 4);
        assert!(!sim.is_running());
        assert_eq!(sim.stop(), StopReport::default());
        // State survives stop until reset.
        assert_eq!(sim.crew_snapshot().len(), 4);
        assert!(sim.dispenser_snapshot().is_some_and(|d| d.closed));
    }

    #[test]
    fn reset_discards_state() {
        let mut sim = Simulation::new(quick_config()).unwrap();
        sim.start(2, Duration::from_millis(5)).unwrap();
        sim.reset();
        assert!(!sim.is_running());
        assert!(sim.crew_snapshot().is_empty());
        assert!(sim.dispenser_snapshot().is_none());
        sim.start(1, Duration::from_millis(5)).unwrap();
        assert_eq!(sim.crew_snapshot().len(), 1);
    }

    #[test]
    fn start_default_uses_configured_crew_size() {
        let cfg = SimulationConfig {
            crew_size: 2,
            ..quick_config()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        sim.start_default().unwrap();
        assert_eq!(sim.crew_snapshot().len(), 2);
        assert_eq!(sim.stop().sessions_joined, 2);
    }

    #[test]
    fn unbounded_grace_waits_for_every_session() {
        let cfg = SimulationConfig {
            stop_grace: Duration::MAX,
            ..quick_config()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        sim.start(3, Duration::from_millis(5)).unwrap();
        let report = sim.stop();
        assert_eq!(report.sessions_joined, 3);
        assert_eq!(report.sessions_detached, 0);
    }

    #[test]
    fn per_astronaut_seeds_differ() {
        let seeds: Vec<u64> = (1..=10).map(|n| seed_for(42, n)).collect();
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(seed_for(42, 3), seed_for(42, 3));
    }
}
