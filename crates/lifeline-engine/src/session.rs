//! Per-astronaut session loop and its stop control.
//!
//! Each astronaut runs on its own OS thread inside a [`SessionRunner`]. The
//! runner ticks the astronaut, requests the dispenser when the level falls
//! below the refill threshold, and sleeps between ticks. Sleeps and holds
//! are `park_timeout` loops, so [`SessionControl::request_stop`] ends them
//! immediately with an `unpark`.
//!
//! # Stop state machine
//!
//! ```text
//! Running ──request_stop()──► Stopping ──run() returns──► Stopped
//! ```
//!
//! `request_stop` raises the runner's [`CancelFlag`], interrupts the
//! dispenser (so a blocked `acquire` re-checks the flag), then unparks the
//! runner thread.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use lifeline_core::{Astronaut, AstronautId, DispenserError, Respiration, SeededRespiration};

use crate::config::SessionConfig;
use crate::dispenser::{CancelFlag, Dispenser};
use crate::events::{EventBus, SimulationEvent};

// ── SessionControl ───────────────────────────────────────────────

/// Lifecycle phase of one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// The loop is live.
    Running,
    /// A stop was requested; the loop has not returned yet.
    Stopping,
    /// The loop has returned.
    Stopped,
}

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Shared stop handle for one [`SessionRunner`].
///
/// The coordinator keeps an `Arc<SessionControl>` per astronaut and calls
/// [`request_stop`](Self::request_stop) from any thread.
#[derive(Debug)]
pub struct SessionControl {
    phase: AtomicU8,
    cancel: CancelFlag,
    dispenser: Arc<Dispenser>,
    waker: OnceLock<Thread>,
}

impl SessionControl {
    /// A running control bound to `dispenser`.
    pub fn new(dispenser: Arc<Dispenser>) -> Self {
        Self {
            phase: AtomicU8::new(RUNNING),
            cancel: CancelFlag::new(),
            dispenser,
            waker: OnceLock::new(),
        }
    }

    /// Ask the session to stop. Idempotent; never blocks on the runner.
    pub fn request_stop(&self) {
        let _ = self
            .phase
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire);
        self.cancel.cancel();
        self.dispenser.interrupt();
        if let Some(thread) = self.waker.get() {
            thread.unpark();
        }
    }

    /// Whether a stop has been requested (or the session already stopped).
    pub fn is_stop_requested(&self) -> bool {
        self.phase.load(Ordering::Acquire) != RUNNING
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        match self.phase.load(Ordering::Acquire) {
            RUNNING => SessionPhase::Running,
            STOPPING => SessionPhase::Stopping,
            _ => SessionPhase::Stopped,
        }
    }

    /// Cancel flag passed to every acquire of this session.
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// The dispenser this session requests from.
    pub fn dispenser(&self) -> &Arc<Dispenser> {
        &self.dispenser
    }

    fn register_runner(&self) {
        let _ = self.waker.set(thread::current());
    }

    fn mark_stopped(&self) {
        self.phase.store(STOPPED, Ordering::Release);
    }
}

// ── SessionReport ────────────────────────────────────────────────

/// Why a session loop returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stopped by request or by dispenser shutdown.
    Stopped,
    /// The astronaut ran out of oxygen.
    MissionFailed,
    /// The runner hit an unrecoverable dispenser error.
    Halted(DispenserError),
}

/// Summary returned by [`SessionRunner::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    /// Astronaut identifier.
    pub astronaut: AstronautId,
    /// Display name.
    pub name: String,
    /// Why the loop returned.
    pub outcome: SessionOutcome,
    /// Effective ticks lived.
    pub cycles: u64,
    /// Completed refills.
    pub refills: u64,
    /// Requests that timed out.
    pub timeouts: u64,
    /// Oxygen level when the loop returned.
    pub final_oxygen: u8,
}

// ── SessionRunner ────────────────────────────────────────────────

/// Drives one astronaut on the current thread.
pub struct SessionRunner<S = SeededRespiration> {
    astronaut: Astronaut<S>,
    dispenser: Arc<Dispenser>,
    control: Arc<SessionControl>,
    config: SessionConfig,
    events: EventBus,
    /// Keeps the one-request-per-astronaut rule explicit in the loop; the
    /// dispenser also rejects a second request with `AlreadyWaiting`.
    request_in_flight: bool,
    refills: u64,
    timeouts: u64,
}

impl<S: Respiration> SessionRunner<S> {
    /// Bind `astronaut` to the dispenser behind `control`.
    pub fn new(
        astronaut: Astronaut<S>,
        control: Arc<SessionControl>,
        config: SessionConfig,
        events: EventBus,
    ) -> Self {
        Self {
            astronaut,
            dispenser: Arc::clone(control.dispenser()),
            control,
            config,
            events,
            request_in_flight: false,
            refills: 0,
            timeouts: 0,
        }
    }

    /// The stop handle for this runner.
    pub fn control(&self) -> &Arc<SessionControl> {
        &self.control
    }

    /// Run until stopped, the mission fails, or the runner halts.
    pub fn run(mut self) -> SessionReport {
        self.control.register_runner();
        let id = self.astronaut.id();
        let span = tracing::info_span!("session", astronaut = %id);
        let _entered = span.enter();
        tracing::info!(
            crew_member = self.astronaut.name(),
            oxygen = self.astronaut.oxygen(),
            "session started"
        );

        let outcome = loop {
            if self.control.is_stop_requested() {
                break SessionOutcome::Stopped;
            }

            self.astronaut.tick();

            if self.astronaut.has_failed_mission() {
                tracing::info!(cycles = self.astronaut.cycles(), "mission failed");
                self.events.publish(SimulationEvent::MissionFailed {
                    astronaut: id,
                    name: self.astronaut.name().to_string(),
                    cycles: self.astronaut.cycles(),
                });
                break SessionOutcome::MissionFailed;
            }

            if self.astronaut.needs_replenishment() && !self.request_in_flight {
                match self.refill() {
                    Ok(()) => {}
                    Err(e @ DispenserError::Timeout { .. }) => {
                        self.timeouts += 1;
                        tracing::warn!(error = %e, "refill timed out, retrying later");
                    }
                    Err(DispenserError::Cancelled { .. }) => break SessionOutcome::Stopped,
                    Err(e @ DispenserError::InvalidRequest { .. }) => {
                        tracing::warn!(error = %e, "refill request refused");
                    }
                    Err(e @ DispenserError::IllegalRelease { .. }) => {
                        tracing::error!(error = %e, "session halted");
                        break SessionOutcome::Halted(e);
                    }
                }
            }

            self.astronaut.complete_recovery();

            if !self.pause(self.config.tick_delay) {
                break SessionOutcome::Stopped;
            }
        };

        self.astronaut.deactivate();
        self.control.mark_stopped();
        tracing::info!(
            outcome = ?outcome,
            cycles = self.astronaut.cycles(),
            refills = self.refills,
            "session ended"
        );

        SessionReport {
            astronaut: id,
            name: self.astronaut.name().to_string(),
            outcome,
            cycles: self.astronaut.cycles(),
            refills: self.refills,
            timeouts: self.timeouts,
            final_oxygen: self.astronaut.oxygen(),
        }
    }

    /// Acquire, hold, replenish, release.
    ///
    /// The astronaut does not tick while waiting. A stop during the hold
    /// releases early without replenishing.
    fn refill(&mut self) -> Result<(), DispenserError> {
        let dispenser = Arc::clone(&self.dispenser);
        self.request_in_flight = true;

        let hold = match dispenser.acquire(
            self.astronaut.vitals(),
            self.config.acquire_timeout,
            self.control.cancel_flag(),
        ) {
            Ok(hold) => hold,
            Err(e) => {
                self.request_in_flight = false;
                return Err(e);
            }
        };

        let hold_for = self.config.hold_duration(self.astronaut.is_critical());
        if self.pause(hold_for) {
            self.astronaut.replenish();
            self.refills += 1;
            tracing::debug!(fatigue = self.astronaut.fatigue(), "replenished");
        } else {
            tracing::debug!("hold cut short by stop");
        }

        let released = hold.release();
        self.request_in_flight = false;
        released
    }

    /// Park for `duration`. Returns `false` if a stop cut the pause short.
    ///
    /// A duration past the end of the clock parks until stopped.
    fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.control.is_stop_requested() {
                return false;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    thread::park_timeout(deadline - now);
                }
                None => thread::park(),
            }
        }
    }
}
