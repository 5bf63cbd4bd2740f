//! Concurrency layer for the Lifeline simulation.
//!
//! Provides the [`Dispenser`] arbiter (exclusive, priority-ordered access
//! behind a mutex and condition variable), the per-astronaut
//! [`SessionRunner`] loop, and the [`Simulation`] coordinator that owns
//! threads and exposes snapshots and an event stream.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispenser;
pub mod events;
pub mod metrics;
pub mod session;
pub mod simulation;

pub use config::{ConfigError, CrewSpec, SessionConfig, SimulationConfig, MAX_CREW};
pub use dispenser::{
    CancelFlag, Dispenser, DispenserSnapshot, Hold, HolderInfo, WaitingEntry,
};
pub use events::{EventBus, SimulationEvent};
pub use metrics::DispenserMetrics;
pub use session::{SessionControl, SessionOutcome, SessionPhase, SessionReport, SessionRunner};
pub use simulation::{Simulation, SimulationError, StopReport};
