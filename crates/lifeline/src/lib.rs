//! Lifeline: priority arbitration of a shared oxygen dispenser.
//!
//! A crew of astronauts breathe down their oxygen on independent threads.
//! When one runs low it asks the single dispenser for a refill; the
//! dispenser grants exclusive access to the most depleted requester first.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Lifeline sub-crates.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use lifeline::prelude::*;
//!
//! let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
//! let events = sim.subscribe();
//! sim.start_crew(vec![CrewSpec::new("Neil", 5), CrewSpec::new("Chris", 60)])
//!     .unwrap();
//!
//! while let Ok(event) = events.recv_timeout(Duration::from_secs(3)) {
//!     println!("{} {}", event.kind(), event.astronaut());
//! }
//! let report = sim.stop();
//! assert_eq!(report.sessions_detached, 0);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `lifeline-core` | Astronaut state machine, vitals, priorities, errors |
//! | [`engine`] | `lifeline-engine` | Dispenser, session runners, simulation control |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`lifeline-core`).
///
/// The [`types::Astronaut`] lifecycle, the lock-free [`types::Vitals`]
/// cell, [`types::Priority`], and [`types::DispenserError`].
pub use lifeline_core as types;

/// Concurrency layer (`lifeline-engine`).
///
/// [`engine::Dispenser`] for arbitration on its own,
/// [`engine::Simulation`] for a full threaded crew.
pub use lifeline_engine as engine;

/// Common imports for typical Lifeline usage.
///
/// ```rust
/// use lifeline::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use lifeline_core::{
        Astronaut, AstronautId, AstronautSnapshot, AstronautState, Priority, Respiration, Vitals,
    };

    // Errors
    pub use lifeline_core::{DispenserError, RejectReason};
    pub use lifeline_engine::{ConfigError, SimulationError};

    // Engine
    pub use lifeline_engine::{
        CancelFlag, CrewSpec, Dispenser, DispenserSnapshot, SessionConfig, Simulation,
        SimulationConfig, SimulationEvent, StopReport,
    };
}
