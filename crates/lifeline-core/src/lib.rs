//! Core types for the Lifeline simulation.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! astronaut state machine, the lock-free [`Vitals`] cell that publishes an
//! astronaut's readings to other threads, the injectable [`Respiration`]
//! source, and the dispenser error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod astronaut;
pub mod error;
pub mod id;
pub mod respiration;
pub mod vitals;

pub use astronaut::{
    Astronaut, AstronautSnapshot, AstronautState, Priority, EMERGENCY_THRESHOLD, FATIGUE_MAX,
    OXYGEN_MAX, REPLENISH_THRESHOLD,
};
pub use error::{DispenserError, RejectReason};
pub use id::AstronautId;
pub use respiration::{Respiration, SeededRespiration};
pub use vitals::Vitals;
