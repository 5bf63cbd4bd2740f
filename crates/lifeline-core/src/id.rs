//! Strongly-typed astronaut identifier.

use std::fmt;

/// Identifies an astronaut within a simulation run.
///
/// Assigned sequentially by the coordinator when a crew is created.
/// `AstronautId(n)` is stable for the lifetime of the astronaut and is the
/// key the dispenser uses for its wait set and holder slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstronautId(pub u32);

impl fmt::Display for AstronautId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for AstronautId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
