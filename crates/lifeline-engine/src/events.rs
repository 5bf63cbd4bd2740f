//! Lifecycle events for presentation layers.
//!
//! The dispenser and session runners publish [`SimulationEvent`]s to an
//! [`EventBus`]. Each subscriber gets its own unbounded crossbeam channel,
//! so publishing never blocks the publisher; subscribers drain at their
//! own pace on their own thread. Receivers that have been dropped are
//! pruned on the next publish.
//!
//! Dispenser events are published while the dispenser lock is held, so for
//! a single dispenser they arrive in the order the state transitions
//! happened. There is no ordering guarantee between a dispenser event and
//! a session event (e.g. `MissionFailed`) from different astronauts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use lifeline_core::{AstronautId, Priority};

/// Something observable happened to an astronaut.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulationEvent {
    /// The astronaut joined the dispenser's wait set.
    RequestStarted {
        /// Requesting astronaut.
        astronaut: AstronautId,
        /// Display name.
        name: String,
        /// Priority at enqueue time.
        priority: Priority,
    },
    /// The astronaut became the exclusive holder.
    AccessGranted {
        /// Granted astronaut.
        astronaut: AstronautId,
        /// Display name.
        name: String,
        /// Time spent in the wait set.
        waited: Duration,
    },
    /// The holder released the dispenser.
    AccessReleased {
        /// Releasing astronaut.
        astronaut: AstronautId,
        /// Display name.
        name: String,
        /// Length of the hold.
        held: Duration,
    },
    /// The request expired before it was selected.
    RequestTimedOut {
        /// Requesting astronaut.
        astronaut: AstronautId,
        /// Display name.
        name: String,
        /// Time spent in the wait set.
        waited: Duration,
    },
    /// The request was interrupted by a stop or shutdown.
    RequestCancelled {
        /// Requesting astronaut.
        astronaut: AstronautId,
        /// Display name.
        name: String,
    },
    /// The astronaut ran out of oxygen.
    MissionFailed {
        /// The lost astronaut.
        astronaut: AstronautId,
        /// Display name.
        name: String,
        /// Ticks survived.
        cycles: u64,
    },
}

impl SimulationEvent {
    /// The astronaut this event concerns.
    pub fn astronaut(&self) -> AstronautId {
        match self {
            Self::RequestStarted { astronaut, .. }
            | Self::AccessGranted { astronaut, .. }
            | Self::AccessReleased { astronaut, .. }
            | Self::RequestTimedOut { astronaut, .. }
            | Self::RequestCancelled { astronaut, .. }
            | Self::MissionFailed { astronaut, .. } => *astronaut,
        }
    }

    /// Short lowercase tag, handy for log lines and assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestStarted { .. } => "request-started",
            Self::AccessGranted { .. } => "access-granted",
            Self::AccessReleased { .. } => "access-released",
            Self::RequestTimedOut { .. } => "request-timed-out",
            Self::RequestCancelled { .. } => "request-cancelled",
            Self::MissionFailed { .. } => "mission-failed",
        }
    }
}

/// Fan-out of [`SimulationEvent`]s to any number of subscribers.
///
/// Cloning the bus shares the subscriber list.
#[derive(Clone, Debug, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<SimulationEvent>>>>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Only events published after this call
    /// are delivered.
    pub fn subscribe(&self) -> Receiver<SimulationEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber. Never blocks.
    pub fn publish(&self, event: SimulationEvent) {
        let mut subscribers = self.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers (including ones not yet pruned).
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<SimulationEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
