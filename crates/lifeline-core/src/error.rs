//! Error types for dispenser arbitration.
//!
//! Every variant leaves the dispenser's shared state consistent: a
//! rejected, timed-out, or cancelled requester is never left in the wait
//! set, and an illegal release never touches the busy flag.

use std::time::Duration;

use thiserror::Error;

use crate::id::AstronautId;

/// Why a request was refused before it was queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The astronaut has already terminated.
    Terminated,
    /// The astronaut already has a pending request.
    AlreadyWaiting,
    /// The astronaut currently holds the dispenser.
    AlreadyHolding,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminated => write!(f, "astronaut has terminated"),
            Self::AlreadyWaiting => write!(f, "request already pending"),
            Self::AlreadyHolding => write!(f, "astronaut already holds the dispenser"),
        }
    }
}

/// Errors reported by the dispenser.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispenserError {
    /// Rejected synchronously; nothing was queued.
    #[error("invalid request from astronaut {astronaut}: {reason}")]
    InvalidRequest {
        /// The requesting astronaut.
        astronaut: AstronautId,
        /// Why the request was refused.
        reason: RejectReason,
    },
    /// Not selected before the deadline. The waiter was removed and the
    /// caller may retry immediately.
    #[error("astronaut {astronaut} timed out after {waited:?}")]
    Timeout {
        /// The requesting astronaut.
        astronaut: AstronautId,
        /// How long the request waited.
        waited: Duration,
    },
    /// The wait was interrupted by a stop or shutdown. The waiter was
    /// removed; the caller should not retry.
    #[error("request from astronaut {astronaut} cancelled")]
    Cancelled {
        /// The requesting astronaut.
        astronaut: AstronautId,
    },
    /// `release` called by something other than the current holder.
    #[error("illegal release by astronaut {caller} (holder: {holder:?})")]
    IllegalRelease {
        /// The astronaut that attempted the release.
        caller: AstronautId,
        /// The actual holder at the time, if any.
        holder: Option<AstronautId>,
    },
}

impl DispenserError {
    /// Whether the caller may sensibly issue the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
