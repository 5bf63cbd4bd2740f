//! The dispenser: exclusive, priority-ordered access to one shared device.
//!
//! # Protocol
//!
//! ```text
//! Session thread                       Dispenser (Mutex + Condvar)
//!     |                                     |
//!     |--acquire(vitals, timeout, cancel)-->| reject? (terminated / duplicate / closed)
//!     |                                     | waiting.insert(id, seq)
//!     |            (blocked)                | loop:
//!     |                                     |   cancelled or closed  -> remove, Cancelled
//!     |                                     |   free && selected==id -> remove, holder=id
//!     |                                     |   deadline passed      -> remove, Timeout
//!     |                                     |   wait / wait_timeout
//!     |<-------------Hold-------------------|
//!     |  (replenish while holding)          |
//!     |--Hold::release()------------------->| holder=None, notify_all
//! ```
//!
//! # Ordering
//!
//! Selection is recomputed on every wake-up from the *live* oxygen level of
//! each waiter: the highest [`Priority`] wins, ties go to the lowest enqueue
//! sequence number. A late but more urgent requester therefore overtakes
//! waiters already in the queue. An active hold is never interrupted.
//!
//! All shared state (holder, wait set, closed flag, counters) lives behind
//! a single mutex; "is selected AND is free" and "become holder" happen in
//! one critical section.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use lifeline_core::{AstronautId, DispenserError, Priority, RejectReason, Vitals};

use crate::events::{EventBus, SimulationEvent};
use crate::metrics::DispenserMetrics;

// ── CancelFlag ───────────────────────────────────────────────────

/// Cooperative cancellation for a pending [`Dispenser::acquire`].
///
/// Setting the flag alone does not wake a blocked waiter; follow it with
/// [`Dispenser::interrupt`] (the session stop path does both).
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the flag is raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ── Snapshot types ───────────────────────────────────────────────

/// The current holder as seen by a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HolderInfo {
    /// Holding astronaut.
    pub astronaut: AstronautId,
    /// Display name.
    pub name: String,
    /// Time since the grant.
    pub held_for: Duration,
}

/// One waiter as seen by a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitingEntry {
    /// Waiting astronaut.
    pub astronaut: AstronautId,
    /// Display name.
    pub name: String,
    /// Oxygen level at snapshot time.
    pub oxygen: u8,
    /// Priority derived from `oxygen`.
    pub priority: Priority,
    /// Time spent in the wait set so far.
    pub waited: Duration,
}

/// Point-in-time view of the dispenser for display layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispenserSnapshot {
    /// Whether a holder occupies the dispenser.
    pub busy: bool,
    /// The holder, if any.
    pub holder: Option<HolderInfo>,
    /// Waiters in the order they would be selected right now.
    pub waiting: Vec<WaitingEntry>,
    /// Whether the dispenser has been closed.
    pub closed: bool,
    /// Cumulative counters.
    pub metrics: DispenserMetrics,
}

// ── Internal state ───────────────────────────────────────────────

struct Waiter {
    vitals: Arc<Vitals>,
    seq: u64,
    enqueued_at: Instant,
}

struct Holder {
    vitals: Arc<Vitals>,
    since: Instant,
}

struct DispenserState {
    holder: Option<Holder>,
    /// Insertion-ordered; position is not the selection order.
    waiting: IndexMap<AstronautId, Waiter>,
    next_seq: u64,
    closed: bool,
    metrics: DispenserMetrics,
}

impl DispenserState {
    fn holder_id(&self) -> Option<AstronautId> {
        self.holder.as_ref().map(|h| h.vitals.id())
    }

    fn rejection(&self, vitals: &Vitals) -> Option<RejectReason> {
        let id = vitals.id();
        if vitals.is_terminated() {
            Some(RejectReason::Terminated)
        } else if self.holder_id() == Some(id) {
            Some(RejectReason::AlreadyHolding)
        } else if self.waiting.contains_key(&id) {
            Some(RejectReason::AlreadyWaiting)
        } else {
            None
        }
    }

    /// Highest live priority, then earliest enqueue.
    ///
    /// Each waiter's priority is read exactly once per call.
    fn select_next(&self) -> Option<AstronautId> {
        self.waiting
            .iter()
            .max_by_key(|(_, w)| (w.vitals.priority(), Reverse(w.seq)))
            .map(|(id, _)| *id)
    }

    fn selection_order(&self, now: Instant) -> Vec<WaitingEntry> {
        let mut entries: Vec<(u64, WaitingEntry)> = self
            .waiting
            .iter()
            .map(|(id, w)| {
                let oxygen = w.vitals.oxygen();
                (
                    w.seq,
                    WaitingEntry {
                        astronaut: *id,
                        name: w.vitals.name().to_string(),
                        oxygen,
                        priority: Priority::from_oxygen(oxygen),
                        waited: now.saturating_duration_since(w.enqueued_at),
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(seq, e)| (Reverse(e.priority), *seq));
        entries.into_iter().map(|(_, e)| e).collect()
    }
}

// ── Dispenser ────────────────────────────────────────────────────

/// Arbiter for the single shared oxygen dispenser.
///
/// Share it between session threads with `Arc<Dispenser>`.
pub struct Dispenser {
    state: Mutex<DispenserState>,
    turn: Condvar,
    events: EventBus,
}

// Compile-time assertion: Dispenser must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Dispenser>();
};

impl Default for Dispenser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispenser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Dispenser")
            .field("holder", &state.holder_id())
            .field("waiting", &state.waiting.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl Dispenser {
    /// A free dispenser whose events go nowhere.
    pub fn new() -> Self {
        Self::with_events(EventBus::new())
    }

    /// A free dispenser publishing to `events`.
    pub fn with_events(events: EventBus) -> Self {
        Self {
            state: Mutex::new(DispenserState {
                holder: None,
                waiting: IndexMap::new(),
                next_seq: 0,
                closed: false,
                metrics: DispenserMetrics::default(),
            }),
            turn: Condvar::new(),
            events,
        }
    }

    /// Wait for exclusive access.
    ///
    /// Blocks until `vitals`' astronaut is the selected waiter and the
    /// dispenser is free, then returns a [`Hold`]. The caller does its work
    /// while holding and then calls [`Hold::release`].
    ///
    /// # Errors
    ///
    /// - [`DispenserError::InvalidRequest`] if the astronaut is terminated,
    ///   already waiting, or already holding. Nothing is queued.
    /// - [`DispenserError::Timeout`] if `timeout` elapses first.
    /// - [`DispenserError::Cancelled`] if `cancel` is raised (and the
    ///   dispenser interrupted) or the dispenser is closed.
    ///
    /// On every error path the astronaut is absent from the wait set.
    pub fn acquire(
        &self,
        vitals: &Arc<Vitals>,
        timeout: Option<Duration>,
        cancel: &CancelFlag,
    ) -> Result<Hold<'_>, DispenserError> {
        let id = vitals.id();
        let started = Instant::now();
        // A timeout past the end of the clock means no deadline.
        let deadline = timeout.and_then(|t| started.checked_add(t));
        let mut state = self.lock();

        if state.closed {
            state.metrics.cancellations += 1;
            tracing::debug!(astronaut = %id, "request against closed dispenser");
            return Err(DispenserError::Cancelled { astronaut: id });
        }

        if let Some(reason) = state.rejection(vitals) {
            state.metrics.rejections += 1;
            tracing::warn!(astronaut = %id, %reason, "request rejected");
            return Err(DispenserError::InvalidRequest {
                astronaut: id,
                reason,
            });
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.waiting.insert(
            id,
            Waiter {
                vitals: Arc::clone(vitals),
                seq,
                enqueued_at: started,
            },
        );
        let priority = vitals.priority();
        tracing::debug!(
            astronaut = %id,
            %priority,
            waiting = state.waiting.len(),
            "request queued"
        );
        self.events.publish(SimulationEvent::RequestStarted {
            astronaut: id,
            name: vitals.name().to_string(),
            priority,
        });

        loop {
            if cancel.is_cancelled() || state.closed {
                state.waiting.shift_remove(&id);
                state.metrics.cancellations += 1;
                tracing::debug!(astronaut = %id, "request cancelled");
                self.events.publish(SimulationEvent::RequestCancelled {
                    astronaut: id,
                    name: vitals.name().to_string(),
                });
                // Our departure may make someone else the selected waiter.
                self.turn.notify_all();
                return Err(DispenserError::Cancelled { astronaut: id });
            }

            if state.holder.is_none() && state.select_next() == Some(id) {
                state.waiting.shift_remove(&id);
                let waited = started.elapsed();
                state.holder = Some(Holder {
                    vitals: Arc::clone(vitals),
                    since: Instant::now(),
                });
                state.metrics.record_grant(waited);
                tracing::debug!(
                    astronaut = %id,
                    priority = %vitals.priority(),
                    waited_ms = waited.as_millis() as u64,
                    "access granted"
                );
                self.events.publish(SimulationEvent::AccessGranted {
                    astronaut: id,
                    name: vitals.name().to_string(),
                    waited,
                });
                return Ok(Hold {
                    dispenser: self,
                    astronaut: id,
                    released: false,
                });
            }

            state = match deadline {
                None => self
                    .turn
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.waiting.shift_remove(&id);
                        state.metrics.timeouts += 1;
                        let waited = started.elapsed();
                        tracing::warn!(
                            astronaut = %id,
                            waited_ms = waited.as_millis() as u64,
                            "request timed out"
                        );
                        self.events.publish(SimulationEvent::RequestTimedOut {
                            astronaut: id,
                            name: vitals.name().to_string(),
                            waited,
                        });
                        self.turn.notify_all();
                        return Err(DispenserError::Timeout {
                            astronaut: id,
                            waited,
                        });
                    }
                    self.turn
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Give up exclusive access.
    ///
    /// # Errors
    ///
    /// [`DispenserError::IllegalRelease`] if `astronaut` is not the current
    /// holder. The holder and busy flag are left untouched.
    pub fn release(&self, astronaut: AstronautId) -> Result<(), DispenserError> {
        let mut state = self.lock();
        match state.holder.take() {
            Some(holder) if holder.vitals.id() == astronaut => {
                let held = holder.since.elapsed();
                state.metrics.releases += 1;
                tracing::debug!(
                    astronaut = %astronaut,
                    held_ms = held.as_millis() as u64,
                    waiting = state.waiting.len(),
                    "access released"
                );
                self.events.publish(SimulationEvent::AccessReleased {
                    astronaut,
                    name: holder.vitals.name().to_string(),
                    held,
                });
                self.turn.notify_all();
                Ok(())
            }
            other => {
                let holder = other.as_ref().map(|h| h.vitals.id());
                state.holder = other;
                state.metrics.illegal_releases += 1;
                tracing::error!(
                    caller = %astronaut,
                    holder = ?holder,
                    "release by non-holder"
                );
                Err(DispenserError::IllegalRelease {
                    caller: astronaut,
                    holder,
                })
            }
        }
    }

    /// Wake every waiter so it re-checks its cancel flag and the ordering.
    pub fn interrupt(&self) {
        // Taking the lock orders this wake-up after any waiter that has
        // checked its flag but not yet started waiting.
        drop(self.lock());
        self.turn.notify_all();
    }

    /// Refuse new requests and cancel every pending one.
    ///
    /// The current hold, if any, is unaffected and may still be released.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            tracing::info!(waiting = state.waiting.len(), "dispenser closed");
        }
        self.turn.notify_all();
    }

    /// Whether a holder occupies the dispenser.
    pub fn is_busy(&self) -> bool {
        self.lock().holder.is_some()
    }

    /// Number of pending requests.
    pub fn waiting_count(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Current holder, if any.
    pub fn holder(&self) -> Option<AstronautId> {
        self.lock().holder_id()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Copy of the cumulative counters.
    pub fn metrics(&self) -> DispenserMetrics {
        self.lock().metrics.clone()
    }

    /// Consistent view of holder, ordered wait set, and counters.
    pub fn snapshot(&self) -> DispenserSnapshot {
        let state = self.lock();
        let now = Instant::now();
        DispenserSnapshot {
            busy: state.holder.is_some(),
            holder: state.holder.as_ref().map(|h| HolderInfo {
                astronaut: h.vitals.id(),
                name: h.vitals.name().to_string(),
                held_for: now.saturating_duration_since(h.since),
            }),
            waiting: state.selection_order(now),
            closed: state.closed,
            metrics: state.metrics.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispenserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Hold ─────────────────────────────────────────────────────────

/// Exclusive access to a [`Dispenser`].
///
/// Release explicitly with [`Hold::release`] to observe errors. Dropping an
/// unreleased hold releases it and logs any failure. Leaking a hold (for
/// example with `std::mem::forget`) starves every other requester.
#[must_use = "dropping a Hold releases the dispenser immediately"]
pub struct Hold<'a> {
    dispenser: &'a Dispenser,
    astronaut: AstronautId,
    released: bool,
}

impl Hold<'_> {
    /// The holding astronaut.
    pub fn astronaut(&self) -> AstronautId {
        self.astronaut
    }

    /// Release the dispenser.
    ///
    /// # Errors
    ///
    /// [`DispenserError::IllegalRelease`] if something else already
    /// released this hold through [`Dispenser::release`].
    pub fn release(mut self) -> Result<(), DispenserError> {
        self.released = true;
        self.dispenser.release(self.astronaut)
    }
}

impl std::fmt::Debug for Hold<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hold")
            .field("astronaut", &self.astronaut)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.dispenser.release(self.astronaut) {
                tracing::error!(astronaut = %self.astronaut, error = %e, "implicit release failed");
            }
        }
    }
}
