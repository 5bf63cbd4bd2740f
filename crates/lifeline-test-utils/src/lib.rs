//! Test utilities and scripted sources for Lifeline development.
//!
//! Provides a deterministic [`ScriptedRespiration`] source, a
//! [`vitals_at`] helper for building dispenser requesters without a
//! running astronaut, and polling helpers for threaded tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use lifeline_core::{AstronautId, AstronautState, Respiration, Vitals, EMERGENCY_THRESHOLD};

/// Respiration that replays fixed sequences, cycling when exhausted.
///
/// An empty `draws` script yields 1; an empty `rests` script never rests.
#[derive(Clone, Debug)]
pub struct ScriptedRespiration {
    draws: Vec<u8>,
    rests: Vec<bool>,
    draw_pos: usize,
    rest_pos: usize,
}

impl ScriptedRespiration {
    pub fn new(draws: Vec<u8>, rests: Vec<bool>) -> Self {
        Self {
            draws,
            rests,
            draw_pos: 0,
            rest_pos: 0,
        }
    }

    /// Same draw every tick, never rests.
    pub fn constant(draw: u8) -> Self {
        Self::new(vec![draw], Vec::new())
    }
}

impl Respiration for ScriptedRespiration {
    fn base_draw(&mut self) -> u8 {
        if self.draws.is_empty() {
            return 1;
        }
        let v = self.draws[self.draw_pos % self.draws.len()];
        self.draw_pos += 1;
        v
    }

    fn rests(&mut self) -> bool {
        if self.rests.is_empty() {
            return false;
        }
        let v = self.rests[self.rest_pos % self.rests.len()];
        self.rest_pos += 1;
        v
    }
}

/// Standalone vitals cell at the given oxygen level.
///
/// State is Emergency below the emergency threshold, Terminated at 0,
/// Normal otherwise.
pub fn vitals_at(id: u32, oxygen: u8) -> Arc<Vitals> {
    let state = if oxygen == 0 {
        AstronautState::Terminated
    } else if oxygen < EMERGENCY_THRESHOLD {
        AstronautState::Emergency
    } else {
        AstronautState::Normal
    };
    Arc::new(Vitals::new(
        AstronautId(id),
        format!("Astronaut {id}"),
        oxygen,
        0,
        state,
    ))
}

/// Poll `cond` every millisecond until it holds or `timeout` elapses.
///
/// Returns whether the condition was observed.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Everything currently buffered in `rx`, without blocking.
pub fn drain<T>(rx: &Receiver<T>) -> Vec<T> {
    rx.try_iter().collect()
}

/// Receive until an item matches `pred` or `timeout` elapses.
///
/// Non-matching items are discarded.
pub fn recv_matching<T>(
    rx: &Receiver<T>,
    timeout: Duration,
    mut pred: impl FnMut(&T) -> bool,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(item) if pred(&item) => return Some(item),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Accumulates everything received on a channel for later assertions.
#[derive(Debug)]
pub struct EventLog<T> {
    rx: Receiver<T>,
    seen: Vec<T>,
}

impl<T> EventLog<T> {
    pub fn new(rx: Receiver<T>) -> Self {
        Self {
            rx,
            seen: Vec::new(),
        }
    }

    /// Move buffered items into the log without blocking.
    pub fn pump(&mut self) -> &[T] {
        self.seen.extend(self.rx.try_iter());
        &self.seen
    }

    /// Keep receiving until `pred` holds over the whole log or `timeout`
    /// elapses. Returns whether it held.
    pub fn wait_for(&mut self, timeout: Duration, mut pred: impl FnMut(&[T]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.seen.extend(self.rx.try_iter());
            if pred(&self.seen) {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            match self.rx.recv_timeout(remaining.min(Duration::from_millis(10))) {
                Ok(item) => self.seen.push(item),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return pred(&self.seen),
            }
        }
    }

    pub fn events(&self) -> &[T] {
        &self.seen
    }
}
