//! Cumulative counters for one dispenser instance.
//!
//! [`DispenserMetrics`] is updated under the dispenser lock and copied out
//! by [`Dispenser::metrics`](crate::Dispenser::metrics) and snapshots.

use std::time::Duration;

/// Counters accumulated over the lifetime of a dispenser.
///
/// Wait times are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispenserMetrics {
    /// Requests granted exclusive access.
    pub grants: u64,
    /// Successful releases by the holder.
    pub releases: u64,
    /// Requests that expired in the wait set.
    pub timeouts: u64,
    /// Requests interrupted by stop or shutdown.
    pub cancellations: u64,
    /// Requests refused before queueing.
    pub rejections: u64,
    /// Release attempts by a non-holder.
    pub illegal_releases: u64,
    /// Longest time any granted request spent waiting.
    pub longest_wait_us: u64,
    /// Sum of wait times over all granted requests.
    pub total_wait_us: u64,
}

impl DispenserMetrics {
    pub(crate) fn record_grant(&mut self, waited: Duration) {
        let us = waited.as_micros().min(u64::MAX as u128) as u64;
        self.grants += 1;
        self.total_wait_us = self.total_wait_us.saturating_add(us);
        self.longest_wait_us = self.longest_wait_us.max(us);
    }

    /// Mean wait of granted requests, in microseconds.
    pub fn mean_wait_us(&self) -> u64 {
        if self.grants == 0 {
            0
        } else {
            self.total_wait_us / self.grants
        }
    }
}
