//! Reconciliation configuration.

use std::time::Duration;

use chrono::TimeDelta;

/// Timing knobs for the reconciliation store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationConfig {
    /// How long events for not-yet-known orders are held before discarding.
    pub buffer_window: Duration,
    /// How recent a local change must be, relative to a snapshot's as-of time,
    /// to win over the snapshot when the two states are incomparable.
    pub local_tolerance: Duration,
    /// How long an optimistic command may wait for its response before it is
    /// rolled back. Longer than the HTTP request timeout.
    pub command_timeout: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            buffer_window: Duration::from_secs(10),
            local_tolerance: Duration::from_secs(2),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl ReconciliationConfig {
    pub(crate) fn buffer_window_delta(&self) -> TimeDelta {
        to_delta(self.buffer_window)
    }

    pub(crate) fn local_tolerance_delta(&self) -> TimeDelta {
        to_delta(self.local_tolerance)
    }

    pub(crate) fn command_timeout_delta(&self) -> TimeDelta {
        to_delta(self.command_timeout)
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
