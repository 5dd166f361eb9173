//! Authoritative point-in-time state and the rule for merging it.

use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::trading::{Instrument, Order, OrderState, OrderStateMachine, Portfolio, Trade};

/// Server state captured at `as_of`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Orders the server reported.
    pub orders: Vec<Order>,
    /// Trade history.
    pub trades: Vec<Trade>,
    /// Holdings.
    pub portfolio: Portfolio,
    /// Instruments with last traded prices.
    pub instruments: Vec<Instrument>,
    /// When the fetch started.
    pub as_of: DateTime<Utc>,
}

/// Outcome of comparing a local order against its snapshot copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Local state stands.
    KeepLocal,
    /// Snapshot state is a forward move; apply it as a transition.
    Advance,
    /// Snapshot state replaces an incomparable local state.
    Override,
}

/// Decide how a snapshot order state merges with the local one.
///
/// Forward moves are taken. Backward moves never are. Between the two
/// terminal states the local one is kept if it changed within `tolerance`
/// of `as_of` (or later), otherwise the snapshot wins.
#[must_use]
pub fn resolve(
    local: OrderState,
    local_changed_at: DateTime<Utc>,
    remote: OrderState,
    as_of: DateTime<Utc>,
    tolerance: TimeDelta,
) -> MergeDecision {
    match OrderStateMachine::compare(remote, local) {
        Some(Ordering::Greater) => MergeDecision::Advance,
        Some(Ordering::Equal | Ordering::Less) => MergeDecision::KeepLocal,
        None if local_changed_at >= as_of - tolerance => MergeDecision::KeepLocal,
        None => MergeDecision::Override,
    }
}
