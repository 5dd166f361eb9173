//! Reconciliation conflict notices.
//!
//! A conflict is informational: an optimistic local change was superseded
//! and the store has already settled on the authoritative outcome.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::domain::trading::{OrderId, OrderState};

/// Why an optimistic or local state lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// A fill arrived while a cancel was in flight.
    FillBeatCancel,
    /// The server refused the cancel.
    CancelRejected {
        /// Server or network reason.
        reason: String,
    },
    /// A snapshot replaced an older, incomparable local state.
    SnapshotOverride,
}

/// Non-fatal notice that local state was corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationConflict {
    /// The affected order.
    pub order_id: OrderId,
    /// What happened.
    pub kind: ConflictKind,
    /// State shown before the correction.
    pub superseded_state: OrderState,
    /// State after the correction.
    pub resolved_state: OrderState,
    /// When the store detected it.
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for ReconciliationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConflictKind::FillBeatCancel => write!(
                f,
                "order {} executed before the cancel was confirmed",
                self.order_id
            ),
            ConflictKind::CancelRejected { reason } => write!(
                f,
                "cancel of order {} rejected ({reason}); state restored to {}",
                self.order_id, self.resolved_state
            ),
            ConflictKind::SnapshotOverride => write!(
                f,
                "order {} corrected from {} to {} by snapshot",
                self.order_id, self.superseded_state, self.resolved_state
            ),
        }
    }
}
