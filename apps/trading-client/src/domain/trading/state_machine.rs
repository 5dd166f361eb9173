//! Order State Machine
//!
//! Classifies state changes against the monotonic order
//! `PLACED < EXECUTED`, `PLACED < CANCELLED`.

use std::cmp::Ordering;

use super::order::OrderState;

/// How an incoming state relates to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Forward move; apply it.
    Advance,
    /// Same state; a duplicate.
    Unchanged,
    /// Backward or sideways move between terminal states; ignore it.
    Stale,
}

impl Transition {
    /// Returns true if the transition should be applied.
    #[must_use]
    pub const fn is_advance(self) -> bool {
        matches!(self, Self::Advance)
    }
}

/// Order State Machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    const fn is_forward(from: OrderState, to: OrderState) -> bool {
        matches!(
            (from, to),
            (OrderState::Placed, OrderState::Executed) | (OrderState::Placed, OrderState::Cancelled)
        )
    }

    /// Classify an incoming state against the current one.
    #[must_use]
    pub fn classify(from: OrderState, to: OrderState) -> Transition {
        if from == to {
            Transition::Unchanged
        } else if Self::is_forward(from, to) {
            Transition::Advance
        } else {
            Transition::Stale
        }
    }

    /// Compare two states in the monotonic partial order.
    ///
    /// Returns `None` for `EXECUTED` vs `CANCELLED`, which are incomparable.
    #[must_use]
    pub fn compare(a: OrderState, b: OrderState) -> Option<Ordering> {
        if a == b {
            return Some(Ordering::Equal);
        }
        match a.precedence().cmp(&b.precedence()) {
            Ordering::Equal => None,
            ordering => Some(ordering),
        }
    }
}
