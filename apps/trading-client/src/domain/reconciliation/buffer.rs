//! Holding area for events that reference orders the store has not seen.
//!
//! A fill or state change can reach the client before the command response
//! that introduces the order. Such events wait here for up to the buffer
//! window and are replayed in arrival order once the order appears.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

use crate::domain::trading::{OrderId, OrderState, Trade};

/// An event parked until its order is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredEvent {
    /// Pushed state change.
    StateChange {
        /// New state.
        new_state: OrderState,
        /// Server time of the change.
        timestamp: DateTime<Utc>,
    },
    /// Pushed fill; settles into holdings when replayed.
    Trade {
        /// The fill.
        trade: Trade,
        /// Order state after the fill.
        resulting_order_state: OrderState,
    },
    /// Trade from a snapshot; holdings already include it.
    HistoricalTrade(Trade),
}

#[derive(Debug, Clone)]
struct BufferedEvent {
    received_at: DateTime<Utc>,
    event: DeferredEvent,
}

/// Events keyed by the order they reference.
#[derive(Debug)]
pub struct EventBuffer {
    window: TimeDelta,
    by_order: HashMap<OrderId, Vec<BufferedEvent>>,
}

impl EventBuffer {
    /// Create a buffer that keeps events for `window`.
    #[must_use]
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            by_order: HashMap::new(),
        }
    }

    /// Park an event.
    pub fn push(&mut self, order_id: OrderId, event: DeferredEvent, now: DateTime<Utc>) {
        self.by_order.entry(order_id).or_default().push(BufferedEvent {
            received_at: now,
            event,
        });
    }

    /// Remove and return live events for an order, oldest first.
    ///
    /// Events older than the window are dropped.
    pub fn take(&mut self, order_id: &OrderId, now: DateTime<Utc>) -> Vec<DeferredEvent> {
        let Some(events) = self.by_order.remove(order_id) else {
            return Vec::new();
        };
        let total = events.len();
        let live: Vec<DeferredEvent> = events
            .into_iter()
            .filter(|buffered| !self.is_expired(buffered, now))
            .map(|buffered| buffered.event)
            .collect();
        if live.len() < total {
            warn!(
                order_id = %order_id,
                dropped = total - live.len(),
                "Discarded buffered events older than the buffer window"
            );
        }
        live
    }

    /// Drop expired events. Returns how many were discarded.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let mut discarded = 0;
        self.by_order.retain(|order_id, events| {
            let before = events.len();
            events.retain(|buffered| now - buffered.received_at <= window);
            let dropped = before - events.len();
            if dropped > 0 {
                warn!(
                    order_id = %order_id,
                    dropped,
                    "Discarded events for an order that never appeared"
                );
            }
            discarded += dropped;
            !events.is_empty()
        });
        discarded
    }

    /// Total parked events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_order.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_order.is_empty()
    }

    fn is_expired(&self, buffered: &BufferedEvent, now: DateTime<Utc>) -> bool {
        now - buffered.received_at > self.window
    }
}
