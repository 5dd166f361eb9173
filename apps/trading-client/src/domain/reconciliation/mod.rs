//! Reconciliation store.
//!
//! The in-memory projection of orders, trades and the portfolio. Commands
//! apply their local effect optimistically, then server events and snapshots
//! confirm or correct it.
//!
//! Every entry point is synchronous and takes the current time, so the owner
//! serializes access and controls the clock. Each mutation reports the slices
//! it touched as a [`ChangeSet`].

mod buffer;
mod config;
mod conflict;
mod error;
mod events;
mod pending;
mod snapshot;

pub use buffer::{DeferredEvent, EventBuffer};
pub use config::ReconciliationConfig;
pub use conflict::{ConflictKind, ReconciliationConflict};
pub use error::StoreError;
pub use events::ServerEvent;
pub use pending::{PendingCommand, PendingCommands, PendingKind};
pub use snapshot::{MergeDecision, Snapshot, resolve};

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::trading::{
    CommandId, Holding, Instrument, Order, OrderId, OrderState, OrderStateMachine, Portfolio,
    PortfolioError, Trade, TradeId, Transition,
};

/// Slices touched by one mutation, plus any conflicts it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Order map changed.
    pub orders: bool,
    /// Trade history grew.
    pub trades: bool,
    /// Holdings changed.
    pub portfolio: bool,
    /// Optimistic or local states that were superseded.
    pub conflicts: Vec<ReconciliationConflict>,
    /// Fills recorded without a holding update.
    pub holding_errors: Vec<PortfolioError>,
}

impl ChangeSet {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.orders
            && !self.trades
            && !self.portfolio
            && self.conflicts.is_empty()
            && self.holding_errors.is_empty()
    }

    /// Fold another change set into this one.
    pub fn merge(&mut self, other: Self) {
        self.orders |= other.orders;
        self.trades |= other.trades;
        self.portfolio |= other.portfolio;
        self.conflicts.extend(other.conflicts);
        self.holding_errors.extend(other.holding_errors);
    }
}

/// Outcome of one garbage-collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    /// Buffered events discarded because their order never appeared.
    pub expired_events: usize,
    /// Rollbacks of optimistic commands that never got a response.
    pub changes: ChangeSet,
}

/// An order as the store presents it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    /// The order; `order.state` is the displayed state.
    pub order: Order,
    /// Last state the server confirmed.
    pub confirmed_state: OrderState,
    /// True while an optimistic cancel awaits confirmation.
    pub provisional: bool,
}

/// Outcome of starting a cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelTicket {
    /// Provisional command id. `None` when the order is unknown locally and
    /// no optimistic step was taken.
    pub command_id: Option<CommandId>,
    /// Slices touched by the optimistic step.
    pub changes: ChangeSet,
}

#[derive(Debug, Clone)]
struct TrackedOrder {
    order: Order,
    confirmed_state: OrderState,
    pending_cancel: Option<CommandId>,
    changed_at: DateTime<Utc>,
}

impl TrackedOrder {
    fn new(order: Order, now: DateTime<Utc>) -> Self {
        Self {
            confirmed_state: order.state,
            order,
            pending_cancel: None,
            changed_at: now,
        }
    }

    fn view(&self) -> OrderView {
        OrderView {
            order: self.order.clone(),
            confirmed_state: self.confirmed_state,
            provisional: self.pending_cancel.is_some(),
        }
    }

    fn settle(&mut self, state: OrderState, at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.confirmed_state = state;
        self.order.state = state;
        if state == OrderState::Executed && self.order.executed_at.is_none() {
            self.order.executed_at = at;
        }
        self.changed_at = now;
    }
}

/// Authoritative client-side projection of server state.
#[derive(Debug)]
pub struct ReconciliationStore {
    config: ReconciliationConfig,
    orders: HashMap<OrderId, TrackedOrder>,
    trades: Vec<Trade>,
    trade_ids: HashSet<TradeId>,
    portfolio: Portfolio,
    instruments: HashMap<String, Instrument>,
    pending: PendingCommands,
    buffer: EventBuffer,
    last_snapshot_at: Option<DateTime<Utc>>,
}

impl ReconciliationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: ReconciliationConfig) -> Self {
        Self {
            buffer: EventBuffer::new(config.buffer_window_delta()),
            config,
            orders: HashMap::new(),
            trades: Vec::new(),
            trade_ids: HashSet::new(),
            portfolio: Portfolio::default(),
            instruments: HashMap::new(),
            pending: PendingCommands::default(),
            last_snapshot_at: None,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All orders, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<OrderView> {
        let mut views: Vec<OrderView> = self.orders.values().map(TrackedOrder::view).collect();
        views.sort_by(|a, b| {
            a.order
                .created_at
                .cmp(&b.order.created_at)
                .then_with(|| a.order.order_id.as_str().cmp(b.order.order_id.as_str()))
        });
        views
    }

    /// One order.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<OrderView> {
        self.orders.get(order_id).map(TrackedOrder::view)
    }

    /// Whether the order is known.
    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Orders whose confirmed state is still PLACED.
    #[must_use]
    pub fn open_order_ids(&self) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|tracked| tracked.confirmed_state == OrderState::Placed)
            .map(|tracked| tracked.order.order_id.clone())
            .collect()
    }

    /// Every order id the store tracks.
    #[must_use]
    pub fn known_order_ids(&self) -> HashSet<OrderId> {
        self.orders.keys().cloned().collect()
    }

    /// Trade history in arrival order.
    #[must_use]
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Current portfolio.
    #[must_use]
    pub const fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Known instruments sorted by symbol.
    #[must_use]
    pub fn instruments(&self) -> Vec<Instrument> {
        let mut instruments: Vec<Instrument> = self.instruments.values().cloned().collect();
        instruments.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        instruments
    }

    /// Commands awaiting a response.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Events waiting for their order.
    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.buffer.len()
    }

    /// As-of time of the last applied snapshot.
    #[must_use]
    pub const fn last_snapshot_at(&self) -> Option<DateTime<Utc>> {
        self.last_snapshot_at
    }

    // =========================================================================
    // Command entry points
    // =========================================================================

    /// Record an order the server returned from a place or lookup.
    ///
    /// A new order is inserted and any buffered events for it are replayed.
    /// A known order is merged as if it were a snapshot taken `now`.
    pub fn record_order(&mut self, order: Order, now: DateTime<Utc>) -> ChangeSet {
        let mut changes = ChangeSet::default();
        self.merge_order(order, now, now, &mut changes);
        changes
    }

    /// Start a cancel: mark the order CANCELLED provisionally.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Terminal`] if the order is already EXECUTED or
    /// CANCELLED, and [`StoreError::CancelInFlight`] if a cancel is pending.
    /// The store is unchanged in both cases.
    pub fn begin_cancel(
        &mut self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<CancelTicket, StoreError> {
        let Some(tracked) = self.orders.get_mut(order_id) else {
            debug!(order_id = %order_id, "Cancel for unknown order, no optimistic step");
            return Ok(CancelTicket {
                command_id: None,
                changes: ChangeSet::default(),
            });
        };
        if tracked.pending_cancel.is_some() {
            return Err(StoreError::CancelInFlight(order_id.clone()));
        }
        if tracked.confirmed_state.is_terminal() {
            return Err(StoreError::Terminal {
                order_id: order_id.clone(),
                state: tracked.confirmed_state,
            });
        }

        let command_id = CommandId::generate();
        self.pending.insert(PendingCommand {
            command_id: command_id.clone(),
            order_id: order_id.clone(),
            kind: PendingKind::Cancel,
            issued_at: now,
            rollback_state: tracked.confirmed_state,
        });
        tracked.pending_cancel = Some(command_id.clone());
        tracked.order.state = OrderState::Cancelled;

        debug!(order_id = %order_id, command_id = %command_id, "Order provisionally cancelled");
        Ok(CancelTicket {
            command_id: Some(command_id),
            changes: ChangeSet {
                orders: true,
                ..ChangeSet::default()
            },
        })
    }

    /// Apply the server's response to a cancel.
    ///
    /// If the command was already superseded (a fill won), the response is
    /// applied only as a forward transition and cannot resurrect the
    /// provisional state.
    pub fn confirm_cancel(
        &mut self,
        command_id: &CommandId,
        order: Order,
        now: DateTime<Utc>,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let order_id = order.order_id.clone();

        if self.pending.get(command_id).is_none() {
            debug!(
                order_id = %order_id,
                command_id = %command_id,
                "Late cancel response for a resolved command"
            );
        }

        if self.orders.contains_key(&order_id) {
            let at = order.executed_at.unwrap_or(now);
            self.transition(&order_id, order.state, at, now, &mut changes);
        } else {
            self.merge_order(order, now, now, &mut changes);
        }

        let still_provisional = self
            .orders
            .get(&order_id)
            .is_some_and(|tracked| tracked.pending_cancel.as_ref() == Some(command_id));
        if still_provisional {
            changes.merge(self.reject_cancel(command_id, "server did not cancel the order", now));
        }
        changes
    }

    /// Roll back a cancel that failed.
    ///
    /// A no-op if the command was already resolved.
    pub fn reject_cancel(
        &mut self,
        command_id: &CommandId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let Some(pending) = self.pending.remove(command_id) else {
            debug!(command_id = %command_id, "Cancel failure for a resolved command");
            return changes;
        };
        let Some(tracked) = self.orders.get_mut(&pending.order_id) else {
            return changes;
        };
        if tracked.pending_cancel.as_ref() != Some(command_id) {
            return changes;
        }

        tracked.pending_cancel = None;
        tracked.order.state = pending.rollback_state;
        changes.orders = true;

        warn!(
            order_id = %pending.order_id,
            restored = %pending.rollback_state,
            reason,
            "Optimistic cancel rolled back"
        );
        changes.conflicts.push(ReconciliationConflict {
            order_id: pending.order_id,
            kind: ConflictKind::CancelRejected {
                reason: reason.to_string(),
            },
            superseded_state: OrderState::Cancelled,
            resolved_state: pending.rollback_state,
            detected_at: now,
        });
        changes
    }

    // =========================================================================
    // Event entry points
    // =========================================================================

    /// Apply one decoded server event.
    pub fn apply_event(&mut self, event: ServerEvent, now: DateTime<Utc>) -> ChangeSet {
        match event {
            ServerEvent::OrderStateChanged {
                order_id,
                new_state,
                timestamp,
            } => self.apply_state_change(order_id, new_state, timestamp, now),
            ServerEvent::TradeExecuted {
                trade,
                resulting_order_state,
            } => self.apply_trade(trade, resulting_order_state, now),
            ServerEvent::PortfolioUpdated { holdings } => self.apply_holdings(holdings),
            ServerEvent::Heartbeat => ChangeSet::default(),
        }
    }

    /// Apply a pushed state change, buffering it if the order is unknown.
    pub fn apply_state_change(
        &mut self,
        order_id: OrderId,
        new_state: OrderState,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if !self.orders.contains_key(&order_id) {
            debug!(order_id = %order_id, state = %new_state, "Buffering state change for unknown order");
            self.buffer.push(
                order_id,
                DeferredEvent::StateChange {
                    new_state,
                    timestamp,
                },
                now,
            );
            return changes;
        }
        self.transition(&order_id, new_state, timestamp, now, &mut changes);
        changes
    }

    /// Apply a pushed fill.
    pub fn apply_trade(
        &mut self,
        trade: Trade,
        resulting_order_state: OrderState,
        now: DateTime<Utc>,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();
        self.settle_trade(trade, resulting_order_state, now, &mut changes);
        changes
    }

    /// Replace holdings wholesale.
    pub fn apply_holdings(&mut self, holdings: Vec<Holding>) -> ChangeSet {
        let mut changes = ChangeSet::default();
        if self.portfolio.holdings != holdings {
            self.portfolio.replace_holdings(holdings);
            changes.portfolio = true;
        }
        changes
    }

    /// Merge an authoritative snapshot.
    ///
    /// Holdings and instruments are replaced. Orders merge per id by
    /// precedence and trades are appended if new.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot, now: DateTime<Utc>) -> ChangeSet {
        let Snapshot {
            orders,
            trades,
            portfolio,
            instruments,
            as_of,
        } = snapshot;
        let mut changes = ChangeSet::default();

        if !instruments.is_empty() {
            self.instruments = instruments
                .into_iter()
                .map(|instrument| (instrument.symbol.clone(), instrument))
                .collect();
        }
        for order in orders {
            self.merge_order(order, as_of, now, &mut changes);
        }
        for trade in trades {
            self.record_historical_trade(trade, now, &mut changes);
        }
        if self.portfolio != portfolio {
            self.portfolio = portfolio;
            changes.portfolio = true;
        }
        self.last_snapshot_at = Some(as_of);

        info!(
            as_of = %as_of,
            orders = self.orders.len(),
            trades = self.trades.len(),
            conflicts = changes.conflicts.len(),
            "Snapshot applied"
        );
        changes
    }

    /// Discard buffered events older than the buffer window and roll back
    /// optimistic commands older than the command timeout.
    pub fn collect_garbage(&mut self, now: DateTime<Utc>) -> Collected {
        let expired_events = self.buffer.expire(now);

        let mut changes = ChangeSet::default();
        if let Some(cutoff) = now.checked_sub_signed(self.config.command_timeout_delta()) {
            for command_id in self.pending.issued_before(cutoff) {
                changes.merge(self.reject_cancel(
                    &command_id,
                    "no response before the command timeout",
                    now,
                ));
            }
        }

        Collected {
            expired_events,
            changes,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn transition(
        &mut self,
        order_id: &OrderId,
        new_state: OrderState,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) {
        let Some(tracked) = self.orders.get_mut(order_id) else {
            return;
        };

        if let Some(command_id) = tracked.pending_cancel.clone() {
            match new_state {
                OrderState::Executed => {
                    self.pending.remove(&command_id);
                    tracked.pending_cancel = None;
                    tracked.settle(OrderState::Executed, Some(at), now);
                    changes.orders = true;
                    warn!(order_id = %order_id, "Fill arrived before cancel confirmation, fill wins");
                    changes.conflicts.push(ReconciliationConflict {
                        order_id: order_id.clone(),
                        kind: ConflictKind::FillBeatCancel,
                        superseded_state: OrderState::Cancelled,
                        resolved_state: OrderState::Executed,
                        detected_at: now,
                    });
                }
                OrderState::Cancelled => {
                    self.pending.remove(&command_id);
                    tracked.pending_cancel = None;
                    tracked.settle(OrderState::Cancelled, None, now);
                    changes.orders = true;
                    debug!(order_id = %order_id, "Provisional cancel confirmed");
                }
                OrderState::Placed => {}
            }
            return;
        }

        match OrderStateMachine::classify(tracked.confirmed_state, new_state) {
            Transition::Advance => {
                tracked.settle(new_state, Some(at), now);
                changes.orders = true;
                debug!(order_id = %order_id, state = %new_state, "Order state advanced");
            }
            Transition::Unchanged => {
                debug!(order_id = %order_id, state = %new_state, "Duplicate state change ignored");
            }
            Transition::Stale => {
                debug!(
                    order_id = %order_id,
                    current = %tracked.confirmed_state,
                    incoming = %new_state,
                    "Non-forward state change ignored"
                );
            }
        }
    }

    fn merge_order(
        &mut self,
        remote: Order,
        as_of: DateTime<Utc>,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) {
        let order_id = remote.order_id.clone();
        let Some(tracked) = self.orders.get(&order_id) else {
            debug!(order_id = %order_id, state = %remote.state, "Order recorded");
            self.orders
                .insert(order_id.clone(), TrackedOrder::new(remote, now));
            changes.orders = true;
            self.replay_buffered(&order_id, now, changes);
            return;
        };

        let decision = resolve(
            tracked.confirmed_state,
            tracked.changed_at,
            remote.state,
            as_of,
            self.config.local_tolerance_delta(),
        );
        match decision {
            MergeDecision::KeepLocal => {}
            MergeDecision::Advance => {
                let at = remote.executed_at.unwrap_or(as_of);
                self.transition(&order_id, remote.state, at, now, changes);
            }
            MergeDecision::Override => {
                if let Some(tracked) = self.orders.get_mut(&order_id) {
                    let superseded = tracked.confirmed_state;
                    tracked.settle(remote.state, remote.executed_at, now);
                    tracked.order.executed_at = remote.executed_at;
                    changes.orders = true;
                    warn!(
                        order_id = %order_id,
                        local = %superseded,
                        snapshot = %remote.state,
                        "Snapshot replaced stale local order state"
                    );
                    changes.conflicts.push(ReconciliationConflict {
                        order_id,
                        kind: ConflictKind::SnapshotOverride,
                        superseded_state: superseded,
                        resolved_state: remote.state,
                        detected_at: now,
                    });
                }
            }
        }
    }

    fn settle_trade(
        &mut self,
        trade: Trade,
        resulting_order_state: OrderState,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) {
        if self.trade_ids.contains(&trade.trade_id) {
            debug!(trade_id = %trade.trade_id, "Duplicate trade ignored");
            return;
        }
        if !self.orders.contains_key(&trade.order_id) {
            debug!(
                trade_id = %trade.trade_id,
                order_id = %trade.order_id,
                "Buffering trade for unknown order"
            );
            self.buffer.push(
                trade.order_id.clone(),
                DeferredEvent::Trade {
                    trade,
                    resulting_order_state,
                },
                now,
            );
            return;
        }

        let mark_price = self
            .instruments
            .get(&trade.symbol)
            .map(|instrument| instrument.last_traded_price);
        match self.portfolio.apply_trade(&trade, mark_price) {
            Ok(()) => changes.portfolio = true,
            Err(err) => {
                warn!(
                    trade_id = %trade.trade_id,
                    symbol = %trade.symbol,
                    quantity = trade.quantity,
                    price = %trade.price,
                    error = %err,
                    "Fill recorded without holding update"
                );
                changes.holding_errors.push(err);
            }
        }

        let order_id = trade.order_id.clone();
        let executed_at = trade.timestamp;
        self.append_trade(trade);
        changes.trades = true;

        self.transition(&order_id, resulting_order_state, executed_at, now, changes);
    }

    fn record_historical_trade(&mut self, trade: Trade, now: DateTime<Utc>, changes: &mut ChangeSet) {
        if self.trade_ids.contains(&trade.trade_id) {
            return;
        }
        if !self.orders.contains_key(&trade.order_id) {
            self.buffer.push(
                trade.order_id.clone(),
                DeferredEvent::HistoricalTrade(trade),
                now,
            );
            return;
        }
        self.append_trade(trade);
        changes.trades = true;
    }

    fn append_trade(&mut self, trade: Trade) {
        self.trade_ids.insert(trade.trade_id.clone());
        self.trades.push(trade);
    }

    fn replay_buffered(&mut self, order_id: &OrderId, now: DateTime<Utc>, changes: &mut ChangeSet) {
        let events = self.buffer.take(order_id, now);
        if events.is_empty() {
            return;
        }
        debug!(order_id = %order_id, count = events.len(), "Replaying buffered events");
        for event in events {
            match event {
                DeferredEvent::StateChange {
                    new_state,
                    timestamp,
                } => self.transition(order_id, new_state, timestamp, now, changes),
                DeferredEvent::Trade {
                    trade,
                    resulting_order_state,
                } => self.settle_trade(trade, resulting_order_state, now, changes),
                DeferredEvent::HistoricalTrade(trade) => {
                    self.record_historical_trade(trade, now, changes);
                }
            }
        }
    }
}
