//! Trading Session
//!
//! The explicit context object for one logged-in session. It owns the
//! reconciliation store, routes commands through the [`CommandClient`] and
//! applies their optimistic effects, consumes connection events, and
//! publishes every resulting change to subscribers.
//!
//! # Locking
//!
//! The store sits behind a mutex that is never held across an await. Each
//! mutation builds its [`StateUpdate`]s and enqueues them before releasing
//! the lock, so subscribers see updates in mutation order. Delivery happens
//! after the lock is released, so callbacks may read the session freely.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command_client::{CommandClient, SnapshotScope};
use crate::domain::reconciliation::{
    ChangeSet, OrderView, ReconciliationConfig, ReconciliationStore, ServerEvent,
};
use crate::domain::subscription::{
    ConnectivityStatus, Selector, StateUpdate, SubscriptionHandle, SubscriptionHub, UpdateQueue,
};
use crate::domain::trading::{
    CommandId, Instrument, Order, OrderId, OrderRequest, Portfolio, Trade,
};
use crate::error::CommandError;
use crate::infrastructure::metrics;
use crate::infrastructure::stream::{ConnectionEvent, EventDecoder, ReconnectConfig, ReconnectPolicy};

// =============================================================================
// Configuration
// =============================================================================

/// Session tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Buffer window and snapshot tolerance.
    pub reconciliation: ReconciliationConfig,
    /// How often expired buffered events are collected.
    pub gc_interval: Duration,
    /// Backoff for snapshot retries after a reconnect.
    pub snapshot_retry: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconciliation: ReconciliationConfig::default(),
            gc_interval: Duration::from_secs(1),
            snapshot_retry: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// One trading session.
pub struct TradingSession {
    store: Mutex<ReconciliationStore>,
    commands: CommandClient,
    hub: SubscriptionHub,
    outbox: UpdateQueue,
    decoder: EventDecoder,
    connectivity: Mutex<ConnectivityStatus>,
    shutdown: CancellationToken,
    config: SessionConfig,
}

impl std::fmt::Debug for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingSession")
            .field("connectivity", &*self.connectivity.lock())
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl TradingSession {
    /// Start a session with an empty store.
    #[must_use]
    pub fn new(commands: CommandClient, config: SessionConfig) -> Self {
        Self {
            store: Mutex::new(ReconciliationStore::new(config.reconciliation.clone())),
            commands,
            hub: SubscriptionHub::new(),
            outbox: UpdateQueue::new(),
            decoder: EventDecoder::new(),
            connectivity: Mutex::new(ConnectivityStatus::Closed),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All orders, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<OrderView> {
        self.store.lock().orders()
    }

    /// One order.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<OrderView> {
        self.store.lock().order(order_id)
    }

    /// Trade history in arrival order.
    #[must_use]
    pub fn trades(&self) -> Vec<Trade> {
        self.store.lock().trades().to_vec()
    }

    /// Current portfolio.
    #[must_use]
    pub fn portfolio(&self) -> Portfolio {
        self.store.lock().portfolio().clone()
    }

    /// Instruments from the last snapshot.
    #[must_use]
    pub fn instruments(&self) -> Vec<Instrument> {
        self.store.lock().instruments()
    }

    /// Cancels awaiting a response.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.store.lock().pending_commands()
    }

    /// Events waiting for an order the session has not seen yet.
    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.store.lock().buffered_events()
    }

    /// Current event channel status.
    #[must_use]
    pub fn connectivity(&self) -> ConnectivityStatus {
        *self.connectivity.lock()
    }

    /// The underlying command client.
    #[must_use]
    pub const fn commands(&self) -> &CommandClient {
        &self.commands
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Observe one slice of the session state.
    pub fn subscribe<F>(&self, selector: Selector, callback: F) -> SubscriptionHandle
    where
        F: Fn(&StateUpdate) + Send + Sync + 'static,
    {
        self.hub.subscribe(selector, callback)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Validate and place an order, then record it.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] without contacting the server,
    /// or the server or network failure.
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order, CommandError> {
        let order = self.commands.place_order(request).await?;
        info!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            "Order placed"
        );
        let recorded = order.clone();
        self.apply(|store, now| ((), store.record_order(recorded, now)));
        Ok(order)
    }

    /// Cancel an order optimistically.
    ///
    /// The order shows CANCELLED immediately. A failed cancel rolls it back
    /// and emits a notice, as does dropping this future before the server
    /// answers. After a server-side invalid state the order is
    /// re-fetched so the session learns what actually happened.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InvalidState`] if the order is already
    /// terminal or has a cancel in flight, or the server or network failure.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, CommandError> {
        let command_id = self.apply(|store, now| match store.begin_cancel(order_id, now) {
            Ok(ticket) => (Ok(ticket.command_id), ticket.changes),
            Err(err) => (Err(err), ChangeSet::default()),
        })?;
        let mut abandon = AbandonedCancel {
            session: self,
            command_id: command_id.clone(),
        };

        let response = self.commands.cancel_order(order_id).await;
        abandon.command_id = None;

        match response {
            Ok(order) => {
                info!(order_id = %order_id, state = %order.state, "Cancel acknowledged");
                let recorded = order.clone();
                self.apply(|store, now| {
                    let changes = match &command_id {
                        Some(command_id) => store.confirm_cancel(command_id, recorded, now),
                        None => store.record_order(recorded, now),
                    };
                    ((), changes)
                });
                Ok(order)
            }
            Err(err) => {
                if let Some(command_id) = &command_id {
                    let reason = err.to_string();
                    self.apply(|store, now| ((), store.reject_cancel(command_id, &reason, now)));
                }
                if matches!(err, CommandError::InvalidState { .. }) {
                    if let Err(refresh_err) = self.refresh_order(order_id).await {
                        warn!(order_id = %order_id, error = %refresh_err, "Order refresh after refused cancel failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Re-fetch one order and merge it.
    ///
    /// # Errors
    ///
    /// Returns the lookup failure.
    pub async fn refresh_order(&self, order_id: &OrderId) -> Result<Order, CommandError> {
        let order = self.commands.get_order(order_id).await?;
        let recorded = order.clone();
        self.apply(|store, now| ((), store.record_order(recorded, now)));
        Ok(order)
    }

    /// Fetch and merge an authoritative snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first failing request.
    pub async fn refresh_snapshot(&self) -> Result<(), CommandError> {
        let scope = {
            let store = self.store.lock();
            SnapshotScope {
                open_orders: store.open_order_ids(),
                known_orders: store.known_order_ids(),
            }
        };

        match self.commands.fetch_snapshot(scope).await {
            Ok(snapshot) => {
                metrics::record_snapshot(true);
                self.apply(|store, now| ((), store.apply_snapshot(snapshot, now)));
                Ok(())
            }
            Err(err) => {
                metrics::record_snapshot(false);
                Err(err)
            }
        }
    }

    // =========================================================================
    // Event stream
    // =========================================================================

    /// Consume connection events until shutdown or the channel ends.
    pub async fn run(&self, mut events: mpsc::Receiver<ConnectionEvent>) {
        let mut gc = tokio::time::interval(self.config.gc_interval.max(Duration::from_millis(1)));
        gc.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Session event loop started");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Session shut down");
                    break;
                }
                _ = gc.tick() => {
                    self.collect_garbage(Utc::now());
                }
                event = events.recv() => {
                    match event {
                        Some(ConnectionEvent::Status(status)) => self.on_status(status).await,
                        Some(ConnectionEvent::Message(raw)) => self.ingest(&raw),
                        None => {
                            info!("Connection event channel ended");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// React to a channel status change.
    ///
    /// On OPEN the session resynchronizes from a snapshot before it returns,
    /// so no event is applied ahead of the snapshot.
    pub async fn on_status(&self, status: ConnectivityStatus) {
        {
            let mut current = self.connectivity.lock();
            let previous = std::mem::replace(&mut *current, status);
            if previous != status {
                debug!(from = %previous, to = %status, "Connectivity changed");
                self.outbox.enqueue([StateUpdate::Connectivity(status)]);
            }
        }
        self.outbox.drain(&self.hub);
        if status == ConnectivityStatus::Open {
            self.resync().await;
        }
    }

    /// Decode and apply one raw event message.
    ///
    /// Malformed messages are logged and discarded.
    pub fn ingest(&self, raw: &str) {
        match self.decoder.decode(raw) {
            Ok(event) => self.apply_event(event),
            Err(err) => {
                metrics::record_decode_failure();
                warn!(error = %err, len = raw.len(), "Discarding undecodable event");
            }
        }
    }

    /// Apply one decoded event.
    pub fn apply_event(&self, event: ServerEvent) {
        let kind = event.kind();
        metrics::record_event_received(kind);
        if matches!(event, ServerEvent::Heartbeat) {
            return;
        }
        debug!(kind, "Applying event");
        self.apply(|store, now| ((), store.apply_event(event, now)));
    }

    /// Drop buffered events older than the buffer window and roll back
    /// cancels that never got a response.
    ///
    /// Returns the number of buffered events dropped.
    pub fn collect_garbage(&self, now: DateTime<Utc>) -> usize {
        let expired = self.apply(|store, _| {
            let collected = store.collect_garbage(now);
            (collected.expired_events, collected.changes)
        });
        if expired > 0 {
            metrics::record_buffered_expired(u64::try_from(expired).unwrap_or(u64::MAX));
        }
        expired
    }

    async fn resync(&self) {
        let mut policy = ReconnectPolicy::new(self.config.snapshot_retry.clone());
        loop {
            match self.refresh_snapshot().await {
                Ok(()) => return,
                Err(err) if err.is_unauthorized() => {
                    error!(error = %err, "Snapshot refused, credentials rejected");
                    return;
                }
                Err(err) => {
                    let Some(delay) = policy.next_delay() else {
                        error!(error = %err, attempts = policy.attempt_count(), "Snapshot retries exhausted");
                        return;
                    };
                    warn!(
                        error = %err,
                        attempt = policy.attempt_count(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Snapshot failed, retrying"
                    );
                    tokio::select! {
                        () = self.shutdown.cancelled() => return,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Token cancelled on logout. Hand it to the connection manager.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// End the session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    fn apply<R>(&self, mutate: impl FnOnce(&mut ReconciliationStore, DateTime<Utc>) -> (R, ChangeSet)) -> R {
        let result = {
            let mut store = self.store.lock();
            let (result, changes) = mutate(&mut store, Utc::now());
            self.outbox.enqueue(Self::updates_for(&store, changes));
            result
        };
        self.outbox.drain(&self.hub);
        result
    }

    fn updates_for(store: &ReconciliationStore, changes: ChangeSet) -> Vec<StateUpdate> {
        let mut updates = Vec::new();
        if changes.orders {
            updates.push(StateUpdate::Orders(store.orders()));
        }
        if changes.trades {
            updates.push(StateUpdate::Trades(store.trades().to_vec()));
        }
        if changes.portfolio {
            updates.push(StateUpdate::Portfolio(store.portfolio().clone()));
        }
        for _ in &changes.holding_errors {
            metrics::record_holding_error();
        }
        for conflict in changes.conflicts {
            metrics::record_conflict(&conflict.kind);
            warn!(
                order_id = %conflict.order_id,
                superseded = %conflict.superseded_state,
                resolved = %conflict.resolved_state,
                "{conflict}"
            );
            updates.push(StateUpdate::Notice(conflict));
        }
        updates
    }
}

/// Rolls back an optimistic cancel whose future was dropped before the
/// server answered.
struct AbandonedCancel<'a> {
    session: &'a TradingSession,
    command_id: Option<CommandId>,
}

impl Drop for AbandonedCancel<'_> {
    fn drop(&mut self) {
        if let Some(command_id) = self.command_id.take() {
            debug!(command_id = %command_id, "Cancel abandoned before its response");
            self.session.apply(|store, now| {
                ((), store.reject_cancel(&command_id, "cancel abandoned before the server answered", now))
            });
        }
    }
}

/// Shared handle to a session.
pub type SharedSession = Arc<TradingSession>;
