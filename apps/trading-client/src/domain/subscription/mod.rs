//! Subscription Hub
//!
//! Lets consumers observe slices of the client state without touching the
//! reconciliation store.
//!
//! # Design
//!
//! - One [`StateUpdate`] is published per slice per mutation, so a callback
//!   sees every field change from one event in a single notification.
//! - Publishing snapshots the subscriber list and releases the lock before
//!   invoking callbacks. A callback may therefore subscribe or unsubscribe,
//!   including unsubscribing itself.
//! - [`SubscriptionHandle::unsubscribe`] is idempotent. Dropping a handle
//!   does not unsubscribe.
//! - [`UpdateQueue`] delivers updates in the order they were enqueued, even
//!   when several tasks mutate state concurrently.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::domain::reconciliation::{OrderView, ReconciliationConflict};
use crate::domain::trading::{Portfolio, Trade};

// =============================================================================
// Types
// =============================================================================

/// Which slice a subscriber observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Order list.
    Orders,
    /// Trade history.
    Trades,
    /// Holdings.
    Portfolio,
    /// Event channel status.
    Connectivity,
    /// Reconciliation conflict notices.
    Notices,
}

impl Selector {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::Trades => "trades",
            Self::Portfolio => "portfolio",
            Self::Connectivity => "connectivity",
            Self::Notices => "notices",
        }
    }
}

/// Status of the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityStatus {
    /// Dialing or waiting to redial.
    Connecting,
    /// Channel established.
    Open,
    /// Channel down.
    Closed,
}

impl ConnectivityStatus {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification for one slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    /// Full order list after the change.
    Orders(Vec<OrderView>),
    /// Full trade history after the change.
    Trades(Vec<Trade>),
    /// Portfolio after the change.
    Portfolio(Portfolio),
    /// New channel status.
    Connectivity(ConnectivityStatus),
    /// An optimistic change was superseded.
    Notice(ReconciliationConflict),
}

impl StateUpdate {
    /// The slice this update belongs to.
    #[must_use]
    pub const fn selector(&self) -> Selector {
        match self {
            Self::Orders(_) => Selector::Orders,
            Self::Trades(_) => Selector::Trades,
            Self::Portfolio(_) => Selector::Portfolio,
            Self::Connectivity(_) => Selector::Connectivity,
            Self::Notice(_) => Selector::Notices,
        }
    }
}

/// Subscriber callback.
pub type Callback = Arc<dyn Fn(&StateUpdate) + Send + Sync>;

struct Subscriber {
    id: u64,
    selector: Selector,
    active: AtomicBool,
    callback: Callback,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
}

// =============================================================================
// Hub
// =============================================================================

/// Fan-out point for state updates.
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    inner: Arc<HubInner>,
}

impl fmt::Debug for SubscriptionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHub")
            .field("subscribers", &self.inner.subscribers.read().len())
            .finish()
    }
}

impl SubscriptionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one slice.
    pub fn subscribe<F>(&self, selector: Selector, callback: F) -> SubscriptionHandle
    where
        F: Fn(&StateUpdate) + Send + Sync + 'static,
    {
        let subscriber = Arc::new(Subscriber {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            selector,
            active: AtomicBool::new(true),
            callback: Arc::new(callback),
        });
        self.inner.subscribers.write().push(Arc::clone(&subscriber));

        SubscriptionHandle {
            subscriber,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an update to every active subscriber of its slice.
    ///
    /// Returns the number of callbacks invoked.
    pub fn publish(&self, update: &StateUpdate) -> usize {
        let selector = update.selector();
        let targets: Vec<Arc<Subscriber>> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|subscriber| subscriber.selector == selector)
            .cloned()
            .collect();

        let mut delivered = 0;
        for subscriber in targets {
            if subscriber.active.load(Ordering::Acquire) {
                (subscriber.callback)(update);
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of active subscribers for a slice.
    #[must_use]
    pub fn subscriber_count(&self, selector: Selector) -> usize {
        self.inner
            .subscribers
            .read()
            .iter()
            .filter(|subscriber| subscriber.selector == selector)
            .count()
    }
}

// =============================================================================
// Ordered delivery
// =============================================================================

#[derive(Default)]
struct QueueState {
    pending: VecDeque<StateUpdate>,
    draining: bool,
}

/// FIFO of updates awaiting delivery.
///
/// Producers enqueue while they still hold the lock that serializes their
/// mutations, then call [`UpdateQueue::drain`] after releasing it. Exactly
/// one caller drains at a time and callbacks run with no lock held, so a
/// callback may read state, subscribe or enqueue more updates. A caller that
/// finds a drain in progress returns at once and its updates are delivered
/// by the active drainer.
#[derive(Default)]
pub struct UpdateQueue {
    state: Mutex<QueueState>,
}

impl fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("UpdateQueue")
            .field("pending", &state.pending.len())
            .field("draining", &state.draining)
            .finish()
    }
}

struct DrainGuard<'a>(&'a Mutex<QueueState>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        // Only reached early if a callback panicked.
        self.0.lock().draining = false;
    }
}

impl UpdateQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append updates behind everything already queued.
    pub fn enqueue(&self, updates: impl IntoIterator<Item = StateUpdate>) {
        self.state.lock().pending.extend(updates);
    }

    /// Deliver queued updates through `hub` until the queue is empty.
    ///
    /// Returns the number of updates this call delivered.
    pub fn drain(&self, hub: &SubscriptionHub) -> usize {
        {
            let mut state = self.state.lock();
            if state.draining || state.pending.is_empty() {
                return 0;
            }
            state.draining = true;
        }
        let guard = DrainGuard(&self.state);

        let mut delivered = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.pending.pop_front();
                if next.is_none() {
                    state.draining = false;
                }
                next
            };
            let Some(update) = next else {
                std::mem::forget(guard);
                return delivered;
            };
            hub.publish(&update);
            delivered += 1;
        }
    }

    /// Updates waiting for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Handle returned by [`SubscriptionHub::subscribe`].
#[must_use = "dropping the handle keeps the callback registered; keep it to unsubscribe"]
pub struct SubscriptionHandle {
    subscriber: Arc<Subscriber>,
    hub: Weak<HubInner>,
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.subscriber.id)
            .field("selector", &self.subscriber.selector)
            .field("active", &self.is_active())
            .finish()
    }
}

impl SubscriptionHandle {
    /// Stop receiving updates. Safe to call repeatedly and from a callback.
    pub fn unsubscribe(&self) {
        if !self.subscriber.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(hub) = self.hub.upgrade() {
            let id = self.subscriber.id;
            hub.subscribers.write().retain(|subscriber| subscriber.id != id);
        }
    }

    /// Whether the subscription is still live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscriber.active.load(Ordering::Acquire)
    }

    /// The observed slice.
    #[must_use]
    pub fn selector(&self) -> Selector {
        self.subscriber.selector
    }
}
