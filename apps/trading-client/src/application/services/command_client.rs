//! Command Client
//!
//! Typed request/response operations over a [`CommandTransport`]. Requests
//! are validated before they leave the process. Place and cancel are sent
//! exactly once; any retry is the caller's decision.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::application::ports::{CommandTransport, TransportError};
use crate::domain::reconciliation::Snapshot;
use crate::domain::trading::{Instrument, Order, OrderId, OrderRequest, Portfolio, Trade};
use crate::error::{CommandError, ValidationError};
use crate::infrastructure::metrics::{self, CommandKind};

/// Orders a snapshot should cover.
///
/// The server has no order listing, so the snapshot looks up each order the
/// client still considers open, plus any order a trade refers to that the
/// client has never seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotScope {
    /// Orders whose confirmed state is still PLACED.
    pub open_orders: Vec<OrderId>,
    /// Every order the client knows.
    pub known_orders: HashSet<OrderId>,
}

/// Issues commands and queries against the trading server.
#[derive(Clone)]
pub struct CommandClient {
    transport: Arc<dyn CommandTransport>,
}

impl std::fmt::Debug for CommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClient").finish_non_exhaustive()
    }
}

impl CommandClient {
    /// Create a client over a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        Self { transport }
    }

    /// Validate and submit an order.
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order, CommandError> {
        let request = request.validate()?;
        let started = Instant::now();
        let result = self.transport.place_order(&request).await;
        metrics::record_command(CommandKind::Place, result.is_ok(), started.elapsed());

        result.map_err(|err| {
            warn!(symbol = %request.symbol, error = %err, "Place order failed");
            map_transport_error(err, None)
        })
    }

    /// Cancel an order.
    ///
    /// A 400 from the server means the order is already terminal and maps to
    /// [`CommandError::InvalidState`].
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, CommandError> {
        let started = Instant::now();
        let result = self.transport.cancel_order(order_id).await;
        metrics::record_command(CommandKind::Cancel, result.is_ok(), started.elapsed());

        result.map_err(|err| {
            warn!(order_id = %order_id, error = %err, "Cancel order failed");
            map_transport_error(err, Some(order_id))
        })
    }

    /// Look up one order.
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, CommandError> {
        self.query(self.transport.get_order(order_id)).await
    }

    /// Current holdings.
    pub async fn get_portfolio(&self) -> Result<Portfolio, CommandError> {
        self.query(self.transport.get_portfolio()).await
    }

    /// Trade history.
    pub async fn get_trades(&self) -> Result<Vec<Trade>, CommandError> {
        self.query(self.transport.get_trades()).await
    }

    /// All instruments with their last traded prices.
    pub async fn list_instruments(&self) -> Result<Vec<Instrument>, CommandError> {
        self.query(self.transport.get_instruments()).await
    }

    /// One instrument. The symbol is matched case-insensitively.
    pub async fn get_instrument(&self, symbol: &str) -> Result<Instrument, CommandError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol.into());
        }
        self.query(self.transport.get_instrument(&symbol)).await
    }

    /// Fetch an authoritative snapshot.
    ///
    /// `as_of` is taken before the first request. Orders that return 404 are
    /// skipped; any other failure fails the whole snapshot.
    pub async fn fetch_snapshot(&self, scope: SnapshotScope) -> Result<Snapshot, CommandError> {
        let as_of = Utc::now();
        let (portfolio, trades, instruments) = tokio::try_join!(
            self.get_portfolio(),
            self.get_trades(),
            self.list_instruments(),
        )?;

        let mut wanted: Vec<OrderId> = scope.open_orders;
        let mut seen: HashSet<OrderId> = wanted.iter().cloned().collect();
        for trade in &trades {
            if !scope.known_orders.contains(&trade.order_id) && seen.insert(trade.order_id.clone()) {
                wanted.push(trade.order_id.clone());
            }
        }

        let lookups = join_all(wanted.iter().map(|order_id| self.get_order(order_id))).await;
        let mut orders = Vec::with_capacity(lookups.len());
        for (order_id, lookup) in wanted.iter().zip(lookups) {
            match lookup {
                Ok(order) => orders.push(order),
                Err(CommandError::NotFound(detail)) => {
                    warn!(order_id = %order_id, detail = %detail, "Order missing from server, skipped in snapshot");
                }
                Err(err) => return Err(err),
            }
        }

        debug!(
            orders = orders.len(),
            trades = trades.len(),
            holdings = portfolio.holdings.len(),
            "Snapshot fetched"
        );
        Ok(Snapshot {
            orders,
            trades,
            portfolio,
            instruments,
            as_of,
        })
    }

    async fn query<T>(
        &self,
        request: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, CommandError> {
        let started = Instant::now();
        let result = request.await;
        metrics::record_command(CommandKind::Query, result.is_ok(), started.elapsed());
        result.map_err(|err| map_transport_error(err, None))
    }
}

/// Map a transport failure to the error callers see.
///
/// `cancel_target` is set for cancels, where a 400 means the order is
/// already terminal.
#[must_use]
pub fn map_transport_error(err: TransportError, cancel_target: Option<&OrderId>) -> CommandError {
    match (err, cancel_target) {
        (
            TransportError::Status {
                status: 401 | 403,
                detail,
            },
            _,
        ) => CommandError::Unauthorized(detail),
        (TransportError::Status { status: 400, detail }, Some(order_id)) => {
            CommandError::InvalidState {
                order_id: order_id.clone(),
                reason: detail,
            }
        }
        (TransportError::Status { status: 404, detail }, _) => CommandError::NotFound(detail),
        (
            TransportError::Status {
                status: 400..=499,
                detail,
            },
            _,
        ) => CommandError::Rejected(detail),
        (TransportError::Status { status, detail }, _) => {
            CommandError::Unknown(format!("HTTP {status}: {detail}"))
        }
        (TransportError::Network(message), _) => CommandError::Network(message),
        (TransportError::Decode(message), _) => {
            CommandError::Unknown(format!("malformed response: {message}"))
        }
    }
}
