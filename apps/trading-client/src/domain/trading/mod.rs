//! Trading entities: instruments, orders, trades and the portfolio.

mod identifiers;
mod instrument;
mod order;
mod portfolio;
mod state_machine;
mod trade;

pub mod timestamp;

pub use identifiers::{CommandId, OrderId, TradeId};
pub use instrument::Instrument;
pub use order::{Order, OrderRequest, OrderSide, OrderState, OrderStyle};
pub use portfolio::{Holding, Portfolio, PortfolioError};
pub use state_machine::{OrderStateMachine, Transition};
pub use trade::Trade;
