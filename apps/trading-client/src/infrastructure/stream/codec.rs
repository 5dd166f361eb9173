//! Stream Codec Module
//!
//! Decodes inbound channel messages into [`ServerEvent`]s.
//!
//! One JSON object per message, discriminated by `type`:
//!
//! ```json
//! {"type":"order_state_changed","order_id":"…","new_state":"EXECUTED","timestamp":"…"}
//! {"type":"trade_executed","trade":{…},"resulting_order_state":"EXECUTED"}
//! {"type":"trade","trade":{…}}
//! {"type":"portfolio_updated","holdings":[…]}
//! {"type":"heartbeat"}
//! ```
//!
//! `trade` is the server's legacy fill broadcast. It carries no resulting
//! state and always means a full fill. A bare `ping`/`pong` text frame is a
//! heartbeat.
//!
//! Fills must carry a positive quantity and price, and holdings must not be
//! negative. Anything else is rejected before it reaches the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::error::Category;

use crate::domain::reconciliation::ServerEvent;
use crate::domain::trading::timestamp;
use crate::domain::trading::{Holding, OrderId, OrderState, Trade};

/// Decode errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Blank message.
    #[error("empty message")]
    Empty,

    /// Not valid JSON.
    #[error("invalid JSON: {0}")]
    Syntax(String),

    /// Valid JSON that is not a usable event, including fills without a
    /// positive size.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => Self::InvalidEvent(err.to_string()),
            Category::Syntax | Category::Eof | Category::Io => Self::Syntax(err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    OrderStateChanged {
        order_id: OrderId,
        #[serde(alias = "state")]
        new_state: OrderState,
        #[serde(with = "timestamp::utc")]
        timestamp: DateTime<Utc>,
    },
    TradeExecuted {
        trade: Trade,
        #[serde(default)]
        resulting_order_state: Option<OrderState>,
    },
    Trade {
        trade: Trade,
    },
    PortfolioUpdated {
        holdings: Vec<Holding>,
    },
    Heartbeat,
}

fn checked_trade(trade: Trade) -> Result<Trade, DecodeError> {
    if trade.quantity <= 0 {
        return Err(DecodeError::InvalidEvent(format!(
            "trade {} has non-positive quantity {}",
            trade.trade_id, trade.quantity
        )));
    }
    if trade.price <= Decimal::ZERO {
        return Err(DecodeError::InvalidEvent(format!(
            "trade {} has non-positive price {}",
            trade.trade_id, trade.price
        )));
    }
    Ok(trade)
}

fn checked_holdings(holdings: Vec<Holding>) -> Result<Vec<Holding>, DecodeError> {
    if let Some(bad) = holdings.iter().find(|h| {
        h.quantity < 0 || h.avg_price < Decimal::ZERO || h.current_value < Decimal::ZERO
    }) {
        return Err(DecodeError::InvalidEvent(format!(
            "holding {} has negative quantity or value",
            bad.symbol
        )));
    }
    Ok(holdings)
}

impl TryFrom<WireEvent> for ServerEvent {
    type Error = DecodeError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        Ok(match wire {
            WireEvent::OrderStateChanged {
                order_id,
                new_state,
                timestamp,
            } => Self::OrderStateChanged {
                order_id,
                new_state,
                timestamp,
            },
            WireEvent::TradeExecuted {
                trade,
                resulting_order_state,
            } => Self::TradeExecuted {
                trade: checked_trade(trade)?,
                resulting_order_state: resulting_order_state.unwrap_or(OrderState::Executed),
            },
            WireEvent::Trade { trade } => Self::TradeExecuted {
                trade: checked_trade(trade)?,
                resulting_order_state: OrderState::Executed,
            },
            WireEvent::PortfolioUpdated { holdings } => Self::PortfolioUpdated {
                holdings: checked_holdings(holdings)?,
            },
            WireEvent::Heartbeat => Self::Heartbeat,
        })
    }
}

/// JSON decoder for the event channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventDecoder;

impl EventDecoder {
    /// Create a new decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text message.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for anything that is not a recognized event.
    pub fn decode(&self, raw: &str) -> Result<ServerEvent, DecodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DecodeError::Empty);
        }
        if trimmed.eq_ignore_ascii_case("ping") || trimmed.eq_ignore_ascii_case("pong") {
            return Ok(ServerEvent::Heartbeat);
        }
        let wire: WireEvent = serde_json::from_str(trimmed)?;
        ServerEvent::try_from(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::OrderSide;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    const TRADE: &str = r#"{"trade_id":"t-1","order_id":"o-1","symbol":"RELIANCE","quantity":10,"price":2500.0,"side":"BUY","timestamp":"2024-03-01T09:15:30.123456","user_id":"demo-user"}"#;

    fn decode(raw: &str) -> Result<ServerEvent, DecodeError> {
        EventDecoder::new().decode(raw)
    }

    #[test]
    fn decodes_order_state_changed() {
        let event = decode(
            r#"{"type":"order_state_changed","order_id":"o-1","new_state":"CANCELLED","timestamp":"2024-03-01T09:15:30"}"#,
        )
        .unwrap();
        match event {
            ServerEvent::OrderStateChanged {
                order_id,
                new_state,
                ..
            } => {
                assert_eq!(order_id.as_str(), "o-1");
                assert_eq!(new_state, OrderState::Cancelled);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_trade_executed_with_state() {
        let raw = format!(
            r#"{{"type":"trade_executed","trade":{TRADE},"resulting_order_state":"PLACED"}}"#
        );
        let ServerEvent::TradeExecuted {
            trade,
            resulting_order_state,
        } = decode(&raw).unwrap()
        else {
            panic!("expected trade");
        };
        assert_eq!(resulting_order_state, OrderState::Placed);
        assert_eq!(trade.side, OrderSide::Buy);
        assert_eq!(trade.price, dec!(2500));
    }

    #[test]
    fn legacy_trade_broadcast_means_full_fill() {
        let raw = format!(r#"{{"type":"trade","trade":{TRADE}}}"#);
        let ServerEvent::TradeExecuted {
            trade,
            resulting_order_state,
        } = decode(&raw).unwrap()
        else {
            panic!("expected trade");
        };
        assert_eq!(resulting_order_state, OrderState::Executed);
        assert_eq!(trade.quantity, 10);
    }

    #[test]
    fn decodes_portfolio_and_heartbeat() {
        let event = decode(
            r#"{"type":"portfolio_updated","holdings":[{"symbol":"TCS","quantity":5,"avg_price":3800.0,"current_value":19000.0}]}"#,
        )
        .unwrap();
        let ServerEvent::PortfolioUpdated { holdings } = event else {
            panic!("expected portfolio");
        };
        assert_eq!(holdings[0].quantity, 5);

        assert_eq!(decode(r#"{"type":"heartbeat"}"#).unwrap(), ServerEvent::Heartbeat);
        assert_eq!(decode("pong").unwrap(), ServerEvent::Heartbeat);
    }

    #[test]
    fn unknown_state_is_rejected() {
        let err = decode(
            r#"{"type":"order_state_changed","order_id":"o-1","new_state":"REJECTED","timestamp":"2024-03-01T09:15:30"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEvent(_)));
    }

    #[test]
    fn missing_field_is_rejected() {
        let err = decode(r#"{"type":"order_state_changed","order_id":"o-1"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEvent(_)));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = decode(r#"{"type":"margin_call"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEvent(_)));
    }

    #[test_case(r#""quantity":0"#, r#""price":2500.0"# ; "zero quantity")]
    #[test_case(r#""quantity":-10"#, r#""price":2500.0"# ; "negative quantity")]
    #[test_case(r#""quantity":10"#, r#""price":0"# ; "zero price")]
    #[test_case(r#""quantity":10"#, r#""price":-1.5"# ; "negative price")]
    fn fill_without_positive_size_is_rejected(quantity: &str, price: &str) {
        let trade = TRADE
            .replace(r#""quantity":10"#, quantity)
            .replace(r#""price":2500.0"#, price);
        for raw in [
            format!(r#"{{"type":"trade_executed","trade":{trade},"resulting_order_state":"EXECUTED"}}"#),
            format!(r#"{{"type":"trade","trade":{trade}}}"#),
        ] {
            let err = decode(&raw).unwrap_err();
            assert!(matches!(err, DecodeError::InvalidEvent(_)), "{raw}: {err:?}");
        }
    }

    #[test_case(r#"{"symbol":"TCS","quantity":-5,"avg_price":3800.0,"current_value":19000.0}"# ; "negative quantity")]
    #[test_case(r#"{"symbol":"TCS","quantity":5,"avg_price":-3800.0,"current_value":19000.0}"# ; "negative average price")]
    #[test_case(r#"{"symbol":"TCS","quantity":5,"avg_price":3800.0,"current_value":-1}"# ; "negative value")]
    fn negative_holding_is_rejected(holding: &str) {
        let raw = format!(r#"{{"type":"portfolio_updated","holdings":[{holding}]}}"#);
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEvent(message) if message.contains("TCS")));
    }

    #[test]
    fn closed_out_holding_is_accepted() {
        let event = decode(
            r#"{"type":"portfolio_updated","holdings":[{"symbol":"TCS","quantity":0,"avg_price":0,"current_value":0}]}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::PortfolioUpdated { holdings } if holdings[0].quantity == 0));
    }

    #[test]
    fn garbage_is_a_syntax_error() {
        assert!(matches!(decode("{not json"), Err(DecodeError::Syntax(_))));
        assert_eq!(decode("   "), Err(DecodeError::Empty));
    }
}
