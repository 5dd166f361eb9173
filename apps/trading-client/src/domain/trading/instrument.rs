//! Tradeable instruments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A tradeable instrument. The symbol is the identity; the price is refreshed
/// from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique symbol.
    pub symbol: String,
    /// Listing exchange.
    pub exchange: String,
    /// Instrument class (e.g. `EQ`).
    pub instrument_type: String,
    /// Last traded price.
    #[serde(with = "rust_decimal::serde::float")]
    pub last_traded_price: Decimal,
}
