//! Holdings and the portfolio they make up.
//!
//! Buys blend into the cost basis with weighted-average-cost; sells reduce
//! quantity and leave the average price alone. All arithmetic is checked; a
//! fill that would overflow leaves the holding untouched.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderSide;
use super::trade::Trade;

/// Holding arithmetic that cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortfolioError {
    /// Quantity or value left the representable range.
    #[error("holding arithmetic overflow for {symbol}")]
    Overflow {
        /// Affected instrument.
        symbol: String,
    },
}

/// A position in one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Instrument symbol.
    pub symbol: String,
    /// Net quantity held.
    pub quantity: i64,
    /// Weighted-average cost per unit.
    #[serde(with = "rust_decimal::serde::float")]
    pub avg_price: Decimal,
    /// `last_traded_price * quantity`.
    #[serde(with = "rust_decimal::serde::float")]
    pub current_value: Decimal,
}

impl Holding {
    /// Create an empty holding.
    #[must_use]
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0,
            avg_price: Decimal::ZERO,
            current_value: Decimal::ZERO,
        }
    }

    /// Blend a buy into the cost basis.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] and leaves the holding unchanged
    /// if the new quantity or cost basis is out of range.
    pub fn apply_buy(&mut self, quantity: i64, price: Decimal) -> Result<(), PortfolioError> {
        let new_qty = self
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| self.overflow())?;

        let avg_price = if new_qty == 0 {
            Decimal::ZERO
        } else {
            let held_cost = Decimal::from(self.quantity).checked_mul(self.avg_price);
            let fill_cost = Decimal::from(quantity).checked_mul(price);
            held_cost
                .zip(fill_cost)
                .and_then(|(held, fill)| held.checked_add(fill))
                .and_then(|total| total.checked_div(Decimal::from(new_qty)))
                .ok_or_else(|| self.overflow())?
        };

        self.quantity = new_qty;
        self.avg_price = avg_price;
        Ok(())
    }

    /// Reduce quantity for a sell.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] if the quantity underflows.
    pub fn apply_sell(&mut self, quantity: i64) -> Result<(), PortfolioError> {
        self.quantity = self
            .quantity
            .checked_sub(quantity)
            .ok_or_else(|| self.overflow())?;
        Ok(())
    }

    /// Recompute `current_value` from a mark price.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] if the value is out of range.
    pub fn revalue(&mut self, mark_price: Decimal) -> Result<(), PortfolioError> {
        self.current_value = mark_price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| self.overflow())?;
        Ok(())
    }

    fn overflow(&self) -> PortfolioError {
        PortfolioError::Overflow {
            symbol: self.symbol.clone(),
        }
    }
}

/// The authenticated user's holdings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Owner.
    pub user_id: String,
    /// Holdings, one per symbol.
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    /// Look up a holding by symbol.
    #[must_use]
    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.symbol == symbol)
    }

    /// Settle a trade into the matching holding.
    ///
    /// `mark_price` is the instrument's last traded price when known; the
    /// fill price is used otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`PortfolioError::Overflow`] if the fill cannot be represented.
    /// The portfolio is unchanged in that case.
    pub fn apply_trade(
        &mut self,
        trade: &Trade,
        mark_price: Option<Decimal>,
    ) -> Result<(), PortfolioError> {
        let existing = self.holdings.iter().position(|h| h.symbol == trade.symbol);
        let mut holding = existing.map_or_else(
            || Holding::empty(trade.symbol.clone()),
            |index| self.holdings[index].clone(),
        );

        match trade.side {
            OrderSide::Buy => holding.apply_buy(trade.quantity, trade.price)?,
            OrderSide::Sell => holding.apply_sell(trade.quantity)?,
        }
        holding.revalue(mark_price.unwrap_or(trade.price))?;

        match existing {
            Some(index) => self.holdings[index] = holding,
            None => self.holdings.push(holding),
        }
        Ok(())
    }

    /// Replace all holdings.
    pub fn replace_holdings(&mut self, holdings: Vec<Holding>) {
        self.holdings = holdings;
    }
}
