//! sbt-portfolio: share-based period valuation
//!
//! Buy-and-hold within one rebalance period: capital is split by weight at
//! the period's first close and marked at its last close.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::allocator::PositionWeights;

/// One ticker's holding over one period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub ticker: String,
    pub weight: f64,
    pub shares: f64,
    pub start_price: f64,
    pub end_price: f64,
    pub end_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodValuation {
    pub start_capital: f64,
    pub end_value: f64,
    /// Ticker order.
    pub positions: Vec<PositionValuation>,
}

/// Value `capital` held at `weights` from start to end prices.
///
/// shares = capital × weight / start_price; a zero start price gives zero
/// shares. Tickers without both prices contribute nothing.
pub fn value_period(
    capital: f64,
    weights: &PositionWeights,
    start_prices: &BTreeMap<String, f64>,
    end_prices: &BTreeMap<String, f64>,
) -> PeriodValuation {
    let mut positions = Vec::with_capacity(weights.len());
    let mut end_value = 0.0;

    for (ticker, weight) in weights.iter() {
        let (Some(&start_price), Some(&end_price)) =
            (start_prices.get(ticker), end_prices.get(ticker))
        else {
            continue;
        };
        let shares = if start_price == 0.0 {
            0.0
        } else {
            capital * weight / start_price
        };
        let value = shares * end_price;
        end_value += value;
        positions.push(PositionValuation {
            ticker: ticker.to_string(),
            weight,
            shares,
            start_price,
            end_price,
            end_value: value,
        });
    }

    PeriodValuation {
        start_capital: capital,
        end_value,
        positions,
    }
}
