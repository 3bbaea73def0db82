use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use sbt_md::{PriceError, PriceFrame};
use sbt_portfolio::{value_period, AllocationError, Holding, SizingPolicy, WeightAllocator};
use sbt_screen::{ScreenError, Selection};

use crate::metrics::round_to;
use crate::schedule::RebalancePeriod;
use crate::types::{CompositionRecord, PortfolioSnapshot, SkipKind, SkippedPeriod};

/// Why a period contributed nothing. Never fatal to the run.
#[derive(Clone, Debug, PartialEq)]
pub enum PeriodError {
    ZeroLength,
    Screen(ScreenError),
    Price(PriceError),
    /// No selected ticker has a complete price series in the period.
    NoPriceData,
    Allocation(AllocationError),
}

impl PeriodError {
    pub fn kind(&self) -> SkipKind {
        match self {
            PeriodError::ZeroLength => SkipKind::ZeroLength,
            PeriodError::Screen(ScreenError::NoCandidates { .. }) => SkipKind::NoCandidates,
            PeriodError::Screen(ScreenError::Repository(_)) => SkipKind::Repository,
            PeriodError::Price(_) => SkipKind::PriceFetch,
            PeriodError::NoPriceData => SkipKind::NoPriceData,
            PeriodError::Allocation(_) => SkipKind::Allocation,
        }
    }
}

impl fmt::Display for PeriodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodError::ZeroLength => write!(f, "zero-length period"),
            PeriodError::Screen(e) => write!(f, "{e}"),
            PeriodError::Price(e) => write!(f, "{e}"),
            PeriodError::NoPriceData => write!(f, "no ticker has a complete price series"),
            PeriodError::Allocation(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PeriodError {}

impl From<ScreenError> for PeriodError {
    fn from(e: ScreenError) -> Self {
        PeriodError::Screen(e)
    }
}

impl From<PriceError> for PeriodError {
    fn from(e: PriceError) -> Self {
        PeriodError::Price(e)
    }
}

impl From<AllocationError> for PeriodError {
    fn from(e: AllocationError) -> Self {
        PeriodError::Allocation(e)
    }
}

/// Sequential capital state machine for one run.
///
/// Owns the running capital and everything recorded so far. A failed or
/// skipped period leaves capital untouched and records no snapshot.
pub struct PortfolioSimulator {
    allocator: WeightAllocator,
    capital: f64,
    snapshots: Vec<PortfolioSnapshot>,
    compositions: Vec<CompositionRecord>,
    skipped: Vec<SkippedPeriod>,
}

impl PortfolioSimulator {
    pub fn new(initial_capital: f64, sizing: SizingPolicy) -> Self {
        Self {
            allocator: WeightAllocator::new(sizing),
            capital: initial_capital,
            snapshots: Vec::new(),
            compositions: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn snapshots(&self) -> &[PortfolioSnapshot] {
        &self.snapshots
    }

    pub fn compositions(&self) -> &[CompositionRecord] {
        &self.compositions
    }

    pub fn skipped(&self) -> &[SkippedPeriod] {
        &self.skipped
    }

    /// Hold `selection` through `period` at the closes in `frame`.
    ///
    /// Tickers without a complete series are dropped before weighting. On
    /// error nothing is mutated.
    pub fn step(
        &mut self,
        period: &RebalancePeriod,
        selection: &Selection,
        frame: &PriceFrame,
    ) -> Result<PortfolioSnapshot, PeriodError> {
        if period.is_empty() {
            return Err(PeriodError::ZeroLength);
        }

        let selected = frame.restrict(&selection.tickers());
        let survivors = selected.complete_tickers();
        if survivors.is_empty() {
            return Err(PeriodError::NoPriceData);
        }
        let priced = selected.restrict(&survivors);
        let date = priced.last_date().ok_or(PeriodError::NoPriceData)?;

        let holdings: Vec<Holding> = survivors
            .iter()
            .map(|t| {
                let mut h = Holding::new(t.as_str());
                if let Some(c) = selection.find(t) {
                    h.market_cap = c.record.market_cap;
                    h.roce = c.record.roce;
                    h.roe = c.record.roe;
                }
                h
            })
            .collect();
        let weights = self.allocator.allocate(&holdings)?;

        let mut start_prices = BTreeMap::new();
        let mut end_prices = BTreeMap::new();
        for t in &survivors {
            if let (Some(s), Some(e)) = (priced.first_close(t), priced.last_close(t)) {
                start_prices.insert(t.clone(), s);
                end_prices.insert(t.clone(), e);
            }
        }

        let valuation = value_period(self.capital, &weights, &start_prices, &end_prices);

        debug!(
            start = %period.start,
            end = %period.end,
            holdings = survivors.len(),
            dropped = selection.candidates.len().saturating_sub(survivors.len()),
            weight_sum = weights.sum(),
            start_capital = self.capital,
            end_value = valuation.end_value,
            "period valued"
        );

        self.compositions
            .extend(valuation.positions.iter().map(|p| CompositionRecord {
                period_start: period.start,
                period_end: period.end,
                ticker: p.ticker.clone(),
                weight: p.weight,
                shares: p.shares,
                start_price: p.start_price,
                end_price: p.end_price,
                end_value: p.end_value,
            }));

        let snapshot = PortfolioSnapshot {
            date,
            value: round_to(valuation.end_value, 2),
        };
        self.capital = valuation.end_value;
        self.snapshots.push(snapshot);
        Ok(snapshot)
    }

    /// Record `period` as contributing nothing.
    pub fn skip(&mut self, period: &RebalancePeriod, err: &PeriodError) {
        warn!(
            start = %period.start,
            end = %period.end,
            kind = err.kind().as_str(),
            reason = %err,
            capital = self.capital,
            "period skipped"
        );
        self.skipped.push(SkippedPeriod {
            period: *period,
            kind: err.kind(),
            reason: err.to_string(),
        });
    }

    pub fn into_parts(self) -> (Vec<PortfolioSnapshot>, Vec<CompositionRecord>, Vec<SkippedPeriod>) {
        (self.snapshots, self.compositions, self.skipped)
    }
}
