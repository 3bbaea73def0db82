//! sbt-backtest
//!
//! Screened-universe portfolio backtest.
//!
//! Pipeline per rebalance period: SCREEN (point-in-time fundamentals) ->
//! FETCH (prices, retried) -> WEIGHT -> VALUE. Metrics once at the end.
//!
//! - Strictly sequential: each period starts from the previous period's capital
//! - No lookahead: period screening sees only fiscal years <= the period's start year
//! - Partial-failure tolerant: a bad period is recorded as skipped, never fatal

mod engine;
pub mod metrics;
pub mod schedule;
pub mod simulator;
pub mod types;

pub use engine::BacktestEngine;
pub use metrics::{drawdown_curve, Annualization, Metrics, MetricsCalculator};
pub use schedule::{periods, rebalance_dates, RebalanceFrequency, RebalancePeriod, RebalanceScheduler};
pub use simulator::{PeriodError, PortfolioSimulator};
pub use types::{
    BacktestConfig, BacktestRun, CompositionRecord, ConfigError, DrawdownPoint, EquityPoint,
    PortfolioSnapshot, RunResult, SkipKind, SkippedPeriod, TopRankedRecord,
};
