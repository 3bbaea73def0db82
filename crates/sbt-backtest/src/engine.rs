use chrono::Datelike;
use tracing::{debug, info};
use uuid::Uuid;

use sbt_md::{PriceDataSource, PriceRequest, WithRetryPolicy};
use sbt_screen::{FundamentalsRepository, ScreeningEngine};

use crate::metrics::MetricsCalculator;
use crate::schedule::{RebalancePeriod, RebalanceScheduler};
use crate::simulator::{PeriodError, PortfolioSimulator};
use crate::types::{BacktestConfig, BacktestRun, ConfigError, PortfolioSnapshot, TopRankedRecord};

/// Drives one run: schedule once, then screen -> fetch -> step per period,
/// then metrics once.
///
/// Periods run strictly in order; each starts from the capital the previous
/// one produced. Per-period failures become skips.
pub struct BacktestEngine<R, P> {
    config: BacktestConfig,
    screening: ScreeningEngine,
    repo: R,
    prices: WithRetryPolicy<P>,
}

impl<R, P> BacktestEngine<R, P>
where
    R: FundamentalsRepository,
    P: PriceDataSource,
{
    /// Price fetches use `config.retry`, overriding the source's own policy.
    pub fn new(config: BacktestConfig, repo: R, prices: P) -> Self {
        let screening = ScreeningEngine::new(
            config.thresholds,
            config.ranking.clone(),
            config.portfolio_size,
        );
        let prices = WithRetryPolicy::new(prices, config.retry);
        Self {
            config,
            screening,
            repo,
            prices,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run under a fresh v4 id.
    pub async fn run_new(&self) -> Result<BacktestRun, ConfigError> {
        self.run(Uuid::new_v4()).await
    }

    /// Only config errors fail the run. A run with no valued period still
    /// completes with degenerate metrics.
    pub async fn run(&self, run_id: Uuid) -> Result<BacktestRun, ConfigError> {
        self.config.validate()?;

        let periods = RebalanceScheduler::new(
            self.config.start_date,
            self.config.end_date,
            self.config.frequency,
        )
        .periods();

        info!(
            %run_id,
            start = %self.config.start_date,
            end = %self.config.end_date,
            frequency = self.config.frequency.as_str(),
            periods = periods.len(),
            "backtest started"
        );

        let mut sim = PortfolioSimulator::new(self.config.initial_capital, self.config.sizing);
        let mut top_ranked = Vec::new();

        for period in &periods {
            match self.run_period(period, &mut sim, &mut top_ranked).await {
                Ok(snap) => debug!(date = %snap.date, value = snap.value, "snapshot"),
                Err(e) => sim.skip(period, &e),
            }
        }

        let (snapshots, compositions, skipped) = sim.into_parts();
        let metrics = MetricsCalculator::new(self.config.annualization).compute(&snapshots);

        info!(
            %run_id,
            snapshots = snapshots.len(),
            skipped = skipped.len(),
            cagr = metrics.cagr,
            sharpe = metrics.sharpe,
            max_drawdown = metrics.max_drawdown,
            "backtest completed"
        );

        Ok(BacktestRun {
            run_id,
            config: self.config.clone(),
            snapshots,
            compositions,
            top_ranked,
            skipped,
            metrics,
            scheduled_periods: periods.len(),
        })
    }

    async fn run_period(
        &self,
        period: &RebalancePeriod,
        sim: &mut PortfolioSimulator,
        top_ranked: &mut Vec<TopRankedRecord>,
    ) -> Result<PortfolioSnapshot, PeriodError> {
        if period.is_empty() {
            return Err(PeriodError::ZeroLength);
        }

        let cutoff_year = period.start.year();
        let selection = self.screening.select_for_year(&self.repo, cutoff_year).await?;
        top_ranked.extend(TopRankedRecord::from_selection(period, &selection));

        let req = PriceRequest::new(selection.tickers(), period.start, period.end);
        let frame = self.prices.fetch_with_retry(&req).await?;

        sim.step(period, &selection, &frame)
    }
}
