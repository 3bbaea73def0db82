use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use sbt_backtest::{drawdown_curve, BacktestConfig, BacktestRun, PortfolioSnapshot};

const ENGINE_ID: &str = "sbt-backtest";

/// Effective configuration as stored alongside a run.
fn config_json(cfg: &BacktestConfig) -> Value {
    json!({
        "initial_capital": cfg.initial_capital,
        "start_date": cfg.start_date,
        "end_date": cfg.end_date,
        "rebalance_frequency": cfg.frequency.as_str(),
        "sizing": cfg.sizing.as_str(),
        "portfolio_size": cfg.portfolio_size,
        "screen": screen_json(cfg),
        "ranking": {
            "spec": cfg.ranking.to_string(),
            "composite": cfg.ranking.composite,
        },
        "retry": {
            "max_attempts": cfg.retry.max_attempts,
            "base_delay_ms": cfg.retry.base_delay.as_millis() as u64,
            "max_jitter_ms": cfg.retry.max_jitter.as_millis() as u64,
        },
        "annualization": cfg.annualization.as_str(),
    })
}

/// Unbounded thresholds have no JSON number; only bounds that were set are kept.
fn screen_json(cfg: &BacktestConfig) -> Value {
    let t = &cfg.thresholds;
    let bounds = [
        ("roce_min", t.roce_min),
        ("pat_min", t.pat_min),
        ("market_cap_min", t.market_cap_min),
        ("market_cap_max", t.market_cap_max),
    ];
    Value::Object(
        bounds
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect(),
    )
}

fn to_i32(n: usize, what: &str) -> Result<i32> {
    i32::try_from(n).with_context(|| format!("{what} out of range: {n}"))
}

/// Persist a finished run with all of its per-period records.
///
/// Single transaction: either the whole run is visible or none of it.
/// Inserting the same run id twice fails on the primary key.
pub async fn insert_backtest_run(pool: &PgPool, run: &BacktestRun, config_hash: &str) -> Result<()> {
    let cfg = &run.config;
    let mut tx = pool.begin().await.context("begin insert_backtest_run failed")?;

    sqlx::query(
        r#"
        insert into backtest_runs (
          run_id, engine_id, config_hash, config_json,
          start_date, end_date, rebalance_frequency, initial_capital,
          scheduled_periods, cagr, sharpe, max_drawdown
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(run.run_id)
    .bind(ENGINE_ID)
    .bind(config_hash)
    .bind(config_json(cfg))
    .bind(cfg.start_date)
    .bind(cfg.end_date)
    .bind(cfg.frequency.as_str())
    .bind(cfg.initial_capital)
    .bind(to_i32(run.scheduled_periods, "scheduled_periods")?)
    .bind(run.metrics.cagr)
    .bind(run.metrics.sharpe)
    .bind(run.metrics.max_drawdown)
    .execute(&mut *tx)
    .await
    .context("insert backtest_runs failed")?;

    for s in &run.snapshots {
        sqlx::query("insert into run_snapshots (run_id, date, value) values ($1, $2, $3)")
            .bind(run.run_id)
            .bind(s.date)
            .bind(s.value)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert run_snapshots failed: {}", s.date))?;
    }

    for c in &run.compositions {
        sqlx::query(
            r#"
            insert into run_compositions (
              run_id, period_start, period_end, ticker,
              weight, shares, start_price, end_price, end_value
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.run_id)
        .bind(c.period_start)
        .bind(c.period_end)
        .bind(&c.ticker)
        .bind(c.weight)
        .bind(c.shares)
        .bind(c.start_price)
        .bind(c.end_price)
        .bind(c.end_value)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert run_compositions failed: {} {}", c.period_start, c.ticker))?;
    }

    for t in &run.top_ranked {
        sqlx::query(
            r#"
            insert into run_top_ranked (
              run_id, period_start, period_end, cutoff_year, position, ticker, year,
              composite_rank, roce, roe, pat, pe, market_cap
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(run.run_id)
        .bind(t.period_start)
        .bind(t.period_end)
        .bind(t.cutoff_year)
        .bind(to_i32(t.position, "position")?)
        .bind(&t.ticker)
        .bind(t.year)
        .bind(t.composite_rank)
        .bind(t.roce)
        .bind(t.roe)
        .bind(t.pat)
        .bind(t.pe)
        .bind(t.market_cap)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert run_top_ranked failed: {} {}", t.period_start, t.ticker))?;
    }

    for s in &run.skipped {
        sqlx::query(
            r#"
            insert into run_skipped_periods (run_id, period_start, period_end, kind, reason)
            values ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run.run_id)
        .bind(s.period.start)
        .bind(s.period.end)
        .bind(s.kind.as_str())
        .bind(&s.reason)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert run_skipped_periods failed: {}", s.period.start))?;
    }

    tx.commit().await.context("commit insert_backtest_run failed")?;
    tracing::info!(
        run_id = %run.run_id,
        snapshots = run.snapshots.len(),
        skipped = run.skipped.len(),
        "backtest run persisted"
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub run_id: Uuid,
    pub engine_id: String,
    pub config_hash: String,
    pub config_json: Value,
    pub created_at_utc: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rebalance_frequency: String,
    pub initial_capital: f64,
    pub scheduled_periods: i32,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

pub async fn fetch_run_summary(pool: &PgPool, run_id: Uuid) -> Result<Option<StoredRun>> {
    let row = sqlx::query(
        r#"
        select run_id, engine_id, config_hash, config_json, created_at_utc,
               start_date, end_date, rebalance_frequency, initial_capital,
               scheduled_periods, cagr, sharpe, max_drawdown
        from backtest_runs
        where run_id = $1
        "#,
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .context("fetch_run_summary failed")?;

    let Some(r) = row else {
        return Ok(None);
    };

    Ok(Some(StoredRun {
        run_id: r.try_get("run_id").context("backtest_runs.run_id")?,
        engine_id: r.try_get("engine_id").context("backtest_runs.engine_id")?,
        config_hash: r.try_get("config_hash").context("backtest_runs.config_hash")?,
        config_json: r.try_get("config_json").context("backtest_runs.config_json")?,
        created_at_utc: r
            .try_get("created_at_utc")
            .context("backtest_runs.created_at_utc")?,
        start_date: r.try_get("start_date").context("backtest_runs.start_date")?,
        end_date: r.try_get("end_date").context("backtest_runs.end_date")?,
        rebalance_frequency: r
            .try_get("rebalance_frequency")
            .context("backtest_runs.rebalance_frequency")?,
        initial_capital: r
            .try_get("initial_capital")
            .context("backtest_runs.initial_capital")?,
        scheduled_periods: r
            .try_get("scheduled_periods")
            .context("backtest_runs.scheduled_periods")?,
        cagr: r.try_get("cagr").context("backtest_runs.cagr")?,
        sharpe: r.try_get("sharpe").context("backtest_runs.sharpe")?,
        max_drawdown: r.try_get("max_drawdown").context("backtest_runs.max_drawdown")?,
    }))
}

/// Snapshots of a run, oldest first. Empty for unknown runs.
pub async fn fetch_equity_curve(pool: &PgPool, run_id: Uuid) -> Result<Vec<PortfolioSnapshot>> {
    let rows = sqlx::query(
        r#"
        select date, value
        from run_snapshots
        where run_id = $1
        order by date asc
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("fetch_equity_curve failed")?;

    rows.iter()
        .map(|r| {
            Ok(PortfolioSnapshot {
                date: r.try_get::<NaiveDate, _>("date").context("run_snapshots.date")?,
                value: r.try_get::<f64, _>("value").context("run_snapshots.value")?,
            })
        })
        .collect()
}

#[derive(Serialize)]
struct CurveRow {
    date: NaiveDate,
    value: f64,
    drawdown: f64,
}

/// `date,value,drawdown` CSV for a stored run. Unknown run ids are an error;
/// a run with no snapshots yields the header only.
pub async fn export_run_csv(pool: &PgPool, run_id: Uuid) -> Result<String> {
    if fetch_run_summary(pool, run_id).await?.is_none() {
        return Err(anyhow!("backtest run not found: {run_id}"));
    }

    let snapshots = fetch_equity_curve(pool, run_id).await?;
    let drawdowns = drawdown_curve(&snapshots);

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(["date", "value", "drawdown"])
        .context("write csv header failed")?;
    for (s, d) in snapshots.iter().zip(drawdowns.iter()) {
        wtr.serialize(CurveRow {
            date: s.date,
            value: s.value,
            drawdown: d.drawdown,
        })
        .context("write csv row failed")?;
    }
    let bytes = wtr.into_inner().context("flush csv failed")?;
    String::from_utf8(bytes).context("csv output was not utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_config_is_the_effective_config() {
        let cfg = BacktestConfig::from_config_json(&json!({
            "backtest": {
                "initial_capital": 250000,
                "start_date": "2019-01-01",
                "end_date": "2020-01-01",
                "rebalance_frequency": "annual"
            },
            "ranking": {"spec": "ROE:DESC, pe:asc", "composite": "yes"},
            "sizing": {"policy": "roce", "portfolio_size": 5}
        }))
        .unwrap();

        let v = config_json(&cfg);
        assert_eq!(v["rebalance_frequency"], json!("yearly"));
        assert_eq!(v["sizing"], json!("roce"));
        assert_eq!(v["ranking"]["spec"], json!("roe:desc,pe:asc"));
        assert_eq!(v["ranking"]["composite"], json!(true));
        assert_eq!(v["start_date"], json!("2019-01-01"));
        assert_eq!(v["retry"]["max_attempts"], json!(3));
        assert_eq!(v["screen"], json!({}));
    }

    #[test]
    fn only_configured_thresholds_are_stored() {
        let cfg = BacktestConfig::from_config_json(&json!({
            "backtest": {
                "initial_capital": 1000,
                "start_date": "2019-01-01",
                "end_date": "2020-01-01",
                "rebalance_frequency": "monthly"
            },
            "screen": {"roce_min": 15, "market_cap_max": 50000},
            "ranking": {"spec": "roe:desc"},
            "sizing": {"portfolio_size": 3}
        }))
        .unwrap();

        let v = config_json(&cfg);
        assert_eq!(v["screen"], json!({"roce_min": 15.0, "market_cap_max": 50000.0}));
        assert!(!v.to_string().contains("null"));
    }

    #[test]
    fn oversized_counts_are_rejected() {
        assert_eq!(to_i32(7, "position").unwrap(), 7);
        assert!(to_i32(usize::MAX, "position").is_err());
    }
}
