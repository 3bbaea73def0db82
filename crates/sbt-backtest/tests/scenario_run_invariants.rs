//! Structural invariants over a longer run with noisy prices and gaps.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::json;

use sbt_backtest::{BacktestConfig, BacktestEngine};
use sbt_md::{InMemoryPriceSource, PriceFrame, PricePoint};
use sbt_screen::{FundamentalRecord, InMemoryFundamentals};

/// Deterministic pseudo-random sequence in [0, 1).
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

const TICKERS: [&str; 6] = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"];

fn fundamentals() -> InMemoryFundamentals {
    let mut rng = Lcg(7);
    let mut rows = Vec::new();
    for t in TICKERS {
        for year in 2018..=2021 {
            rows.push(
                FundamentalRecord::new(t, year)
                    .with_roce(10.0 + 20.0 * rng.next())
                    .with_roe(5.0 + 25.0 * rng.next())
                    .with_pat(100.0 * rng.next())
                    .with_pe(5.0 + 30.0 * rng.next())
                    .with_market_cap(1_000.0 + 50_000.0 * rng.next()),
            );
        }
    }
    InMemoryFundamentals::new(rows).unwrap()
}

fn prices() -> PriceFrame {
    let mut rng = Lcg(42);
    let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
    let mut frame = PriceFrame::new();
    for (i, t) in TICKERS.iter().enumerate() {
        let mut px = 50.0 + 10.0 * i as f64;
        let mut pts = Vec::new();
        for day in 0..(3 * 365) {
            let date = start + Duration::days(day);
            if date.weekday().number_from_monday() > 5 {
                continue;
            }
            px *= 1.0 + (rng.next() - 0.5) * 0.04;
            // FFF has a gap every March; EEE stops trading mid-2020.
            let missing = (*t == "FFF" && date.month() == 3)
                || (*t == "EEE" && date > NaiveDate::from_ymd_opt(2020, 6, 15).unwrap());
            pts.push(PricePoint::new(date, if missing { f64::NAN } else { px }));
        }
        frame.insert(*t, pts);
    }
    frame
}

fn config(sizing: &str, composite: bool) -> BacktestConfig {
    BacktestConfig::from_config_json(&json!({
        "backtest": {
            "initial_capital": 100000,
            "start_date": "2019-01-01",
            "end_date": "2021-12-31",
            "rebalance_frequency": "monthly"
        },
        "screen": {"roce_min": 12, "pat_min": 5, "market_cap_min": 2000, "market_cap_max": 60000},
        "ranking": {"spec": "roe:desc,pe:asc", "composite": composite},
        "sizing": {"policy": sizing, "portfolio_size": 4},
        "data": {"retry": {"max_attempts": 1, "base_delay_ms": 0, "max_jitter_ms": 0}}
    }))
    .unwrap()
}

#[tokio::test]
async fn scenario_invariants_hold_for_every_policy() {
    for sizing in ["equal", "market_cap", "roce", "roe"] {
        for composite in [true, false] {
            let run = BacktestEngine::new(
                config(sizing, composite),
                fundamentals(),
                InMemoryPriceSource::new(prices()),
            )
            .run_new()
            .await
            .unwrap();

            assert!(run.snapshots.len() <= run.scheduled_periods);
            assert_eq!(run.snapshots.len() + run.skipped.len(), run.scheduled_periods);
            assert!(!run.snapshots.is_empty(), "{sizing}: nothing valued");

            for w in run.snapshots.windows(2) {
                assert!(w[0].date < w[1].date, "{sizing}: dates not increasing");
            }
            for s in &run.snapshots {
                assert!(s.value >= 0.0);
            }

            let mut per_period: BTreeMap<NaiveDate, f64> = BTreeMap::new();
            for c in &run.compositions {
                *per_period.entry(c.period_start).or_default() += c.weight;
            }
            assert_eq!(per_period.len(), run.snapshots.len());
            for (start, sum) in per_period {
                assert!((sum - 1.0).abs() <= 1e-9, "{sizing} {start}: weights sum {sum}");
            }

            let result = run.result();
            assert_eq!(result.equity_curve.len(), run.snapshots.len());
            assert!(result.drawdown_curve.iter().all(|p| p.drawdown <= 0.0));
            assert!(run.metrics.max_drawdown <= 0.0);

            for r in &run.top_ranked {
                assert!(r.position >= 1 && r.position <= 4);
                assert!(r.year <= r.cutoff_year);
            }
        }
    }
}

#[tokio::test]
async fn scenario_identical_inputs_identical_results() {
    let a = BacktestEngine::new(config("roe", true), fundamentals(), InMemoryPriceSource::new(prices()))
        .run_new()
        .await
        .unwrap();
    let b = BacktestEngine::new(config("roe", true), fundamentals(), InMemoryPriceSource::new(prices()))
        .run_new()
        .await
        .unwrap();
    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.snapshots, b.snapshots);
    assert_eq!(a.compositions, b.compositions);
    assert_eq!(a.metrics, b.metrics);
}
