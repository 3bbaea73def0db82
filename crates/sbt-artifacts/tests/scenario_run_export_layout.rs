use std::fs;

use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

use sbt_artifacts::{read_manifest, write_run_artifacts, SCHEMA_VERSION};
use sbt_backtest::{
    BacktestConfig, BacktestRun, CompositionRecord, Metrics, PortfolioSnapshot, RebalancePeriod,
    SkipKind, SkippedPeriod,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn run() -> BacktestRun {
    let config = BacktestConfig::from_config_json(&json!({
        "backtest": {
            "initial_capital": 1000,
            "start_date": "2021-01-01",
            "end_date": "2021-04-01",
            "rebalance_frequency": "monthly"
        },
        "ranking": {"spec": "roe:desc"},
        "sizing": {"portfolio_size": 2}
    }))
    .unwrap();

    BacktestRun {
        run_id: Uuid::new_v4(),
        config,
        snapshots: vec![
            PortfolioSnapshot { date: d(2021, 1, 29), value: 1_100.0 },
            PortfolioSnapshot { date: d(2021, 3, 31), value: 990.0 },
        ],
        compositions: vec![CompositionRecord {
            period_start: d(2021, 1, 1),
            period_end: d(2021, 2, 1),
            ticker: "AAA".to_string(),
            weight: 1.0,
            shares: 100.0,
            start_price: 10.0,
            end_price: 11.0,
            end_value: 1_100.0,
        }],
        top_ranked: vec![],
        skipped: vec![SkippedPeriod {
            period: RebalancePeriod::new(d(2021, 2, 1), d(2021, 3, 1)),
            kind: SkipKind::PriceFetch,
            reason: "transport error: reset, retrying".to_string(),
        }],
        metrics: Metrics {
            cagr: -4.1,
            sharpe: 0.0,
            max_drawdown: -10.0,
        },
        scheduled_periods: 3,
    }
}

#[test]
fn scenario_export_writes_every_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let run = run();
    let out = write_run_artifacts(tmp.path(), &run, "abc123").unwrap();

    assert_eq!(out.run_dir, tmp.path().join(run.run_id.to_string()));

    let manifest = read_manifest(&out.manifest_path).unwrap();
    assert_eq!(manifest.schema_version, SCHEMA_VERSION);
    assert_eq!(manifest.run_id, run.run_id);
    assert_eq!(manifest.config_hash, "abc123");
    assert_eq!(manifest.scheduled_periods, 3);
    assert_eq!(manifest.snapshots, 2);
    assert_eq!(manifest.skipped_periods, 1);

    let equity = fs::read_to_string(out.run_dir.join("equity_curve.csv")).unwrap();
    assert_eq!(equity, "date,value\n2021-01-29,1100.0\n2021-03-31,990.0\n");

    let dd = fs::read_to_string(out.run_dir.join("drawdown_curve.csv")).unwrap();
    assert_eq!(dd, "date,drawdown\n2021-01-29,0.0\n2021-03-31,-0.1\n");

    let comp = fs::read_to_string(out.run_dir.join("composition.csv")).unwrap();
    assert!(comp.starts_with("period_start,period_end,ticker,weight"));
    assert!(comp.contains("2021-01-01,2021-02-01,AAA,1.0,100.0,10.0,11.0,1100.0"));

    let top = fs::read_to_string(out.run_dir.join("top_ranked.csv")).unwrap();
    assert_eq!(top.lines().count(), 1);

    let skipped = fs::read_to_string(out.run_dir.join("skipped_periods.csv")).unwrap();
    assert!(skipped.contains("2021-02-01,2021-03-01,price_fetch,\"transport error: reset, retrying\""));

    let metrics: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.run_dir.join("metrics.json")).unwrap()).unwrap();
    assert_eq!(metrics["max_drawdown"], json!(-10.0));
}
