//! `sbt backtest run`.
//!
//! Config and input errors fail the command. Per-period problems are part of
//! the run result and only show up as `skipped=` / skipped_periods.csv.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

use sbt_backtest::{BacktestConfig, BacktestEngine};
use sbt_config::{report_unused_keys, UnusedKeyPolicy};
use sbt_md::{CsvPriceSource, PriceDataSource, TwelveDataPriceSource};
use sbt_screen::{load_fundamentals_csv, FundamentalsRepository, InMemoryFundamentals};

use super::ENV_TWELVEDATA_API_KEY;

pub struct BacktestRunArgs {
    pub config_paths: Vec<String>,
    pub fundamentals: Option<String>,
    pub prices: Option<String>,
    pub twelvedata: bool,
    pub exports: String,
    pub strict_keys: bool,
    pub persist: bool,
}

pub async fn backtest_run(args: BacktestRunArgs) -> Result<()> {
    let path_refs: Vec<&str> = args.config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = sbt_config::load_layered_yaml(&path_refs)?;

    let policy = if args.strict_keys {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(&loaded.config_json, policy)?;
    for p in &report.unused_leaf_pointers {
        warn!(pointer = %p, "config key not read by backtest");
    }

    let config = BacktestConfig::from_config_json(&loaded.config_json)
        .context("invalid backtest config")?;

    let repo: Box<dyn FundamentalsRepository> = match &args.fundamentals {
        Some(path) => {
            let rows = load_fundamentals_csv(Path::new(path))
                .with_context(|| format!("load fundamentals failed: {path}"))?;
            Box::new(InMemoryFundamentals::new(rows).context("fundamentals csv rejected")?)
        }
        None => {
            let pool = sbt_db::connect_from_env().await?;
            Box::new(sbt_db::PgFundamentals::new(pool))
        }
    };

    let prices: Box<dyn PriceDataSource> = if args.twelvedata {
        let api_key = std::env::var(ENV_TWELVEDATA_API_KEY)
            .with_context(|| format!("missing env var {ENV_TWELVEDATA_API_KEY}"))?;
        Box::new(TwelveDataPriceSource::new(api_key))
    } else {
        let path = args
            .prices
            .as_deref()
            .context("must provide --prices or --twelvedata")?;
        Box::new(
            CsvPriceSource::from_path(Path::new(path))
                .with_context(|| format!("load prices failed: {path}"))?,
        )
    };

    let engine = BacktestEngine::new(config, repo, prices);
    let run = engine.run_new().await.context("backtest run rejected")?;

    let art = sbt_artifacts::write_run_artifacts(
        Path::new(&args.exports),
        &run,
        &loaded.config_hash,
    )?;

    if args.persist {
        let pool = sbt_db::connect_from_env().await?;
        sbt_db::insert_backtest_run(&pool, &run, &loaded.config_hash).await?;
        println!("persisted=true");
    }

    println!("run_id={}", run.run_id);
    println!("config_hash={}", loaded.config_hash);
    println!("scheduled_periods={}", run.scheduled_periods);
    println!("snapshots={}", run.snapshots.len());
    println!("skipped={}", run.skipped.len());
    println!("final_value={:.2}", run.final_value());
    println!("cagr={}", run.metrics.cagr);
    println!("sharpe={}", run.metrics.sharpe);
    println!("max_drawdown={}", run.metrics.max_drawdown);
    println!("artifacts={}", art.run_dir.display());

    Ok(())
}
