use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use sbt_backtest::BacktestRun;

pub const SCHEMA_VERSION: i32 = 1;
pub const ENGINE_ID: &str = "sbt-backtest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: i32,
    pub run_id: Uuid,
    pub engine_id: String,
    pub config_hash: String,
    pub created_at_utc: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rebalance_frequency: String,
    pub scheduled_periods: usize,
    pub snapshots: usize,
    pub skipped_periods: usize,
    pub artifacts: ArtifactList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactList {
    pub manifest_json: String,
    pub equity_curve_csv: String,
    pub drawdown_curve_csv: String,
    pub composition_csv: String,
    pub top_ranked_csv: String,
    pub skipped_periods_csv: String,
    pub metrics_json: String,
}

impl Default for ArtifactList {
    fn default() -> Self {
        Self {
            manifest_json: "manifest.json".to_string(),
            equity_curve_csv: "equity_curve.csv".to_string(),
            drawdown_curve_csv: "drawdown_curve.csv".to_string(),
            composition_csv: "composition.csv".to_string(),
            top_ranked_csv: "top_ranked.csv".to_string(),
            skipped_periods_csv: "skipped_periods.csv".to_string(),
            metrics_json: "metrics.json".to_string(),
        }
    }
}

pub struct WriteRunArtifactsResult {
    pub run_dir: PathBuf,
    pub manifest_path: PathBuf,
}

/// Write `exports_root/<run_id>/` for a finished run. Existing files for the
/// same run id are overwritten.
pub fn write_run_artifacts(
    exports_root: &Path,
    run: &BacktestRun,
    config_hash: &str,
) -> Result<WriteRunArtifactsResult> {
    let run_dir = exports_root.join(run.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("create exports dir failed: {}", run_dir.display()))?;

    let names = ArtifactList::default();
    let result = run.result();

    write_csv(
        &run_dir.join(&names.equity_curve_csv),
        &["date", "value"],
        &result.equity_curve,
    )?;
    write_csv(
        &run_dir.join(&names.drawdown_curve_csv),
        &["date", "drawdown"],
        &result.drawdown_curve,
    )?;
    write_csv(
        &run_dir.join(&names.composition_csv),
        &[
            "period_start",
            "period_end",
            "ticker",
            "weight",
            "shares",
            "start_price",
            "end_price",
            "end_value",
        ],
        &run.compositions,
    )?;
    write_csv(
        &run_dir.join(&names.top_ranked_csv),
        &[
            "period_start",
            "period_end",
            "cutoff_year",
            "position",
            "ticker",
            "year",
            "composite_rank",
            "roce",
            "roe",
            "pat",
            "pe",
            "market_cap",
        ],
        &run.top_ranked,
    )?;

    let skipped: Vec<SkippedRow<'_>> = run
        .skipped
        .iter()
        .map(|s| SkippedRow {
            period_start: s.period.start,
            period_end: s.period.end,
            kind: s.kind.as_str(),
            reason: &s.reason,
        })
        .collect();
    write_csv(
        &run_dir.join(&names.skipped_periods_csv),
        &["period_start", "period_end", "kind", "reason"],
        &skipped,
    )?;

    let metrics_path = run_dir.join(&names.metrics_json);
    let json = serde_json::to_string_pretty(&result.metrics).context("serialize metrics failed")?;
    fs::write(&metrics_path, format!("{json}\n"))
        .with_context(|| format!("write metrics failed: {}", metrics_path.display()))?;

    let manifest = RunManifest {
        schema_version: SCHEMA_VERSION,
        run_id: run.run_id,
        engine_id: ENGINE_ID.to_string(),
        config_hash: config_hash.to_string(),
        created_at_utc: Utc::now(),
        start_date: run.config.start_date,
        end_date: run.config.end_date,
        rebalance_frequency: run.config.frequency.as_str().to_string(),
        scheduled_periods: run.scheduled_periods,
        snapshots: run.snapshots.len(),
        skipped_periods: run.skipped.len(),
        artifacts: names,
    };

    let manifest_path = run_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest).context("serialize manifest failed")?;
    fs::write(&manifest_path, format!("{json}\n"))
        .with_context(|| format!("write manifest failed: {}", manifest_path.display()))?;

    Ok(WriteRunArtifactsResult {
        run_dir,
        manifest_path,
    })
}

pub fn read_manifest(path: &Path) -> Result<RunManifest> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read manifest failed: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse manifest failed: {}", path.display()))
}

#[derive(Serialize)]
struct SkippedRow<'a> {
    period_start: NaiveDate,
    period_end: NaiveDate,
    kind: &'a str,
    reason: &'a str,
}

fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("create csv failed: {}", path.display()))?;
    wtr.write_record(header)
        .with_context(|| format!("write csv header failed: {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("write csv row failed: {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("flush csv failed: {}", path.display()))?;
    Ok(())
}
