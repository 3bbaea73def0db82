//! `sbt db import-fundamentals` and `sbt db export-run`.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use sbt_db::PgPool;
use sbt_screen::{load_fundamentals_csv, InMemoryFundamentals};

use super::parse_run_id;

pub async fn import_fundamentals(pool: &PgPool, csv_path: &str) -> Result<()> {
    let rows = load_fundamentals_csv(Path::new(csv_path))
        .with_context(|| format!("load fundamentals failed: {csv_path}"))?;
    // Same duplicate check the CSV-backed backtest applies.
    let repo = InMemoryFundamentals::new(rows).context("fundamentals csv rejected")?;

    let res = sbt_db::upsert_fundamentals(pool, repo.rows()).await?;
    println!(
        "fundamentals_imported=true rows_read={} rows_inserted={} rows_updated={}",
        repo.len(),
        res.rows_inserted,
        res.rows_updated
    );
    Ok(())
}

pub async fn export_run(pool: &PgPool, run_id: &str, out: Option<&str>) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let csv = sbt_db::export_run_csv(pool, run_id).await?;

    match out {
        Some(path) => {
            fs::write(path, &csv).with_context(|| format!("write export failed: {path}"))?;
            println!("export_written=true run_id={} path={}", run_id, path);
        }
        None => print!("{csv}"),
    }
    Ok(())
}
