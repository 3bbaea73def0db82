//! sbt-db
//!
//! Postgres storage for fundamentals and finished backtest runs.
//!
//! - `PgFundamentals` serves point-in-time screening from the `fundamentals` table.
//! - Runs are written once, in one transaction, after the engine returns.
//! - Equity curves are read back in date order; drawdown is derived, not stored.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
pub use sqlx::PgPool;

mod fundamentals;
mod runs;

pub use fundamentals::{upsert_fundamentals, FundamentalsImport, PgFundamentals};
pub use runs::{
    export_run_csv, fetch_equity_curve, fetch_run_summary, insert_backtest_run, StoredRun,
};

pub const ENV_DB_URL: &str = "SBT_DATABASE_URL";

/// Connect to Postgres using SBT_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_fundamentals_table: table_exists(pool, "fundamentals").await?,
        has_runs_table: table_exists(pool, "backtest_runs").await?,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_fundamentals_table: bool,
    pub has_runs_table: bool,
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed: {table}"))?;
    Ok(exists)
}
