use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

use sbt_screen::{FundamentalRecord, FundamentalsRepository, RepositoryError};

/// `FundamentalsRepository` over the `companies` / `fundamentals` tables.
#[derive(Clone)]
pub struct PgFundamentals {
    pool: PgPool,
}

impl PgFundamentals {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

fn record_from_row(r: &sqlx::postgres::PgRow) -> Result<FundamentalRecord, sqlx::Error> {
    Ok(FundamentalRecord {
        company: r.try_get::<String, _>("ticker")?,
        year: r.try_get::<i32, _>("year")?,
        roce: r.try_get::<Option<f64>, _>("roce")?,
        roe: r.try_get::<Option<f64>, _>("roe")?,
        pat: r.try_get::<Option<f64>, _>("pat")?,
        pe: r.try_get::<Option<f64>, _>("pe")?,
        market_cap: r.try_get::<Option<f64>, _>("market_cap")?,
    })
}

#[async_trait]
impl FundamentalsRepository for PgFundamentals {
    async fn latest(
        &self,
        company: &str,
        cutoff_year: i32,
    ) -> Result<Option<FundamentalRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            select c.ticker, f.year, f.roce, f.roe, f.pat, f.pe, f.market_cap
            from fundamentals f
            join companies c on c.company_id = f.company_id
            where c.ticker = $1 and f.year <= $2
            order by f.year desc
            limit 1
            "#,
        )
        .bind(company)
        .bind(cutoff_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(record_from_row).transpose().map_err(backend)
    }

    /// Companies come back in import order (`company_id` is assigned on
    /// first sight), matching the in-memory repository.
    async fn latest_for_all(
        &self,
        cutoff_year: i32,
    ) -> Result<Vec<FundamentalRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            select distinct on (c.company_id)
              c.ticker, f.year, f.roce, f.roe, f.pat, f.pe, f.market_cap
            from fundamentals f
            join companies c on c.company_id = f.company_id
            where f.year <= $1
            order by c.company_id asc, f.year desc
            "#,
        )
        .bind(cutoff_year)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FundamentalsImport {
    pub rows_inserted: u64,
    pub rows_updated: u64,
}

/// Insert or replace `(ticker, year)` rows. Companies are created on first
/// sight. All rows land in one transaction.
pub async fn upsert_fundamentals(
    pool: &PgPool,
    records: &[FundamentalRecord],
) -> Result<FundamentalsImport> {
    let mut tx = pool.begin().await.context("begin fundamentals import failed")?;
    let mut out = FundamentalsImport::default();

    for r in records {
        let company_id: i64 = sqlx::query_scalar(
            r#"
            insert into companies (ticker) values ($1)
            on conflict (ticker) do update set ticker = excluded.ticker
            returning company_id
            "#,
        )
        .bind(&r.company)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("upsert company failed: {}", r.company))?;

        // (xmax = 0) is true on insert, false on update.
        let inserted: bool = sqlx::query_scalar(
            r#"
            insert into fundamentals (company_id, year, roce, roe, pat, pe, market_cap)
            values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (company_id, year) do update set
              roce = excluded.roce,
              roe = excluded.roe,
              pat = excluded.pat,
              pe = excluded.pe,
              market_cap = excluded.market_cap
            returning (xmax = 0)
            "#,
        )
        .bind(company_id)
        .bind(r.year)
        .bind(r.roce)
        .bind(r.roe)
        .bind(r.pat)
        .bind(r.pe)
        .bind(r.market_cap)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("upsert fundamentals failed: {} {}", r.company, r.year))?;

        if inserted {
            out.rows_inserted += 1;
        } else {
            out.rows_updated += 1;
        }
    }

    tx.commit().await.context("commit fundamentals import failed")?;
    Ok(out)
}
