use std::fmt;

use async_trait::async_trait;

use crate::table::group_latest_by_cutoff;
use crate::types::FundamentalRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Two records for the same `(company, year)`.
    DuplicateRecord { company: String, year: i32 },
    /// Backend failure (database, IO).
    Backend(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::DuplicateRecord { company, year } => {
                write!(f, "duplicate fundamentals record for {company} year {year}")
            }
            RepositoryError::Backend(msg) => write!(f, "fundamentals backend error: {msg}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Point-in-time access to fundamentals.
///
/// Implementations must never return a record whose year is after the
/// requested cutoff.
#[async_trait]
pub trait FundamentalsRepository: Send + Sync {
    /// The latest record for `company` with `year <= cutoff_year`.
    async fn latest(
        &self,
        company: &str,
        cutoff_year: i32,
    ) -> Result<Option<FundamentalRecord>, RepositoryError>;

    /// The latest record per company with `year <= cutoff_year`.
    ///
    /// Companies are returned in the order they were first loaded. Ranking
    /// ties keep this order, so every backend must preserve it.
    async fn latest_for_all(
        &self,
        cutoff_year: i32,
    ) -> Result<Vec<FundamentalRecord>, RepositoryError>;
}

#[async_trait]
impl<R: FundamentalsRepository + ?Sized> FundamentalsRepository for Box<R> {
    async fn latest(
        &self,
        company: &str,
        cutoff_year: i32,
    ) -> Result<Option<FundamentalRecord>, RepositoryError> {
        (**self).latest(company, cutoff_year).await
    }

    async fn latest_for_all(
        &self,
        cutoff_year: i32,
    ) -> Result<Vec<FundamentalRecord>, RepositoryError> {
        (**self).latest_for_all(cutoff_year).await
    }
}

/// Vec-backed repository used by the CSV path and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFundamentals {
    rows: Vec<FundamentalRecord>,
}

impl InMemoryFundamentals {
    pub fn new(rows: Vec<FundamentalRecord>) -> Result<Self, RepositoryError> {
        let mut seen = std::collections::BTreeSet::new();
        for r in &rows {
            if !seen.insert((r.company.as_str(), r.year)) {
                return Err(RepositoryError::DuplicateRecord {
                    company: r.company.clone(),
                    year: r.year,
                });
            }
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FundamentalRecord] {
        &self.rows
    }
}

#[async_trait]
impl FundamentalsRepository for InMemoryFundamentals {
    async fn latest(
        &self,
        company: &str,
        cutoff_year: i32,
    ) -> Result<Option<FundamentalRecord>, RepositoryError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.company == company && r.year <= cutoff_year)
            .max_by_key(|r| r.year)
            .cloned())
    }

    async fn latest_for_all(
        &self,
        cutoff_year: i32,
    ) -> Result<Vec<FundamentalRecord>, RepositoryError> {
        Ok(group_latest_by_cutoff(&self.rows, cutoff_year))
    }
}
