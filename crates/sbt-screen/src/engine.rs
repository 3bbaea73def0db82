use std::fmt;

use tracing::debug;

use crate::ranking::{rank, select_top, RankingSpec};
use crate::repository::{FundamentalsRepository, RepositoryError};
use crate::table::select;
use crate::types::{FundamentalRecord, ScreenThresholds, Selection};

#[derive(Debug, Clone, PartialEq)]
pub enum ScreenError {
    /// Nothing passed the thresholds for this cutoff year.
    NoCandidates { cutoff_year: i32 },
    Repository(RepositoryError),
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenError::NoCandidates { cutoff_year } => {
                write!(f, "no companies pass screening for cutoff year {cutoff_year}")
            }
            ScreenError::Repository(e) => write!(f, "screening repository failure: {e}"),
        }
    }
}

impl std::error::Error for ScreenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScreenError::Repository(e) => Some(e),
            ScreenError::NoCandidates { .. } => None,
        }
    }
}

impl From<RepositoryError> for ScreenError {
    fn from(e: RepositoryError) -> Self {
        ScreenError::Repository(e)
    }
}

/// Threshold filter over fundamentals, order preserved.
pub fn screen(records: &[FundamentalRecord], thresholds: &ScreenThresholds) -> Vec<FundamentalRecord> {
    select(records, |r| thresholds.passes(r))
}

/// Point-in-time screen + rank + top-N.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningEngine {
    pub thresholds: ScreenThresholds,
    pub ranking: RankingSpec,
    pub portfolio_size: usize,
}

impl ScreeningEngine {
    pub fn new(thresholds: ScreenThresholds, ranking: RankingSpec, portfolio_size: usize) -> Self {
        Self {
            thresholds,
            ranking,
            portfolio_size,
        }
    }

    /// Pure part of the pipeline over already point-in-time records.
    pub fn select_from(
        &self,
        latest: &[FundamentalRecord],
        cutoff_year: i32,
    ) -> Result<Selection, ScreenError> {
        let passed = screen(latest, &self.thresholds);
        if passed.is_empty() {
            return Err(ScreenError::NoCandidates { cutoff_year });
        }
        let ranked = rank(&passed, &self.ranking);
        let candidates = select_top(ranked, self.portfolio_size);
        debug!(
            cutoff_year,
            universe = latest.len(),
            passed = passed.len(),
            selected = candidates.len(),
            "screened"
        );
        Ok(Selection {
            cutoff_year,
            candidates,
        })
    }

    /// Latest record per company with `year <= cutoff_year`, screened,
    /// ranked and truncated to `portfolio_size`.
    pub async fn select_for_year<R>(
        &self,
        repo: &R,
        cutoff_year: i32,
    ) -> Result<Selection, ScreenError>
    where
        R: FundamentalsRepository + ?Sized,
    {
        let latest = repo.latest_for_all(cutoff_year).await?;
        self.select_from(&latest, cutoff_year)
    }
}
