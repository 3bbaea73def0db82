use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::table::rank_by;
use crate::types::{Candidate, Direction, FundamentalRecord, Metric};

/// One `metric:direction` ranking key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankKey {
    pub metric: Metric,
    pub direction: Direction,
}

/// Ordered ranking keys plus the composite flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankingSpec {
    pub keys: Vec<RankKey>,
    pub composite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankingParseError {
    UnknownMetric(String),
    /// No well-formed entries left after parsing.
    Empty(String),
}

impl fmt::Display for RankingParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingParseError::UnknownMetric(m) => write!(f, "unknown ranking metric '{m}'"),
            RankingParseError::Empty(raw) => write!(f, "ranking spec '{raw}' has no usable keys"),
        }
    }
}

impl std::error::Error for RankingParseError {}

impl RankingSpec {
    /// Parse `"roe:desc,pe:asc"`.
    ///
    /// Entries without a `:` or with a direction other than asc/desc are
    /// skipped. An unrecognised metric name is an error.
    pub fn parse(raw: &str, composite: bool) -> Result<Self, RankingParseError> {
        let mut keys = Vec::new();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((m, d)) = entry.split_once(':') else {
                warn!(entry, "ranking entry without direction ignored");
                continue;
            };
            let Some(direction) = Direction::parse(d) else {
                warn!(entry, "ranking entry with unknown direction ignored");
                continue;
            };
            let metric =
                Metric::parse(m).ok_or_else(|| RankingParseError::UnknownMetric(m.trim().to_string()))?;
            keys.push(RankKey { metric, direction });
        }
        if keys.is_empty() {
            return Err(RankingParseError::Empty(raw.to_string()));
        }
        Ok(Self { keys, composite })
    }

    /// Composite ranking only applies with more than one key.
    pub fn uses_composite(&self) -> bool {
        self.composite && self.keys.len() > 1
    }
}

impl fmt::Display for RankingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("{}:{}", k.metric.as_str(), k.direction.as_str()))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Attach per-key and composite ranks to each record. Input order is kept.
pub fn rank(records: &[FundamentalRecord], spec: &RankingSpec) -> Vec<Candidate> {
    let per_key: Vec<Vec<Option<f64>>> = spec
        .keys
        .iter()
        .map(|k| {
            let col: Vec<Option<f64>> = records.iter().map(|r| r.metric(k.metric)).collect();
            rank_by(&col, k.direction)
        })
        .collect();

    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let ranks: Vec<Option<f64>> = per_key.iter().map(|col| col[i]).collect();
            let composite_rank = if spec.uses_composite() {
                let all: Option<Vec<f64>> = ranks.iter().copied().collect();
                all.map(|v| v.iter().sum::<f64>() / v.len() as f64)
            } else {
                ranks.first().copied().flatten()
            };
            Candidate {
                record: r.clone(),
                ranks,
                composite_rank,
            }
        })
        .collect()
}

/// Best `n` candidates by ascending composite rank.
///
/// Stable: equal ranks keep input order. Missing ranks sort last.
pub fn select_top(mut candidates: Vec<Candidate>, n: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| match (a.composite_rank, b.composite_rank) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    candidates.truncate(n);
    candidates
}
