//! sbt-portfolio: allocator
//!
//! Turns a selected, price-complete ticker set into target weights.
//!
//! - `Equal`: `1/n` each.
//! - `MarketCap` / `Roce` / `Roe`: `value / sum(value)` over the set.
//!
//! Metric policies fail explicitly rather than falling back to equal weight.
//! Weights are dimensionless fractions of capital and sum to 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum AllocationError {
    /// No holdings to allocate over.
    Empty,
    /// Metric sums to zero across the set.
    ZeroDenominator { policy: SizingPolicy },
    /// A selected ticker lacks the sizing metric.
    MissingMetric { ticker: String, policy: SizingPolicy },
    /// Sizing metric is NaN or infinite.
    NonFiniteMetric { ticker: String, policy: SizingPolicy },
}

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "no holdings to allocate"),
            Self::ZeroDenominator { policy } => {
                write!(f, "{} weights undefined: metric sums to zero", policy.as_str())
            }
            Self::MissingMetric { ticker, policy } => {
                write!(f, "{} weights undefined: '{ticker}' has no value", policy.as_str())
            }
            Self::NonFiniteMetric { ticker, policy } => {
                write!(f, "{} weights undefined: '{ticker}' value is not finite", policy.as_str())
            }
        }
    }
}

impl std::error::Error for AllocationError {}

// ─── SizingPolicy ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingPolicy {
    Equal,
    MarketCap,
    Roce,
    Roe,
}

impl SizingPolicy {
    /// Lenient: anything unrecognised sizes equally.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "market_cap" | "marketcap" => SizingPolicy::MarketCap,
            "roce" => SizingPolicy::Roce,
            "roe" => SizingPolicy::Roe,
            _ => SizingPolicy::Equal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizingPolicy::Equal => "equal",
            SizingPolicy::MarketCap => "market_cap",
            SizingPolicy::Roce => "roce",
            SizingPolicy::Roe => "roe",
        }
    }
}

impl Default for SizingPolicy {
    fn default() -> Self {
        SizingPolicy::Equal
    }
}

// ─── Holding ─────────────────────────────────────────────────────────────────

/// One allocatable ticker with the metrics sizing may use.
#[derive(Clone, Debug, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub market_cap: Option<f64>,
    pub roce: Option<f64>,
    pub roe: Option<f64>,
}

impl Holding {
    pub fn new<S: Into<String>>(ticker: S) -> Self {
        Self {
            ticker: ticker.into(),
            market_cap: None,
            roce: None,
            roe: None,
        }
    }

    fn metric(&self, policy: SizingPolicy) -> Option<f64> {
        match policy {
            SizingPolicy::Equal => Some(1.0),
            SizingPolicy::MarketCap => self.market_cap,
            SizingPolicy::Roce => self.roce,
            SizingPolicy::Roe => self.roe,
        }
    }
}

// ─── PositionWeights ─────────────────────────────────────────────────────────

/// ticker → weight.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionWeights(pub BTreeMap<String, f64>);

impl PositionWeights {
    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.0.get(ticker).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// ─── WeightAllocator ─────────────────────────────────────────────────────────

pub struct WeightAllocator {
    policy: SizingPolicy,
}

impl WeightAllocator {
    pub fn new(policy: SizingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SizingPolicy {
        self.policy
    }

    pub fn allocate(&self, holdings: &[Holding]) -> Result<PositionWeights, AllocationError> {
        if holdings.is_empty() {
            return Err(AllocationError::Empty);
        }

        if self.policy == SizingPolicy::Equal {
            let w = 1.0 / holdings.len() as f64;
            return Ok(PositionWeights(
                holdings.iter().map(|h| (h.ticker.clone(), w)).collect(),
            ));
        }

        let mut values = Vec::with_capacity(holdings.len());
        for h in holdings {
            let v = h.metric(self.policy).ok_or_else(|| AllocationError::MissingMetric {
                ticker: h.ticker.clone(),
                policy: self.policy,
            })?;
            if !v.is_finite() {
                return Err(AllocationError::NonFiniteMetric {
                    ticker: h.ticker.clone(),
                    policy: self.policy,
                });
            }
            values.push(v);
        }

        let total: f64 = values.iter().sum();
        if total == 0.0 || !total.is_finite() {
            return Err(AllocationError::ZeroDenominator {
                policy: self.policy,
            });
        }

        Ok(PositionWeights(
            holdings
                .iter()
                .zip(values)
                .map(|(h, v)| (h.ticker.clone(), v / total))
                .collect(),
        ))
    }
}
