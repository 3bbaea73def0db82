//! Risk/return statistics over the snapshot series.
//!
//! Default annualization treats the snapshot count as the number of months
//! (`PeriodCount`). `ElapsedTime` uses calendar days between the first and
//! last snapshot instead and must be selected explicitly.

use serde::{Deserialize, Serialize};

use crate::types::{DrawdownPoint, PortfolioSnapshot};

const STD_EPSILON: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annualization {
    PeriodCount,
    ElapsedTime,
}

impl Annualization {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "period_count" | "periods" => Some(Annualization::PeriodCount),
            "elapsed_time" | "elapsed" => Some(Annualization::ElapsedTime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Annualization::PeriodCount => "period_count",
            Annualization::ElapsedTime => "elapsed_time",
        }
    }
}

impl Default for Annualization {
    fn default() -> Self {
        Annualization::PeriodCount
    }
}

/// CAGR and max drawdown in percent; Sharpe unscaled. All rounded to 2 dp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsCalculator {
    annualization: Annualization,
}

impl MetricsCalculator {
    pub fn new(annualization: Annualization) -> Self {
        Self { annualization }
    }

    pub fn compute(&self, snapshots: &[PortfolioSnapshot]) -> Metrics {
        if snapshots.len() < 2 {
            return Metrics::default();
        }
        let values: Vec<f64> = snapshots.iter().map(|s| s.value).collect();
        let returns = simple_returns(&values);

        let first = values[0];
        let last = values[values.len() - 1];

        let (cagr, sharpe) = match self.annualization {
            Annualization::PeriodCount => {
                let months = values.len() as f64;
                (
                    compound_growth(first, last, 12.0 / months),
                    sharpe(&returns, 12.0),
                )
            }
            Annualization::ElapsedTime => {
                let days = (snapshots[snapshots.len() - 1].date - snapshots[0].date).num_days();
                let years = days as f64 / 365.25;
                if years <= 0.0 {
                    (0.0, 0.0)
                } else {
                    (
                        compound_growth(first, last, 1.0 / years),
                        sharpe(&returns, returns.len() as f64 / years),
                    )
                }
            }
        };

        let max_drawdown = drawdowns(&values).into_iter().fold(0.0_f64, f64::min);

        Metrics {
            cagr: round_to(cagr * 100.0, 2),
            sharpe: round_to(sharpe, 2),
            max_drawdown: round_to(max_drawdown * 100.0, 2),
        }
    }
}

/// Per-snapshot drawdown rounded to 4 dp.
pub fn drawdown_curve(snapshots: &[PortfolioSnapshot]) -> Vec<DrawdownPoint> {
    let values: Vec<f64> = snapshots.iter().map(|s| s.value).collect();
    snapshots
        .iter()
        .zip(drawdowns(&values))
        .map(|(s, dd)| DrawdownPoint {
            date: s.date,
            drawdown: round_to(dd, 4),
        })
        .collect()
}

/// `value / running_max - 1`, never positive.
pub fn drawdowns(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 {
                (v / peak - 1.0).min(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn compound_growth(first: f64, last: f64, exponent: f64) -> f64 {
    if first <= 0.0 || last < 0.0 {
        return 0.0;
    }
    let g = (last / first).powf(exponent) - 1.0;
    if g.is_finite() {
        g
    } else {
        0.0
    }
}

/// mean / sample std × sqrt(periods_per_year). Zero when std is degenerate.
fn sharpe(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if !std.is_finite() || std <= STD_EPSILON {
        return 0.0;
    }
    let s = mean / std * periods_per_year.sqrt();
    if s.is_finite() {
        s
    } else {
        0.0
    }
}

pub(crate) fn round_to(x: f64, dp: i32) -> f64 {
    let f = 10f64.powi(dp);
    (x * f).round() / f
}
