use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sbt_md::RetryPolicy;
use sbt_portfolio::SizingPolicy;
use sbt_screen::{RankingParseError, RankingSpec, ScreenThresholds, Selection};

use crate::metrics::{Annualization, Metrics};
use crate::schedule::{RebalanceFrequency, RebalancePeriod};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Rejected before any period runs.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Shape/type mismatch in the config document.
    Malformed(String),
    InvalidDate { field: &'static str, raw: String },
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    NonPositiveCapital(f64),
    ZeroPortfolioSize,
    Ranking(RankingParseError),
    MarketCapRange { min: f64, max: f64 },
    InvalidRetry(String),
    UnknownAnnualization(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Malformed(msg) => write!(f, "malformed backtest config: {msg}"),
            ConfigError::InvalidDate { field, raw } => {
                write!(f, "{field}: '{raw}' is not a YYYY-MM-DD date")
            }
            ConfigError::EndBeforeStart { start, end } => {
                write!(f, "end_date {end} is before start_date {start}")
            }
            ConfigError::NonPositiveCapital(c) => {
                write!(f, "initial_capital must be finite and > 0, got {c}")
            }
            ConfigError::ZeroPortfolioSize => write!(f, "portfolio_size must be >= 1"),
            ConfigError::Ranking(e) => write!(f, "ranking: {e}"),
            ConfigError::MarketCapRange { min, max } => {
                write!(f, "market_cap_min {min} exceeds market_cap_max {max}")
            }
            ConfigError::InvalidRetry(msg) => write!(f, "data.retry: {msg}"),
            ConfigError::UnknownAnnualization(raw) => {
                write!(f, "metrics.annualization: unknown value '{raw}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<RankingParseError> for ConfigError {
    fn from(e: RankingParseError) -> Self {
        ConfigError::Ranking(e)
    }
}

/// Immutable run configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: RebalanceFrequency,
    pub sizing: SizingPolicy,
    pub portfolio_size: usize,
    pub thresholds: ScreenThresholds,
    pub ranking: RankingSpec,
    pub retry: RetryPolicy,
    pub annualization: Annualization,
}

#[derive(Deserialize)]
struct RawConfig {
    backtest: RawBacktest,
    #[serde(default)]
    screen: RawScreen,
    ranking: RawRanking,
    sizing: RawSizing,
    #[serde(default)]
    data: RawData,
    #[serde(default)]
    metrics: RawMetrics,
}

#[derive(Deserialize)]
struct RawBacktest {
    initial_capital: f64,
    start_date: String,
    end_date: String,
    #[serde(default)]
    rebalance_frequency: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawScreen {
    roce_min: Option<f64>,
    pat_min: Option<f64>,
    market_cap_min: Option<f64>,
    market_cap_max: Option<f64>,
}

#[derive(Deserialize)]
struct RawRanking {
    spec: String,
    #[serde(default)]
    composite: Value,
}

#[derive(Deserialize)]
struct RawSizing {
    #[serde(default)]
    policy: Option<String>,
    portfolio_size: u64,
}

#[derive(Deserialize, Default)]
struct RawData {
    #[serde(default)]
    retry: RawRetry,
}

#[derive(Deserialize)]
struct RawRetry {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    base_delay_ms: u64,
    #[serde(default = "default_delay_ms")]
    max_jitter_ms: u64,
}

impl Default for RawRetry {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_delay_ms(),
            max_jitter_ms: default_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1_000
}

#[derive(Deserialize, Default)]
struct RawMetrics {
    annualization: Option<String>,
}

impl BacktestConfig {
    /// Build from the merged config document (see `sbt_config::load_layered_yaml`).
    pub fn from_config_json(config: &Value) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        let start_date = parse_date("backtest.start_date", &raw.backtest.start_date)?;
        let end_date = parse_date("backtest.end_date", &raw.backtest.end_date)?;

        let composite = parse_flag(&raw.ranking.composite)?;
        let ranking = RankingSpec::parse(&raw.ranking.spec, composite)?;

        let permissive = ScreenThresholds::permissive();
        let thresholds = ScreenThresholds {
            roce_min: raw.screen.roce_min.unwrap_or(permissive.roce_min),
            pat_min: raw.screen.pat_min.unwrap_or(permissive.pat_min),
            market_cap_min: raw.screen.market_cap_min.unwrap_or(permissive.market_cap_min),
            market_cap_max: raw.screen.market_cap_max.unwrap_or(permissive.market_cap_max),
        };

        if raw.data.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry("max_attempts must be >= 1".to_string()));
        }
        let retry = RetryPolicy::new(
            raw.data.retry.max_attempts,
            Duration::from_millis(raw.data.retry.base_delay_ms),
            Duration::from_millis(raw.data.retry.max_jitter_ms),
        );

        let annualization = match raw.metrics.annualization {
            None => Annualization::default(),
            Some(s) => Annualization::parse(&s).ok_or(ConfigError::UnknownAnnualization(s))?,
        };

        let cfg = Self {
            initial_capital: raw.backtest.initial_capital,
            start_date,
            end_date,
            frequency: raw
                .backtest
                .rebalance_frequency
                .as_deref()
                .map(RebalanceFrequency::parse)
                .unwrap_or(RebalanceFrequency::Monthly),
            sizing: raw
                .sizing
                .policy
                .as_deref()
                .map(SizingPolicy::parse)
                .unwrap_or_default(),
            portfolio_size: usize::try_from(raw.sizing.portfolio_size)
                .map_err(|e| ConfigError::Malformed(format!("sizing.portfolio_size: {e}")))?,
            thresholds,
            ranking,
            retry,
            annualization,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if self.end_date < self.start_date {
            return Err(ConfigError::EndBeforeStart {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.portfolio_size == 0 {
            return Err(ConfigError::ZeroPortfolioSize);
        }
        if self.ranking.keys.is_empty() {
            return Err(ConfigError::Ranking(RankingParseError::Empty(String::new())));
        }
        let t = &self.thresholds;
        if t.market_cap_min > t.market_cap_max {
            return Err(ConfigError::MarketCapRange {
                min: t.market_cap_min,
                max: t.market_cap_max,
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry("max_attempts must be >= 1".to_string()));
        }
        Ok(())
    }
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        field,
        raw: raw.to_string(),
    })
}

/// `true`/`false`, or the strings yes/no/true/false. Absent means off.
fn parse_flag(v: &Value) -> Result<bool, ConfigError> {
    match v {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "y" | "on" => Ok(true),
            "no" | "false" | "n" | "off" | "" => Ok(false),
            other => Err(ConfigError::Malformed(format!(
                "ranking.composite: expected yes/no, got '{other}'"
            ))),
        },
        other => Err(ConfigError::Malformed(format!(
            "ranking.composite: expected bool or yes/no, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// Portfolio value at the last priced date of a period.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub value: f64,
}

/// One held position for one period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub ticker: String,
    pub weight: f64,
    pub shares: f64,
    pub start_price: f64,
    pub end_price: f64,
    pub end_value: f64,
}

/// One selected candidate for one period, best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopRankedRecord {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub cutoff_year: i32,
    /// 1-based position in the selection.
    pub position: usize,
    pub ticker: String,
    /// Fiscal year of the record the candidate was screened on.
    pub year: i32,
    pub composite_rank: Option<f64>,
    pub roce: Option<f64>,
    pub roe: Option<f64>,
    pub pat: Option<f64>,
    pub pe: Option<f64>,
    pub market_cap: Option<f64>,
}

impl TopRankedRecord {
    pub fn from_selection(period: &RebalancePeriod, selection: &Selection) -> Vec<Self> {
        selection
            .candidates
            .iter()
            .enumerate()
            .map(|(i, c)| TopRankedRecord {
                period_start: period.start,
                period_end: period.end,
                cutoff_year: selection.cutoff_year,
                position: i + 1,
                ticker: c.record.company.clone(),
                year: c.record.year,
                composite_rank: c.composite_rank,
                roce: c.record.roce,
                roe: c.record.roe,
                pat: c.record.pat,
                pe: c.record.pe,
                market_cap: c.record.market_cap,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    ZeroLength,
    NoCandidates,
    Repository,
    PriceFetch,
    NoPriceData,
    Allocation,
}

impl SkipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipKind::ZeroLength => "zero_length",
            SkipKind::NoCandidates => "no_candidates",
            SkipKind::Repository => "repository",
            SkipKind::PriceFetch => "price_fetch",
            SkipKind::NoPriceData => "no_price_data",
            SkipKind::Allocation => "allocation",
        }
    }
}

/// A period that contributed nothing: capital carried forward, no snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkippedPeriod {
    pub period: RebalancePeriod,
    pub kind: SkipKind,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub date: NaiveDate,
    pub drawdown: f64,
}

/// Caller-facing result of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub equity_curve: Vec<EquityPoint>,
    pub drawdown_curve: Vec<DrawdownPoint>,
    pub metrics: Metrics,
}

/// Everything one run produced. Immutable once returned by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct BacktestRun {
    pub run_id: Uuid,
    pub config: BacktestConfig,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub compositions: Vec<CompositionRecord>,
    pub top_ranked: Vec<TopRankedRecord>,
    pub skipped: Vec<SkippedPeriod>,
    pub metrics: Metrics,
    pub scheduled_periods: usize,
}

impl BacktestRun {
    pub fn result(&self) -> RunResult {
        RunResult {
            run_id: self.run_id,
            equity_curve: self
                .snapshots
                .iter()
                .map(|s| EquityPoint {
                    date: s.date,
                    value: s.value,
                })
                .collect(),
            drawdown_curve: crate::metrics::drawdown_curve(&self.snapshots),
            metrics: self.metrics,
        }
    }

    pub fn final_value(&self) -> f64 {
        self.snapshots
            .last()
            .map(|s| s.value)
            .unwrap_or(self.config.initial_capital)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "backtest": {
                "initial_capital": 100000,
                "start_date": "2019-01-01",
                "end_date": "2021-01-01",
                "rebalance_frequency": "quarterly"
            },
            "screen": {"roce_min": 15, "pat_min": 0, "market_cap_min": 1000, "market_cap_max": 1000000},
            "ranking": {"spec": "roe:desc,pe:asc", "composite": "yes"},
            "sizing": {"policy": "market_cap", "portfolio_size": 5}
        })
    }

    #[test]
    fn parses_full_document_with_defaults() {
        let cfg = BacktestConfig::from_config_json(&base()).unwrap();
        assert_eq!(cfg.frequency, RebalanceFrequency::Quarterly);
        assert_eq!(cfg.sizing, SizingPolicy::MarketCap);
        assert_eq!(cfg.portfolio_size, 5);
        assert!(cfg.ranking.composite);
        assert_eq!(cfg.ranking.keys.len(), 2);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.annualization, Annualization::PeriodCount);
    }

    #[test]
    fn lenient_enums_fall_back() {
        let mut v = base();
        v["backtest"]["rebalance_frequency"] = json!("weekly");
        v["sizing"]["policy"] = json!("risk_parity");
        let cfg = BacktestConfig::from_config_json(&v).unwrap();
        assert_eq!(cfg.frequency, RebalanceFrequency::Monthly);
        assert_eq!(cfg.sizing, SizingPolicy::Equal);
    }

    #[test]
    fn config_errors_surface_before_run() {
        let mut v = base();
        v["backtest"]["start_date"] = json!("01/01/2019");
        assert!(matches!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::InvalidDate { field: "backtest.start_date", .. })
        ));

        let mut v = base();
        v["backtest"]["initial_capital"] = json!(0);
        assert_eq!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::NonPositiveCapital(0.0))
        );

        let mut v = base();
        v["ranking"]["spec"] = json!("ebitda:desc");
        assert!(matches!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::Ranking(RankingParseError::UnknownMetric(_)))
        ));

        let mut v = base();
        v["backtest"]["end_date"] = json!("2018-01-01");
        assert!(matches!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::EndBeforeStart { .. })
        ));

        let mut v = base();
        v["sizing"]["portfolio_size"] = json!(0);
        assert_eq!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::ZeroPortfolioSize)
        );

        let mut v = base();
        v["data"] = json!({"retry": {"max_attempts": 0}});
        assert!(matches!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::InvalidRetry(_))
        ));

        let mut v = base();
        v["metrics"] = json!({"annualization": "calendar"});
        assert_eq!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::UnknownAnnualization("calendar".to_string()))
        );
    }

    #[test]
    fn composite_flag_accepts_bool_and_words() {
        for (raw, want) in [(json!(true), true), (json!("no"), false), (json!(null), false)] {
            let mut v = base();
            v["ranking"]["composite"] = raw;
            assert_eq!(BacktestConfig::from_config_json(&v).unwrap().ranking.composite, want);
        }
        let mut v = base();
        v["ranking"]["composite"] = json!(3);
        assert!(matches!(
            BacktestConfig::from_config_json(&v),
            Err(ConfigError::Malformed(_))
        ));
    }
}
