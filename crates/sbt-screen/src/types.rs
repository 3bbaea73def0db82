use serde::{Deserialize, Serialize};

/// One company's fundamentals for one fiscal year.
///
/// At most one record exists per `(company, year)`. Any metric may be absent
/// in the source data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRecord {
    /// Company ticker.
    pub company: String,
    pub year: i32,
    pub roce: Option<f64>,
    pub roe: Option<f64>,
    pub pat: Option<f64>,
    pub pe: Option<f64>,
    pub market_cap: Option<f64>,
}

impl FundamentalRecord {
    /// Record with every metric absent; fill in with the `with_*` helpers.
    pub fn new(company: impl Into<String>, year: i32) -> Self {
        Self {
            company: company.into(),
            year,
            roce: None,
            roe: None,
            pat: None,
            pe: None,
            market_cap: None,
        }
    }

    pub fn with_roce(mut self, v: f64) -> Self {
        self.roce = Some(v);
        self
    }

    pub fn with_roe(mut self, v: f64) -> Self {
        self.roe = Some(v);
        self
    }

    pub fn with_pat(mut self, v: f64) -> Self {
        self.pat = Some(v);
        self
    }

    pub fn with_pe(mut self, v: f64) -> Self {
        self.pe = Some(v);
        self
    }

    pub fn with_market_cap(mut self, v: f64) -> Self {
        self.market_cap = Some(v);
        self
    }

    pub fn metric(&self, m: Metric) -> Option<f64> {
        match m {
            Metric::Roce => self.roce,
            Metric::Roe => self.roe,
            Metric::Pat => self.pat,
            Metric::Pe => self.pe,
            Metric::MarketCap => self.market_cap,
        }
    }
}

/// Fundamental metric usable for ranking and sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Roce,
    Roe,
    Pat,
    Pe,
    MarketCap,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Roce => "roce",
            Metric::Roe => "roe",
            Metric::Pat => "pat",
            Metric::Pe => "pe",
            Metric::MarketCap => "market_cap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "roce" => Some(Metric::Roce),
            "roe" => Some(Metric::Roe),
            "pat" => Some(Metric::Pat),
            "pe" => Some(Metric::Pe),
            "market_cap" | "marketcap" => Some(Metric::MarketCap),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// Screening thresholds. All bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenThresholds {
    pub roce_min: f64,
    pub pat_min: f64,
    pub market_cap_min: f64,
    pub market_cap_max: f64,
}

impl ScreenThresholds {
    /// Everything passes (provided the metrics are present).
    pub fn permissive() -> Self {
        Self {
            roce_min: f64::NEG_INFINITY,
            pat_min: f64::NEG_INFINITY,
            market_cap_min: f64::NEG_INFINITY,
            market_cap_max: f64::INFINITY,
        }
    }

    /// Missing metrics never pass a threshold.
    pub fn passes(&self, r: &FundamentalRecord) -> bool {
        let roce_ok = r.roce.map_or(false, |v| v >= self.roce_min);
        let pat_ok = r.pat.map_or(false, |v| v >= self.pat_min);
        let cap_ok = r
            .market_cap
            .map_or(false, |v| v >= self.market_cap_min && v <= self.market_cap_max);
        roce_ok && pat_ok && cap_ok
    }
}

/// A screened company with its per-key ranks and composite rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub record: FundamentalRecord,
    /// One entry per ranking key, in key order. `None` when the metric is missing.
    pub ranks: Vec<Option<f64>>,
    pub composite_rank: Option<f64>,
}

impl Candidate {
    pub fn ticker(&self) -> &str {
        &self.record.company
    }
}

/// Top-N candidates chosen for one rebalance period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub cutoff_year: i32,
    /// Best first.
    pub candidates: Vec<Candidate>,
}

impl Selection {
    pub fn tickers(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.record.company.clone()).collect()
    }

    pub fn find(&self, ticker: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.record.company == ticker)
    }
}
