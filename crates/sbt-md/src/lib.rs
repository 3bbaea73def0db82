//! sbt-md
//!
//! Price-data boundary for the backtest engine.
//!
//! This crate owns the [`PriceDataSource`] contract, the [`PriceFrame`] a
//! source returns, the retry-with-backoff capability every source carries,
//! and concrete sources (in-memory, CSV-backed, TwelveData over HTTP).
//! It knows nothing about screening, weights or capital.

pub mod ingest_csv;
pub mod provider;
pub mod twelvedata;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use ingest_csv::{load_price_csv, parse_price_csv_str, CsvPriceError, CsvPriceSource};
pub use provider::{
    InMemoryPriceSource, PriceDataSource, PriceError, RetryPolicy, WithRetryPolicy,
};
pub use twelvedata::TwelveDataPriceSource;

/// A single period-end close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    /// Close price. NaN marks a missing observation.
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Price request over the half-open interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PriceRequest {
    pub fn new(tickers: Vec<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self { tickers, start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// Ticker -> date-ordered close series.
///
/// Series are kept sorted by date with at most one point per date
/// (a later insert for the same date wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceFrame {
    series: BTreeMap<String, Vec<PricePoint>>,
}

impl PriceFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the series for `ticker`.
    pub fn insert(&mut self, ticker: impl Into<String>, points: Vec<PricePoint>) {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for p in points {
            by_date.insert(p.date, p.close);
        }
        let sorted = by_date
            .into_iter()
            .map(|(date, close)| PricePoint { date, close })
            .collect();
        self.series.insert(ticker.into(), sorted);
    }

    /// Append a single observation, keeping order.
    pub fn push(&mut self, ticker: &str, point: PricePoint) {
        let series = self.series.entry(ticker.to_string()).or_default();
        match series.binary_search_by(|p| p.date.cmp(&point.date)) {
            Ok(i) => series[i] = point,
            Err(i) => series.insert(i, point),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(|s| s.is_empty())
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self, ticker: &str) -> Option<&[PricePoint]> {
        self.series.get(ticker).map(Vec::as_slice)
    }

    /// Union of every observation date in the frame.
    pub fn calendar(&self) -> BTreeSet<NaiveDate> {
        self.series
            .values()
            .flat_map(|s| s.iter().map(|p| p.date))
            .collect()
    }

    /// Last date of the frame calendar.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.calendar().into_iter().next_back()
    }

    /// Sub-frame holding only `tickers` (missing tickers are simply absent).
    pub fn restrict(&self, tickers: &[String]) -> PriceFrame {
        let series = tickers
            .iter()
            .filter_map(|t| self.series.get(t).map(|s| (t.clone(), s.clone())))
            .collect();
        PriceFrame { series }
    }

    /// Sub-frame over `[req.start, req.end)` for the requested tickers.
    pub fn slice(&self, req: &PriceRequest) -> PriceFrame {
        let mut out = PriceFrame::new();
        for t in &req.tickers {
            if let Some(s) = self.series.get(t) {
                let pts: Vec<PricePoint> =
                    s.iter().copied().filter(|p| req.contains(p.date)).collect();
                if !pts.is_empty() {
                    out.series.insert(t.clone(), pts);
                }
            }
        }
        out
    }

    /// Intersection policy: a ticker is complete iff it has a finite close at
    /// every date of the frame calendar. Partial coverage excludes the ticker
    /// entirely. Returned in ticker order.
    pub fn complete_tickers(&self) -> Vec<String> {
        let calendar = self.calendar();
        if calendar.is_empty() {
            return Vec::new();
        }
        self.series
            .iter()
            .filter(|(_, s)| {
                s.len() == calendar.len()
                    && s.iter().all(|p| p.close.is_finite())
                    && s.iter().map(|p| p.date).eq(calendar.iter().copied())
            })
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn first_close(&self, ticker: &str) -> Option<f64> {
        self.series.get(ticker)?.first().map(|p| p.close)
    }

    pub fn last_close(&self, ticker: &str) -> Option<f64> {
        self.series.get(ticker)?.last().map(|p| p.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn insert_sorts_and_dedups_by_date() {
        let mut f = PriceFrame::new();
        f.insert(
            "AAA",
            vec![
                PricePoint::new(d(2020, 1, 3), 3.0),
                PricePoint::new(d(2020, 1, 1), 1.0),
                PricePoint::new(d(2020, 1, 3), 4.0),
            ],
        );
        let s = f.series("AAA").unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].date, d(2020, 1, 1));
        assert_eq!(s[1].close, 4.0);
    }

    #[test]
    fn complete_tickers_drops_partial_and_nan_series() {
        let mut f = PriceFrame::new();
        f.insert(
            "FULL",
            vec![
                PricePoint::new(d(2020, 1, 1), 10.0),
                PricePoint::new(d(2020, 1, 2), 11.0),
            ],
        );
        f.insert("GAP", vec![PricePoint::new(d(2020, 1, 2), 5.0)]);
        f.insert(
            "NAN",
            vec![
                PricePoint::new(d(2020, 1, 1), f64::NAN),
                PricePoint::new(d(2020, 1, 2), 5.0),
            ],
        );
        f.insert("EMPTY", vec![]);

        assert_eq!(f.complete_tickers(), vec!["FULL".to_string()]);
    }

    #[test]
    fn slice_is_half_open() {
        let mut f = PriceFrame::new();
        f.insert(
            "AAA",
            vec![
                PricePoint::new(d(2020, 1, 1), 1.0),
                PricePoint::new(d(2020, 2, 1), 2.0),
            ],
        );
        let req = PriceRequest::new(vec!["AAA".into(), "ZZZ".into()], d(2020, 1, 1), d(2020, 2, 1));
        let s = f.slice(&req);
        assert_eq!(s.series("AAA").unwrap().len(), 1);
        assert!(s.series("ZZZ").is_none());
        assert_eq!(s.last_date(), Some(d(2020, 1, 1)));
    }

    #[test]
    fn empty_frame_has_no_complete_tickers() {
        assert!(PriceFrame::new().complete_tickers().is_empty());
        assert!(PriceFrame::new().is_empty());
    }
}
