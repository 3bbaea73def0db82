//! CSV loading for close-price series.
//!
//! ## CSV column contract (case-insensitive, order-independent)
//!
//! | Column   | Example      | Notes                                         |
//! |----------|--------------|-----------------------------------------------|
//! | `ticker` | `INFY.NS`    | `symbol` accepted as an alias                 |
//! | `date`   | `2021-03-31` | ISO date                                      |
//! | `close`  | `1385.20`    | blank / `NaN` => missing observation          |
//!
//! A missing close is kept as NaN so the ticker fails the completeness check
//! for any period containing that date.

use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::provider::{InMemoryPriceSource, PriceDataSource, PriceError, RetryPolicy};
use crate::{PriceFrame, PricePoint, PriceRequest};

#[derive(Debug)]
pub enum CsvPriceError {
    Io(String),
    MissingHeader(&'static str),
    ParseField {
        row: usize,
        field: &'static str,
        raw: String,
    },
}

impl fmt::Display for CsvPriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvPriceError::Io(msg) => write!(f, "csv io error: {msg}"),
            CsvPriceError::MissingHeader(col) => {
                write!(f, "csv missing required header column: '{col}'")
            }
            CsvPriceError::ParseField { row, field, raw } => {
                write!(f, "csv row {row}: cannot parse field '{field}' from value '{raw}'")
            }
        }
    }
}

impl std::error::Error for CsvPriceError {}

/// Load a long-format price CSV from disk.
pub fn load_price_csv(path: &Path) -> Result<PriceFrame, CsvPriceError> {
    let file = std::fs::File::open(path)
        .map_err(|e| CsvPriceError::Io(format!("read '{}': {e}", path.display())))?;
    read_prices(file)
}

/// Parse a long-format price CSV held in memory.
///
/// A malformed date or price is a hard error: silently
/// dropping a row would change which tickers count as complete.
pub fn parse_price_csv_str(src: &str) -> Result<PriceFrame, CsvPriceError> {
    read_prices(src.as_bytes())
}

fn read_prices<R: Read>(rdr: R) -> Result<PriceFrame, CsvPriceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(rdr);

    let headers = reader
        .headers()
        .map_err(|e| CsvPriceError::Io(e.to_string()))?
        .clone();
    if headers.is_empty() {
        return Ok(PriceFrame::new());
    }

    let find = |names: &[&str]| {
        headers.iter().position(|h| {
            let h = h.trim_start_matches('\u{feff}');
            names.iter().any(|n| h.eq_ignore_ascii_case(n))
        })
    };
    let ticker_col = find(&["ticker", "symbol"]).ok_or(CsvPriceError::MissingHeader("ticker"))?;
    let date_col = find(&["date"]).ok_or(CsvPriceError::MissingHeader("date"))?;
    let close_col = find(&["close"]).ok_or(CsvPriceError::MissingHeader("close"))?;

    let mut frame = PriceFrame::new();

    for (i, rec) in reader.records().enumerate() {
        let rec = rec.map_err(|e| CsvPriceError::Io(e.to_string()))?;
        let row = rec.position().map_or(i + 2, |p| p.line() as usize);
        if rec.iter().all(str::is_empty) {
            continue;
        }

        let ticker = rec.get(ticker_col).unwrap_or("");
        if ticker.is_empty() {
            return Err(CsvPriceError::ParseField {
                row,
                field: "ticker",
                raw: String::new(),
            });
        }

        let date_raw = rec.get(date_col).ok_or(CsvPriceError::ParseField {
            row,
            field: "date",
            raw: String::new(),
        })?;
        let date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d").map_err(|_| {
            CsvPriceError::ParseField {
                row,
                field: "date",
                raw: date_raw.to_string(),
            }
        })?;

        let close_raw = rec.get(close_col).unwrap_or("");
        let close = parse_close(close_raw).ok_or_else(|| CsvPriceError::ParseField {
            row,
            field: "close",
            raw: close_raw.to_string(),
        })?;

        frame.push(ticker, PricePoint::new(date, close));
    }

    Ok(frame)
}

/// Price source backed by a long-format CSV loaded once at construction.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    inner: InMemoryPriceSource,
}

impl CsvPriceSource {
    pub fn from_path(path: &Path) -> Result<Self, CsvPriceError> {
        Ok(Self::from_frame(load_price_csv(path)?))
    }

    pub fn from_frame(frame: PriceFrame) -> Self {
        Self {
            inner: InMemoryPriceSource::new(frame),
        }
    }

    pub fn frame(&self) -> &PriceFrame {
        self.inner.frame()
    }
}

#[async_trait::async_trait]
impl PriceDataSource for CsvPriceSource {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn fetch(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError> {
        self.inner.fetch(req).await
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::no_retry()
    }
}

/// Blank or `nan` => NaN (missing); otherwise a decimal number.
fn parse_close(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    t.parse::<f64>().ok()
}
