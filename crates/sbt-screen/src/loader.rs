//! Fundamentals CSV ingestion.
//!
//! Header (case-insensitive):
//! `ticker|companyticker, year, roce, roe, pat, pe, market_cap|marketcap`.
//! Metric columns are optional; blank or `nan` cells load as missing.

use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::types::FundamentalRecord;

#[derive(Debug)]
pub enum FundamentalsCsvError {
    Io(String),
    MissingHeader(&'static str),
    ParseField {
        row: usize,
        field: &'static str,
        raw: String,
    },
}

impl fmt::Display for FundamentalsCsvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundamentalsCsvError::Io(msg) => write!(f, "fundamentals csv io: {msg}"),
            FundamentalsCsvError::MissingHeader(h) => {
                write!(f, "fundamentals csv missing header '{h}'")
            }
            FundamentalsCsvError::ParseField { row, field, raw } => {
                write!(f, "fundamentals csv row {row}: bad {field} '{raw}'")
            }
        }
    }
}

impl std::error::Error for FundamentalsCsvError {}

pub fn load_fundamentals_csv(path: &Path) -> Result<Vec<FundamentalRecord>, FundamentalsCsvError> {
    let file = std::fs::File::open(path)
        .map_err(|e| FundamentalsCsvError::Io(format!("{}: {e}", path.display())))?;
    read_fundamentals(file)
}

pub fn parse_fundamentals_csv_str(s: &str) -> Result<Vec<FundamentalRecord>, FundamentalsCsvError> {
    read_fundamentals(s.as_bytes())
}

struct Columns {
    ticker: usize,
    year: usize,
    roce: Option<usize>,
    roe: Option<usize>,
    pat: Option<usize>,
    pe: Option<usize>,
    market_cap: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, FundamentalsCsvError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        Ok(Self {
            ticker: find(&["ticker", "companyticker"])
                .ok_or(FundamentalsCsvError::MissingHeader("ticker"))?,
            year: find(&["year"]).ok_or(FundamentalsCsvError::MissingHeader("year"))?,
            roce: find(&["roce"]),
            roe: find(&["roe"]),
            pat: find(&["pat"]),
            pe: find(&["pe"]),
            market_cap: find(&["market_cap", "marketcap"]),
        })
    }
}

fn read_fundamentals<R: Read>(rdr: R) -> Result<Vec<FundamentalRecord>, FundamentalsCsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let headers = reader
        .headers()
        .map_err(|e| FundamentalsCsvError::Io(e.to_string()))?
        .clone();
    let cols = Columns::from_headers(&headers)?;

    let mut out = Vec::new();
    for (i, rec) in reader.records().enumerate() {
        let row = i + 2;
        let rec = rec.map_err(|e| FundamentalsCsvError::Io(e.to_string()))?;
        let cell = |idx: usize| rec.get(idx).unwrap_or("");

        let company = cell(cols.ticker).to_string();
        if company.is_empty() {
            return Err(FundamentalsCsvError::ParseField {
                row,
                field: "ticker",
                raw: String::new(),
            });
        }
        let year_raw = cell(cols.year);
        let year: i32 = year_raw
            .parse()
            .map_err(|_| FundamentalsCsvError::ParseField {
                row,
                field: "year",
                raw: year_raw.to_string(),
            })?;

        let metric = |idx: Option<usize>, field: &'static str| -> Result<Option<f64>, FundamentalsCsvError> {
            let Some(idx) = idx else { return Ok(None) };
            let raw = cell(idx);
            if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                return Ok(None);
            }
            raw.parse::<f64>()
                .map(Some)
                .map_err(|_| FundamentalsCsvError::ParseField {
                    row,
                    field,
                    raw: raw.to_string(),
                })
        };

        out.push(FundamentalRecord {
            company,
            year,
            roce: metric(cols.roce, "roce")?,
            roe: metric(cols.roe, "roe")?,
            pat: metric(cols.pat, "pat")?,
            pe: metric(cols.pe, "pe")?,
            market_cap: metric(cols.market_cap, "market_cap")?,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_and_blanks() {
        let csv = "CompanyTicker,Year,ROCE,ROE,PAT,PE,MarketCap\n\
                   AAA,2020,18.5,20,1000,12.5,50000\n\
                   BBB,2021,,nan,200,,\n";
        let rows = parse_fundamentals_csv_str(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].company, "AAA");
        assert_eq!(rows[0].market_cap, Some(50000.0));
        assert_eq!(rows[1].roce, None);
        assert_eq!(rows[1].roe, None);
        assert_eq!(rows[1].pat, Some(200.0));
        assert_eq!(rows[1].market_cap, None);
    }

    #[test]
    fn bad_year_is_reported_with_row() {
        let csv = "ticker,year,roe\nAAA,twenty,1\n";
        match parse_fundamentals_csv_str(csv).unwrap_err() {
            FundamentalsCsvError::ParseField { row, field, .. } => {
                assert_eq!(row, 2);
                assert_eq!(field, "year");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn missing_ticker_header() {
        let csv = "name,year\nAAA,2020\n";
        assert!(matches!(
            parse_fundamentals_csv_str(csv),
            Err(FundamentalsCsvError::MissingHeader("ticker"))
        ));
    }
}
