//! TwelveData-backed price source (daily closes).
//!
//! API key is read by the caller and passed in; do not log it.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::warn;

use crate::provider::{PriceDataSource, PriceError, RetryPolicy};
use crate::{PriceFrame, PricePoint, PriceRequest};

#[derive(Debug, Clone)]
pub struct TwelveDataPriceSource {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl TwelveDataPriceSource {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, "https://api.twelvedata.com".to_string())
    }

    pub fn new_with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            base_url,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_time_series_url(&self) -> String {
        format!("{}/time_series", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_one(
        &self,
        ticker: &str,
        req: &PriceRequest,
    ) -> Result<Option<Vec<PricePoint>>, PriceError> {
        // end_date is inclusive upstream; the request is half-open.
        let last_day = req.end - ChronoDuration::days(1);
        let start_s = req.start.format("%Y-%m-%d").to_string();
        let end_s = last_day.format("%Y-%m-%d").to_string();

        let resp = self
            .http
            .get(self.build_time_series_url())
            .query(&[
                ("symbol", ticker),
                ("interval", "1day"),
                ("start_date", start_s.as_str()),
                ("end_date", end_s.as_str()),
                ("timezone", "UTC"),
                ("format", "JSON"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PriceError::Transport(format!("twelvedata request failed: {e}")))?;

        let status = resp.status();
        let body: TimeSeriesResponse = resp
            .json()
            .await
            .map_err(|e| PriceError::Decode(format!("twelvedata response json: {e}")))?;

        if !status.is_success() {
            return Err(PriceError::Api {
                code: Some(status.as_u16() as i64),
                message: body.status_message(),
            });
        }

        // Unknown ticker or no data in range leaves that ticker out; the
        // caller's completeness check then drops it for the period. Any other
        // body-level error, such as a rate limit, fails the fetch.
        if body.status.as_deref() == Some("error") {
            if body.is_symbol_error() {
                warn!(ticker, message = %body.status_message(), "twelvedata returned no series");
                return Ok(None);
            }
            return Err(PriceError::Api {
                code: body.code,
                message: body.status_message(),
            });
        }

        let mut points = Vec::new();
        for v in body.values.unwrap_or_default() {
            let date = parse_datetime(&v.datetime).ok_or_else(|| {
                PriceError::Decode(format!("twelvedata datetime parse failed: {}", v.datetime))
            })?;
            if !req.contains(date) {
                continue;
            }
            let close = v.close.trim().parse::<f64>().map_err(|_| {
                PriceError::Decode(format!("twelvedata close parse failed: {}", v.close))
            })?;
            points.push(PricePoint::new(date, close));
        }
        Ok(Some(points))
    }
}

#[async_trait::async_trait]
impl PriceDataSource for TwelveDataPriceSource {
    fn name(&self) -> &'static str {
        "twelvedata"
    }

    async fn fetch(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError> {
        let mut frame = PriceFrame::new();
        if req.end <= req.start {
            return Ok(frame);
        }

        // Per-ticker requests keep response shapes uniform.
        for ticker in &req.tickers {
            if let Some(points) = self.fetch_one(ticker, req).await? {
                frame.insert(ticker.clone(), points);
            }
        }
        Ok(frame)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

#[derive(Debug, Clone, Deserialize)]
struct TimeSeriesResponse {
    status: Option<String>,
    message: Option<String>,
    code: Option<i64>,
    values: Option<Vec<TimeSeriesValue>>,
}

impl TimeSeriesResponse {
    fn is_symbol_error(&self) -> bool {
        matches!(self.code, Some(400) | Some(404))
    }

    fn status_message(&self) -> String {
        match (&self.code, &self.message) {
            (Some(c), Some(m)) => format!("code={} {}", c, m),
            (_, Some(m)) => m.clone(),
            _ => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TimeSeriesValue {
    datetime: String,
    close: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_formats_accepted() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 31).unwrap();
        assert_eq!(parse_datetime("2021-03-31"), Some(d));
        assert_eq!(parse_datetime("2021-03-31 15:30:00"), Some(d));
        assert_eq!(parse_datetime("31/03/2021"), None);
    }

    fn error_body(code: Option<i64>) -> TimeSeriesResponse {
        TimeSeriesResponse {
            status: Some("error".to_string()),
            message: Some("x".to_string()),
            code,
            values: None,
        }
    }

    #[test]
    fn only_symbol_errors_omit_the_ticker() {
        assert!(error_body(Some(400)).is_symbol_error());
        assert!(error_body(Some(404)).is_symbol_error());
        for code in [Some(401), Some(429), Some(500), Some(503), None] {
            assert!(!error_body(code).is_symbol_error(), "{code:?}");
        }
    }

    #[test]
    fn url_trims_trailing_slash() {
        let s = TwelveDataPriceSource::new_with_base_url("k".into(), "http://x/".into());
        assert_eq!(s.build_time_series_url(), "http://x/time_series");
    }
}
