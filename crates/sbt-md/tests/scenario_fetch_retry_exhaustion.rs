//! Retry-with-backoff is a capability of the source.
//!
//! GREEN when:
//! - transient failures below the attempt budget are absorbed;
//! - exhausting the budget yields `PriceError::Exhausted` carrying the last error;
//! - a wrapper policy overrides the source's own policy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use sbt_md::{
    PriceDataSource, PriceError, PriceFrame, PricePoint, PriceRequest, RetryPolicy,
    WithRetryPolicy,
};

/// Fails the first `fail_first` calls with a transport error.
struct FlakySource {
    calls: AtomicU32,
    fail_first: u32,
}

impl FlakySource {
    fn new(fail_first: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_first,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PriceDataSource for FlakySource {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn fetch(&self, req: &PriceRequest) -> Result<PriceFrame, PriceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return Err(PriceError::Transport(format!("attempt {} refused", n + 1)));
        }
        let mut f = PriceFrame::new();
        f.insert(req.tickers[0].clone(), vec![PricePoint::new(req.start, 100.0)]);
        Ok(f)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO, Duration::ZERO)
    }
}

fn req() -> PriceRequest {
    PriceRequest::new(
        vec!["AAA".to_string()],
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
    )
}

#[tokio::test]
async fn transient_failures_within_budget_succeed() {
    let src = FlakySource::new(2);
    let frame = src.fetch_with_retry(&req()).await.expect("third attempt succeeds");
    assert_eq!(src.calls(), 3);
    assert_eq!(frame.first_close("AAA"), Some(100.0));
}

#[tokio::test]
async fn exhausted_budget_reports_last_error() {
    let src = FlakySource::new(10);
    let err = src.fetch_with_retry(&req()).await.unwrap_err();
    assert_eq!(src.calls(), 3);
    match err {
        PriceError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(*last, PriceError::Transport("attempt 3 refused".to_string()));
        }
        other => panic!("expected Exhausted, got {other}"),
    }
}

#[tokio::test]
async fn wrapper_policy_overrides_source_policy() {
    let src = WithRetryPolicy::new(FlakySource::new(10), RetryPolicy::no_retry());
    let err = src.fetch_with_retry(&req()).await.unwrap_err();
    assert!(matches!(err, PriceError::Exhausted { attempts: 1, .. }));
    assert_eq!(src.into_inner().calls(), 1);
}
