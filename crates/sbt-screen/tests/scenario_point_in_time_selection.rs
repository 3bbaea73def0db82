//! Per-period selection never looks ahead and respects thresholds.
//!
//! GREEN when:
//! - each cutoff sees only records with `year <= cutoff`;
//! - a company whose latest record fails thresholds is excluded even if an
//!   older record would pass;
//! - an empty screen is `NoCandidates` for that year.

use sbt_screen::{
    FundamentalRecord, InMemoryFundamentals, RankingSpec, ScreenError, ScreenThresholds,
    ScreeningEngine,
};

fn rec(c: &str, year: i32, roce: f64, roe: f64, pat: f64, pe: f64, cap: f64) -> FundamentalRecord {
    FundamentalRecord::new(c, year)
        .with_roce(roce)
        .with_roe(roe)
        .with_pat(pat)
        .with_pe(pe)
        .with_market_cap(cap)
}

fn repo() -> InMemoryFundamentals {
    InMemoryFundamentals::new(vec![
        rec("AAA", 2019, 20.0, 18.0, 100.0, 12.0, 5_000.0),
        rec("AAA", 2021, 5.0, 18.0, 100.0, 12.0, 5_000.0),
        rec("BBB", 2019, 25.0, 22.0, 50.0, 20.0, 8_000.0),
        rec("CCC", 2020, 30.0, 30.0, 10.0, 9.0, 2_000.0),
        rec("DDD", 2019, 40.0, 40.0, 10.0, 5.0, 900_000.0),
    ])
    .unwrap()
}

fn engine(n: usize) -> ScreeningEngine {
    ScreeningEngine::new(
        ScreenThresholds {
            roce_min: 15.0,
            pat_min: 0.0,
            market_cap_min: 1_000.0,
            market_cap_max: 100_000.0,
        },
        RankingSpec::parse("roe:desc", false).unwrap(),
        n,
    )
}

#[tokio::test]
async fn cutoff_limits_visible_records() {
    let repo = repo();
    let e = engine(10);

    let s2019 = e.select_for_year(&repo, 2019).await.unwrap();
    assert_eq!(s2019.tickers(), vec!["BBB", "AAA"]);

    let s2020 = e.select_for_year(&repo, 2020).await.unwrap();
    assert_eq!(s2020.tickers(), vec!["CCC", "BBB", "AAA"]);

    // AAA's 2021 record fails roce_min; its 2019 record must not leak back in.
    let s2021 = e.select_for_year(&repo, 2021).await.unwrap();
    assert_eq!(s2021.tickers(), vec!["CCC", "BBB"]);
    assert!(s2021.find("AAA").is_none());
}

#[tokio::test]
async fn portfolio_size_truncates() {
    let s = engine(1).select_for_year(&repo(), 2020).await.unwrap();
    assert_eq!(s.tickers(), vec!["CCC"]);
    assert_eq!(s.candidates[0].composite_rank, Some(1.0));
}

#[tokio::test]
async fn empty_screen_is_no_candidates() {
    let err = engine(5).select_for_year(&repo(), 2015).await.unwrap_err();
    assert_eq!(err, ScreenError::NoCandidates { cutoff_year: 2015 });
}
