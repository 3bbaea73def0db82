//! sbt-screen
//!
//! Point-in-time fundamentals screening: records, the repository contract,
//! table operations, ranking and the per-period selection pipeline.
//!
//! Nothing here touches prices or capital.

pub mod engine;
pub mod loader;
pub mod ranking;
pub mod repository;
pub mod table;
pub mod types;

pub use engine::{screen, ScreenError, ScreeningEngine};
pub use loader::{load_fundamentals_csv, parse_fundamentals_csv_str, FundamentalsCsvError};
pub use ranking::{rank, select_top, RankKey, RankingParseError, RankingSpec};
pub use repository::{FundamentalsRepository, InMemoryFundamentals, RepositoryError};
pub use table::{group_latest_by_cutoff, rank_by, select};
pub use types::{
    Candidate, Direction, FundamentalRecord, Metric, ScreenThresholds, Selection,
};
