//! sbt-portfolio
//!
//! Position sizing and share-based period valuation.
//! Pure deterministic logic (no IO, no time, no price fetching).

pub mod allocator;
pub mod valuation;

pub use allocator::{AllocationError, Holding, PositionWeights, SizingPolicy, WeightAllocator};
pub use valuation::{value_period, PeriodValuation, PositionValuation};
