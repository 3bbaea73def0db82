use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl RebalanceFrequency {
    /// Unknown values rebalance monthly.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "quarterly" => RebalanceFrequency::Quarterly,
            "yearly" | "annual" | "annually" => RebalanceFrequency::Yearly,
            _ => RebalanceFrequency::Monthly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
            RebalanceFrequency::Yearly => "yearly",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            RebalanceFrequency::Monthly => 1,
            RebalanceFrequency::Quarterly => 3,
            RebalanceFrequency::Yearly => 12,
        }
    }
}

/// Half-open `[start, end)` holding interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalancePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RebalancePeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Rebalance dates from `start`, stepping by the frequency while the running
/// date is strictly before `end`, then `end` itself.
///
/// Stepping is cumulative on the running date, so a month-end clamp carries
/// forward (Jan 31 -> Feb 28 -> Mar 28).
pub fn rebalance_dates(start: NaiveDate, end: NaiveDate, freq: RebalanceFrequency) -> Vec<NaiveDate> {
    let step = Months::new(freq.months());
    let mut dates = Vec::new();
    let mut current = start;
    while current < end {
        dates.push(current);
        match current.checked_add_months(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    dates.push(end);
    dates
}

/// Consecutive date pairs.
pub fn periods(dates: &[NaiveDate]) -> Vec<RebalancePeriod> {
    dates
        .windows(2)
        .map(|w| RebalancePeriod::new(w[0], w[1]))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RebalanceScheduler {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub frequency: RebalanceFrequency,
}

impl RebalanceScheduler {
    pub fn new(start: NaiveDate, end: NaiveDate, frequency: RebalanceFrequency) -> Self {
        Self {
            start,
            end,
            frequency,
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        rebalance_dates(self.start, self.end, self.frequency)
    }

    pub fn periods(&self) -> Vec<RebalancePeriod> {
        periods(&self.dates())
    }
}
