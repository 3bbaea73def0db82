use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pointer::{covers, leaves, normalize};

/// JSON-pointer prefixes read by a backtest run.
///
/// Must match what `sbt_backtest::BacktestConfig::from_config_json` reads.
/// A leaf under any of these prefixes counts as consumed.
pub const BACKTEST_CONSUMED_POINTERS: &[&str] = &[
    "/backtest",
    "/screen",
    "/ranking",
    "/sizing",
    "/data/retry",
    "/metrics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Normalized consumed prefixes (sorted, unique).
    pub consumed_prefixes: Vec<String>,
    /// Leaf pointers outside every consumed prefix (sorted, unique).
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Check against [`BACKTEST_CONSUMED_POINTERS`]. `Fail` turns a non-clean
/// report into an error; `Warn` always returns the report.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    report_unused_keys_against(BACKTEST_CONSUMED_POINTERS, config_json, policy)
}

pub fn report_unused_keys_against(
    consumed_pointers: &[&str],
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let mut consumed_prefixes: Vec<String> =
        consumed_pointers.iter().map(|p| normalize(p)).collect();
    consumed_prefixes.sort();
    consumed_prefixes.dedup();

    let mut unused: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(p, _)| p)
        .filter(|leaf| !consumed_prefixes.iter().any(|c| covers(c, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let preview: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) not read by the backtest: {}",
            report.unused_leaf_pointers.len(),
            preview.join(", ")
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_registry_overrides_default() {
        let cfg = json!({"backtest": {"initial_capital": 1}, "extra": {"k": 1}});
        let r = report_unused_keys_against(&["extra/", "/extra"], &cfg, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(r.consumed_prefixes, vec!["/extra"]);
        assert_eq!(r.unused_leaf_pointers, vec!["/backtest/initial_capital"]);
    }

    #[test]
    fn retry_is_consumed_but_other_data_keys_are_not() {
        let cfg = json!({"data": {"retry": {"max_attempts": 2}, "source": "csv"}});
        let r = report_unused_keys(&cfg, UnusedKeyPolicy::Warn).unwrap();
        assert_eq!(r.unused_leaf_pointers, vec!["/data/source"]);
    }
}
