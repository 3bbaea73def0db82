//! Command handler modules for the `sbt` binary.
//!
//! Shared helpers live here; command-specific logic lives in the submodules.

pub mod backtest;
pub mod db;

use anyhow::{Context, Result};
use uuid::Uuid;

/// Env-var name for the TwelveData API key.
pub const ENV_TWELVEDATA_API_KEY: &str = "TWELVEDATA_API_KEY";

pub fn parse_run_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).context("invalid run_id uuid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_trimmed_and_validated() {
        let id = Uuid::new_v4();
        assert_eq!(parse_run_id(&format!(" {id}\n")).unwrap(), id);
        assert!(parse_run_id("not-a-uuid").is_err());
    }
}
