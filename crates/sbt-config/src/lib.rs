//! sbt-config
//!
//! Layered YAML configuration for backtest runs.
//!
//! - Docs are deep-merged in order (earlier = base, later = override).
//! - The merged document is canonical JSON; its SHA-256 is the run's config hash.
//! - Literal secrets are rejected; API keys are read from env by the caller.
//! - Unused keys can be reported (warn) or rejected (fail).

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

mod pointer;
mod secrets;
mod unused;

pub use unused::{
    report_unused_keys, report_unused_keys_against, UnusedKeyPolicy, UnusedKeyReport,
    BACKTEST_CONSUMED_POINTERS,
};

/// The effective config of one run.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    /// Compact JSON with sorted keys.
    pub canonical_json: String,
    pub config_json: Value,
}

/// Read and merge YAML files in the given order.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("yaml->json conversion failed in layer {i}"))?;
        // An empty file parses as null and overrides nothing.
        if layer.is_null() {
            continue;
        }
        overlay(&mut merged, layer);
    }

    secrets::reject_secret_literals(&merged)?;

    // Map is BTreeMap-backed, so source key order never reaches the hash.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));

    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `layer` replaces `base`.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (k, v) in layer_map {
                match base_map.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}
