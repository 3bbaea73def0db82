use anyhow::{bail, Result};
use serde_json::Value;

use crate::pointer::{last_token, leaves};

/// Prefixes of well-known credential formats.
const SECRET_PREFIXES: &[&str] = &[
    "sk-", "sk_live", "sk_test", "AKIA", "-----BEGIN", "ghp_", "gho_", "glpat-", "xoxb-", "xoxp-",
];

/// Keys that name a credential. Any non-empty string under them is refused;
/// the CLI reads the TwelveData key from `TWELVEDATA_API_KEY` instead.
const SECRET_KEYS: &[&str] = &["api_key", "apikey", "password", "secret", "token"];

pub(crate) fn reject_secret_literals(config: &Value) -> Result<()> {
    for (ptr, v) in leaves(config) {
        let Some(s) = v.as_str() else { continue };
        let s = s.trim();
        let named = SECRET_KEYS
            .iter()
            .any(|k| last_token(&ptr).eq_ignore_ascii_case(k));
        if (named && !s.is_empty()) || looks_like_credential(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
        }
    }
    Ok(())
}

fn looks_like_credential(s: &str) -> bool {
    s.len() >= 8 && SECRET_PREFIXES.iter().any(|p| s.starts_with(p))
}
