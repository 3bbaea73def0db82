//! JSON-pointer helpers shared by the unused-key and secret guards.

use serde_json::Value;

/// Every scalar leaf as `(pointer, value)`, in document order.
/// Empty objects and arrays have no leaves.
pub(crate) fn leaves(v: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    walk(v, String::new(), &mut out);
    out
}

fn walk<'a>(v: &'a Value, at: String, out: &mut Vec<(String, &'a Value)>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                walk(child, format!("{at}/{}", escape(k)), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, format!("{at}/{i}"), out);
            }
        }
        _ => out.push((if at.is_empty() { "/".to_string() } else { at }, v)),
    }
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Leading slash added, trailing slashes dropped; "" is the root.
pub(crate) fn normalize(p: &str) -> String {
    let trimmed = p.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// `/a/b` covers `/a/b` and `/a/b/c`, never `/a/bc`. The root covers everything.
pub(crate) fn covers(prefix: &str, leaf: &str) -> bool {
    prefix == "/"
        || leaf
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Last token of a pointer.
pub(crate) fn last_token(p: &str) -> &str {
    p.rsplit('/').next().unwrap_or(p)
}
