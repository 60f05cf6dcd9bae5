//! Shared utilities for ipactl.

use serde_json::Value;

/// Replacement text for masked values.
pub const MASK: &str = "***";

/// Attribute names whose values never reach the logs.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "userpassword",
    "krbprincipalkey",
    "ipasecret",
    "ipaotpsecret",
    "ipatokenotpkey",
    "randompassword",
];

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|s| key == *s || key.ends_with(s))
}

/// Mask sensitive values in a JSON-RPC payload before logging.
///
/// Covers keyed values (`{"userpassword": "..."}`) and the `attr=value`
/// strings used by `addattr`/`setattr`/`delattr`.
pub fn mask_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let masked = if is_sensitive_key(k) && !v.is_null() {
                        Value::String(MASK.to_string())
                    } else {
                        mask_secrets(v)
                    };
                    (k.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_secrets).collect()),
        Value::String(s) => Value::String(mask_attr_assignment(s)),
        other => other.clone(),
    }
}

fn mask_attr_assignment(s: &str) -> String {
    match s.split_once('=') {
        Some((key, _)) if is_sensitive_key(key) => format!("{key}={MASK}"),
        _ => s.to_string(),
    }
}

/// Keep only the cookie name of a `name=value; attrs` header for logging.
pub fn mask_cookie(cookie: &str) -> String {
    match cookie.split_once('=') {
        Some((name, _)) => format!("{}={MASK}", name.trim()),
        None => MASK.to_string(),
    }
}
