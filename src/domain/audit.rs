use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// One append-only audit row. Entries sharing a decision_chain_id together
/// reconstruct the full provenance of one capital decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub severity: Severity,
    pub component: String,
    pub symbol: Option<String>,
    pub details: Value,
    pub decision_chain_id: Option<Uuid>,
}

const SENSITIVE_FRAGMENTS: [&str; 5] = ["password", "token", "secret", "key", "jwt"];

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|s| lower.contains(s))
}

/// Recursively replaces the value of any key whose name contains a
/// credential fragment. A sensitive key with a non-object value (scalar
/// or list) is redacted wholesale; only nested objects are walked.
pub fn redact_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_sensitive(k) && !v.is_object() {
                    out.insert(k.clone(), Value::String("***REDACTED***".to_string()));
                } else {
                    out.insert(k.clone(), redact_secrets(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_secrets).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_flat_keys() {
        let redacted = redact_secrets(&json!({
            "symbol": "AAPL",
            "api_key": "sk-123",
            "jwt": "eyJhbGc",
        }));
        assert_eq!(redacted["symbol"], "AAPL");
        assert_eq!(redacted["api_key"], "***REDACTED***");
        assert_eq!(redacted["jwt"], "***REDACTED***");
    }

    #[test]
    fn test_redacts_nested_maps() {
        let redacted = redact_secrets(&json!({
            "broker": { "alpaca_secret_key": "abc", "base_url": "https://x" },
            "accounts": [{ "password": "p" }],
        }));
        assert_eq!(redacted["broker"]["alpaca_secret_key"], "***REDACTED***");
        assert_eq!(redacted["broker"]["base_url"], "https://x");
        assert_eq!(redacted["accounts"][0]["password"], "***REDACTED***");
    }

    #[test]
    fn test_redacts_list_valued_sensitive_keys_wholesale() {
        let redacted = redact_secrets(&json!({
            "api_keys": ["sk-a", "sk-b"],
            "tokens": ["t1"],
            "symbols": ["AAPL", "MSFT"],
        }));
        assert_eq!(redacted["api_keys"], "***REDACTED***");
        assert_eq!(redacted["tokens"], "***REDACTED***");
        assert_eq!(redacted["symbols"], json!(["AAPL", "MSFT"]));
    }

    #[test]
    fn test_case_insensitive_match() {
        let redacted = redact_secrets(&json!({ "Api_Token": "t" }));
        assert_eq!(redacted["Api_Token"], "***REDACTED***");
    }

    #[test]
    fn test_non_sensitive_payload_unchanged() {
        let details = json!({ "shares": 12, "entry_price": 185.2 });
        assert_eq!(redact_secrets(&details), details);
    }
}
