use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

const DEFAULT_REDACTION: &str = "[REDACTED]";
const INLINE_REDACTION: &str = "***REDACTED***";

const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "access_token",
    "refresh_token",
    "id_token",
    "assertion",
    "client_assertion",
    "client_secret",
    "x-identity-header",
];

static INLINE_REDACTION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]*")
                .expect("inline redaction regex"),
            INLINE_REDACTION,
        ),
        (
            Regex::new(r"(?i)\b(Bearer)\s+([A-Za-z0-9._~+/=-]{6,})")
                .expect("inline redaction regex"),
            "$1 ***REDACTED***",
        ),
        (
            Regex::new(
                r#"(?i)\b(access_token|refresh_token|id_token|client_assertion|assertion|client_secret)\b(["']?\s*[:=]\s*["']?)([^\s"'&,}]+)"#,
            )
            .expect("inline redaction regex"),
            "$1$2***REDACTED***",
        ),
    ]
});

/// Token values seen during one invocation, scrubbed from anything rendered
/// for that invocation.
#[derive(Debug, Default)]
pub struct SecretTrail {
    values: Vec<SecretString>,
}

impl SecretTrail {
    pub fn record(&mut self, value: &str) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            self.values.push(SecretString::new(trimmed.into()));
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn text(&self, value: &str, max_string: usize) -> String {
        let exposed = self.exposed();
        redact_text(value, max_string, Some(&exposed))
    }

    pub fn object(&self, value: &Value, max_string: usize) -> Value {
        let exposed = self.exposed();
        redact_object(value, max_string, Some(&exposed))
    }

    fn exposed(&self) -> Vec<String> {
        // Longest first so a secret containing another is replaced whole.
        let mut out: Vec<String> = self
            .values
            .iter()
            .map(|v| v.expose_secret().to_string())
            .collect();
        out.sort_by_key(|v| std::cmp::Reverse(v.len()));
        out
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    SENSITIVE_KEYS.contains(&normalized.as_str()) || normalized.ends_with("_token")
}

fn truncate_utf8(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &value[..end])
}

fn redact_inline_secrets(value: &str, extra: Option<&[String]>) -> String {
    let mut out = value.to_string();
    // Exact values first: a pattern rewrite could split a known secret.
    if let Some(values) = extra {
        for raw in values {
            let needle = raw.trim();
            if needle.is_empty() {
                continue;
            }
            out = out.replace(needle, INLINE_REDACTION);
        }
    }
    for (re, replacement) in INLINE_REDACTION_PATTERNS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).to_string();
        }
    }
    out
}

pub fn redact_text(value: &str, max_string: usize, extra_secrets: Option<&[String]>) -> String {
    let redacted = redact_inline_secrets(value, extra_secrets);
    truncate_utf8(&redacted, max_string)
}

pub fn redact_object(value: &Value, max_string: usize, extra_secrets: Option<&[String]>) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text, max_string, extra_secrets)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_object(item, max_string, extra_secrets))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map.iter() {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(DEFAULT_REDACTION.to_string()));
                    continue;
                }
                out.insert(key.clone(), redact_object(entry, max_string, extra_secrets));
            }
            Value::Object(out)
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}
