use crate::constants::identity;
use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;

/// Successful token-endpoint body, shared by the managed identity endpoint and
/// the OBO exchange. `expires_on` is epoch seconds; either field may arrive as
/// a string or a number.
#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    expires_on: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

pub struct IssuedToken {
    pub value: SecretString,
    pub expires_at: DateTime<Utc>,
}

fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Parses an issued token. The error string is a decode diagnostic and never
/// contains the body.
pub fn parse_issued_token(body: &str, now: DateTime<Utc>) -> Result<IssuedToken, String> {
    let parsed: TokenBody =
        serde_json::from_str(body).map_err(|err| format!("invalid token response: {}", err))?;
    let token = parsed
        .access_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "token response did not include access_token".to_string())?;

    let expires_at = parsed
        .expires_on
        .as_ref()
        .and_then(seconds)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            parsed
                .expires_in
                .as_ref()
                .and_then(seconds)
                .map(|secs| now + Duration::seconds(secs))
        })
        .unwrap_or_else(|| now + Duration::seconds(identity::DEFAULT_ASSERTION_TTL_SECS));

    Ok(IssuedToken {
        value: SecretString::new(token.into()),
        expires_at,
    })
}

impl ProviderError {
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// `code: description`, or whichever half is present.
    pub fn summary(&self) -> Option<String> {
        match (self.error.as_deref(), self.error_description.as_deref()) {
            (Some(code), Some(desc)) => Some(format!("{}: {}", code, desc.trim())),
            (Some(code), None) => Some(code.to_string()),
            (None, Some(desc)) => Some(desc.trim().to_string()),
            (None, None) => None,
        }
    }
}
