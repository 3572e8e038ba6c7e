use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Network hop of the relay a failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Assertion,
    Exchange,
    Downstream,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Assertion => "assertion",
            Stage::Exchange => "exchange",
            Stage::Downstream => "downstream",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayErrorKind {
    ConfigMissing,
    IdentityProviderError,
    ExchangeError,
    DownstreamHttpError,
    NetworkError,
    DecodeError,
}

impl RelayErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelayErrorKind::ConfigMissing => "config_missing",
            RelayErrorKind::IdentityProviderError => "identity_provider_error",
            RelayErrorKind::ExchangeError => "exchange_error",
            RelayErrorKind::DownstreamHttpError => "downstream_http_error",
            RelayErrorKind::NetworkError => "network_error",
            RelayErrorKind::DecodeError => "decode_error",
        }
    }
}

/// Terminal failure of one relay invocation.
///
/// Messages carry provider diagnostics only. Token values are never placed in
/// a variant; callers still run the rendered text through redaction.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("missing required configuration: {}", .missing.join(", "))]
    ConfigMissing { missing: Vec<&'static str> },

    #[error("managed identity assertion request failed{}: {detail}", status_suffix(.status))]
    IdentityProvider { status: Option<u16>, detail: String },

    #[error("on-behalf-of token exchange failed{}: {detail}", status_suffix(.status))]
    Exchange {
        status: Option<u16>,
        code: Option<String>,
        detail: String,
    },

    #[error("downstream request failed with HTTP {status}")]
    DownstreamHttp { status: u16, detail: Option<String> },

    #[error("{stage} request failed: {detail}")]
    Network { stage: Stage, detail: String },

    #[error("{stage} response could not be decoded: {detail}")]
    Decode { stage: Stage, detail: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl RelayError {
    pub fn kind(&self) -> RelayErrorKind {
        match self {
            RelayError::ConfigMissing { .. } => RelayErrorKind::ConfigMissing,
            RelayError::IdentityProvider { .. } => RelayErrorKind::IdentityProviderError,
            RelayError::Exchange { .. } => RelayErrorKind::ExchangeError,
            RelayError::DownstreamHttp { .. } => RelayErrorKind::DownstreamHttpError,
            RelayError::Network { .. } => RelayErrorKind::NetworkError,
            RelayError::Decode { .. } => RelayErrorKind::DecodeError,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            RelayError::ConfigMissing { .. } => None,
            RelayError::IdentityProvider { .. } => Some(Stage::Assertion),
            RelayError::Exchange { .. } => Some(Stage::Exchange),
            RelayError::DownstreamHttp { .. } => Some(Stage::Downstream),
            RelayError::Network { stage, .. } | RelayError::Decode { stage, .. } => Some(*stage),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::IdentityProvider { status, .. } | RelayError::Exchange { status, .. } => {
                *status
            }
            RelayError::DownstreamHttp { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the user could plausibly fix this by granting consent.
    /// Everything except a deployment misconfiguration qualifies.
    pub fn is_consent_recoverable(&self) -> bool {
        !matches!(self, RelayError::ConfigMissing { .. })
    }

    pub fn diagnostics(&self) -> Value {
        let mut out = serde_json::json!({
            "kind": self.kind(),
            "stage": self.stage(),
            "status": self.status(),
        });
        if let Some(obj) = out.as_object_mut() {
            match self {
                RelayError::ConfigMissing { missing } => {
                    obj.insert("missing".to_string(), serde_json::json!(missing));
                }
                RelayError::Exchange {
                    code: Some(code), ..
                } => {
                    obj.insert("provider_code".to_string(), Value::String(code.clone()));
                }
                RelayError::DownstreamHttp {
                    detail: Some(detail),
                    ..
                } => {
                    obj.insert("body".to_string(), Value::String(detail.clone()));
                }
                _ => {}
            }
        }
        out
    }
}
