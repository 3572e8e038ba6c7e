use crate::constants::{limits, masking};
use crate::errors::{RelayError, Stage};
use crate::services::obo::UnauthenticatedReason;
use crate::utils::redact::SecretTrail;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUCCESS_MESSAGE: &str = "Successfully retrieved user information from Microsoft Graph";
pub const NO_HEADERS_MESSAGE: &str =
    "No authentication headers found. This tool requires Azure App Service authentication.";
pub const NO_BEARER_MESSAGE: &str = "No bearer token found in authorization header.";
pub const NO_TOKEN_TEXT: &str = "Error: No access token found in request";

const CONSENT_HINT: &str = "You're logged in but might need to grant consent to the application. Open a browser to the following link to consent:";

/// Terminal state of one relay invocation, before presentation.
#[derive(Debug)]
pub enum RelayResult {
    Success(Value),
    Unauthenticated(UnauthenticatedReason),
    Failure(RelayError),
}

/// Canonical tool output. Every presentation is derived from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoResult {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_url: Option<String>,
}

/// Replaces `id` and every `businessPhones` entry. Other fields pass through.
pub fn mask_profile(profile: &Value) -> Value {
    let Some(map) = profile.as_object() else {
        return profile.clone();
    };
    let mut out = map.clone();
    for field in masking::MASKED_SCALAR_FIELDS {
        if let Some(slot) = out.get_mut(*field) {
            *slot = Value::String(masking::MASK.to_string());
        }
    }
    for field in masking::MASKED_LIST_FIELDS {
        if let Some(slot) = out.get_mut(*field) {
            let masked = match &*slot {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|_| Value::String(masking::MASK.to_string()))
                        .collect(),
                ),
                _ => Value::String(masking::MASK.to_string()),
            };
            *slot = masked;
        }
    }
    Value::Object(out)
}

fn join_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [one] => one.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Assertion => "identity assertion",
        Stage::Exchange => "token exchange",
        Stage::Downstream => "Microsoft Graph",
    }
}

#[derive(Debug, Clone)]
pub struct ResponseShaper {
    consent_url: String,
}

impl ResponseShaper {
    pub fn new(consent_url: impl Into<String>) -> Self {
        Self {
            consent_url: consent_url.into(),
        }
    }

    pub fn consent_url(&self) -> &str {
        &self.consent_url
    }

    pub fn shape(&self, result: RelayResult, trail: &SecretTrail) -> UserInfoResult {
        match result {
            RelayResult::Success(profile) => UserInfoResult {
                authenticated: true,
                user: Some(mask_profile(&profile)),
                message: SUCCESS_MESSAGE.to_string(),
                kind: None,
                error: None,
                details: None,
                consent_url: None,
            },
            RelayResult::Unauthenticated(reason) => UserInfoResult {
                authenticated: false,
                user: None,
                message: match reason {
                    UnauthenticatedReason::NoHeaders => NO_HEADERS_MESSAGE,
                    UnauthenticatedReason::NoBearer => NO_BEARER_MESSAGE,
                }
                .to_string(),
                kind: Some("unauthenticated".to_string()),
                error: None,
                details: None,
                consent_url: None,
            },
            RelayResult::Failure(err) => self.shape_failure(&err, trail),
        }
    }

    fn shape_failure(&self, err: &RelayError, trail: &SecretTrail) -> UserInfoResult {
        let consent_url = err
            .is_consent_recoverable()
            .then(|| self.consent_url.clone());
        UserInfoResult {
            authenticated: false,
            user: None,
            message: self.failure_message(err),
            kind: Some(err.kind().as_str().to_string()),
            error: Some(trail.text(&err.to_string(), limits::MAX_ERROR_DETAIL)),
            details: Some(trail.object(&err.diagnostics(), limits::MAX_ERROR_DETAIL)),
            consent_url,
        }
    }

    fn failure_message(&self, err: &RelayError) -> String {
        let url = &self.consent_url;
        match err {
            RelayError::ConfigMissing { missing } => format!(
                "Missing required environment variables for OBO flow. Ensure {} {} set.",
                join_names(missing),
                if missing.len() == 1 { "is" } else { "are" }
            ),
            RelayError::IdentityProvider { .. } => format!(
                "Could not obtain a workload identity assertion for the token exchange. Check the managed identity and its federated credential, then retry. If you were recently signed out, open a browser to the following link to sign in again: {}",
                url
            ),
            RelayError::Exchange { .. } => format!(
                "Error during token exchange. {} {}",
                CONSENT_HINT, url
            ),
            RelayError::DownstreamHttp { status, .. } => format!(
                "Microsoft Graph returned HTTP {}. {} {}",
                status, CONSENT_HINT, url
            ),
            RelayError::Network { stage, .. } => format!(
                "A network error interrupted the {} step. Retry the request. If it keeps failing, open a browser to the following link to sign in again: {}",
                stage_label(*stage),
                url
            ),
            RelayError::Decode { stage, .. } => format!(
                "Received an unreadable response during the {} step. Retry the request, or open a browser to the following link to sign in again: {}",
                stage_label(*stage),
                url
            ),
        }
    }
}

impl UserInfoResult {
    pub fn to_json_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Plain-text adapter over the canonical result.
    pub fn to_summary_text(&self) -> String {
        if self.authenticated {
            let user = self.user.as_ref().unwrap_or(&Value::Null);
            let field = |name: &str| match user.get(name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "N/A".to_string(),
                Some(other) => other.to_string(),
            };
            return format!(
                "User Information:\n- Display Name: {}\n- Email: {}\n- User Principal Name: {}\n- ID: {}",
                field("displayName"),
                field("mail"),
                field("userPrincipalName"),
                field("id"),
            );
        }
        match self.error.as_deref() {
            None => NO_TOKEN_TEXT.to_string(),
            Some(error) => format!("Error getting user info: {}\n\n{}", error, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONSENT: &str =
        "https://relay.example.net/.auth/login/aad?post_login_redirect_uri=https://relay.example.net/";

    fn shaper() -> ResponseShaper {
        ResponseShaper::new(CONSENT)
    }

    #[test]
    fn masking_keeps_phone_cardinality_and_hides_id() {
        let masked = mask_profile(&json!({
            "displayName": "Jane Doe",
            "mail": "jane@x.com",
            "id": "999",
            "businessPhones": ["555-1111", "555-2222", "555-3333"],
        }));
        assert_eq!(
            masked,
            json!({
                "displayName": "Jane Doe",
                "mail": "jane@x.com",
                "id": "[MASKED]",
                "businessPhones": ["[MASKED]", "[MASKED]", "[MASKED]"],
            })
        );
    }

    #[test]
    fn masking_leaves_absent_fields_absent() {
        let masked = mask_profile(&json!({"displayName": "Jane", "businessPhones": []}));
        assert_eq!(masked, json!({"displayName": "Jane", "businessPhones": []}));
        assert!(masked.get("id").is_none());
    }

    #[test]
    fn scalar_business_phones_are_masked_whole() {
        let masked = mask_profile(&json!({"businessPhones": "555-1111"}));
        assert_eq!(masked["businessPhones"], "[MASKED]");
    }

    #[test]
    fn unauthenticated_results_have_no_error_or_consent() {
        let trail = SecretTrail::default();
        let no_headers = shaper().shape(
            RelayResult::Unauthenticated(UnauthenticatedReason::NoHeaders),
            &trail,
        );
        assert!(!no_headers.authenticated);
        assert_eq!(no_headers.message, NO_HEADERS_MESSAGE);
        assert!(no_headers.consent_url.is_none());
        assert!(no_headers.error.is_none());
        assert_eq!(no_headers.to_summary_text(), NO_TOKEN_TEXT);

        let no_bearer = shaper().shape(
            RelayResult::Unauthenticated(UnauthenticatedReason::NoBearer),
            &trail,
        );
        assert_eq!(no_bearer.message, NO_BEARER_MESSAGE);
    }

    #[test]
    fn config_missing_names_variables_without_consent_url() {
        let result = shaper().shape(
            RelayResult::Failure(RelayError::ConfigMissing {
                missing: vec!["WEBSITE_AUTH_CLIENT_ID", "WEBSITE_AUTH_AAD_ALLOWED_TENANTS"],
            }),
            &SecretTrail::default(),
        );
        assert_eq!(result.kind.as_deref(), Some("config_missing"));
        assert!(result.consent_url.is_none());
        assert_eq!(
            result.message,
            "Missing required environment variables for OBO flow. Ensure WEBSITE_AUTH_CLIENT_ID and WEBSITE_AUTH_AAD_ALLOWED_TENANTS are set."
        );
    }

    #[test]
    fn exchange_failure_points_at_consent() {
        let mut trail = SecretTrail::default();
        trail.record("user-bearer-token");
        let result = shaper().shape(
            RelayResult::Failure(RelayError::Exchange {
                status: Some(400),
                code: Some("invalid_grant".to_string()),
                detail: "AADSTS65001: consent required for user-bearer-token".to_string(),
            }),
            &trail,
        );
        assert_eq!(result.consent_url.as_deref(), Some(CONSENT));
        assert!(result.message.contains("grant consent"));
        assert!(result.message.ends_with(CONSENT));
        let rendered = result.to_json_text();
        assert!(!rendered.contains("user-bearer-token"));
        assert!(rendered.contains("AADSTS65001"));
    }

    #[test]
    fn network_failure_message_differs_from_exchange_failure() {
        let trail = SecretTrail::default();
        let network = shaper().shape(
            RelayResult::Failure(RelayError::Network {
                stage: Stage::Downstream,
                detail: "timed out after 30000 ms".to_string(),
            }),
            &trail,
        );
        assert!(network.message.contains("network error"));
        assert!(!network.message.contains("grant consent"));
        assert_eq!(network.consent_url.as_deref(), Some(CONSENT));
    }

    #[test]
    fn success_summary_uses_masked_profile() {
        let result = shaper().shape(
            RelayResult::Success(json!({
                "displayName": "Jane Doe",
                "mail": "jane@x.com",
                "id": "999",
            })),
            &SecretTrail::default(),
        );
        assert_eq!(result.message, SUCCESS_MESSAGE);
        assert_eq!(
            result.to_summary_text(),
            "User Information:\n- Display Name: Jane Doe\n- Email: jane@x.com\n- User Principal Name: N/A\n- ID: [MASKED]"
        );
        let parsed: Value = serde_json::from_str(&result.to_json_text()).expect("json");
        assert_eq!(parsed["authenticated"], true);
        assert!(parsed.get("consent_url").is_none());
    }

    #[test]
    fn failure_summary_carries_error_and_guidance() {
        let result = shaper().shape(
            RelayResult::Failure(RelayError::DownstreamHttp {
                status: 403,
                detail: None,
            }),
            &SecretTrail::default(),
        );
        let text = result.to_summary_text();
        assert!(text.starts_with(
            "Error getting user info: downstream request failed with HTTP 403\n\n"
        ));
        assert!(text.contains("You're logged in but might need to grant consent"));
        assert!(text.ends_with(CONSENT));
    }
}
