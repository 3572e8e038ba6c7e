use crate::config::RelayConfig;
use crate::constants::{auth, network};
use crate::errors::{RelayError, Stage, ToolError};
use crate::services::assertion::FederatedAssertionProvider;
use crate::services::http::{build_client, clip_detail, fetch, Fetched};
use crate::services::logger::Logger;
use crate::services::request_context::InboundRequest;
use crate::services::token_response::{parse_issued_token, ProviderError};
use crate::utils::redact::SecretTrail;
use chrono::Utc;
use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Access token for the downstream resource, obtained on behalf of the caller.
/// Lives for one invocation and is never cached.
#[derive(Debug)]
pub struct ExchangedToken {
    value: SecretString,
}

impl ExchangedToken {
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// The request carried no headers at all.
    NoHeaders,
    /// Headers were present but no usable `Authorization: Bearer`.
    NoBearer,
}

#[derive(Debug)]
pub enum ExchangeOutcome {
    Unauthenticated(UnauthenticatedReason),
    Exchanged(ExchangedToken),
    Failed(RelayError),
}

pub struct ObOExchanger {
    logger: Logger,
    client: Client,
    config: RelayConfig,
    assertions: Arc<dyn FederatedAssertionProvider>,
    timeout_ms: u64,
}

impl ObOExchanger {
    pub fn new(
        logger: Logger,
        config: &RelayConfig,
        assertions: Arc<dyn FederatedAssertionProvider>,
    ) -> Result<Self, ToolError> {
        Ok(Self::with_client(logger, build_client()?, config, assertions))
    }

    pub fn with_client(
        logger: Logger,
        client: Client,
        config: &RelayConfig,
        assertions: Arc<dyn FederatedAssertionProvider>,
    ) -> Self {
        Self {
            logger: logger.child("obo"),
            client,
            config: config.clone(),
            assertions,
            timeout_ms: network::TIMEOUT_EXCHANGE_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Runs the exchange for one invocation. Every token handled along the
    /// way is recorded in `trail`.
    pub async fn exchange(
        &self,
        ctx: &InboundRequest,
        trail: &mut SecretTrail,
    ) -> ExchangeOutcome {
        if ctx.is_empty() {
            return ExchangeOutcome::Unauthenticated(UnauthenticatedReason::NoHeaders);
        }
        let Some(bearer) = ctx.bearer_token() else {
            return ExchangeOutcome::Unauthenticated(UnauthenticatedReason::NoBearer);
        };
        trail.record(bearer.expose());

        let credentials = &self.config.credentials;
        let creds = match credentials.require() {
            Ok(creds) => creds,
            Err(err) => {
                self.logger.warn(
                    "credential configuration incomplete",
                    Some(&serde_json::json!({ "missing": credentials.missing() })),
                );
                return ExchangeOutcome::Failed(err);
            }
        };

        let assertion = match self.assertions.get_assertion(credentials).await {
            Ok(token) => token,
            Err(err) => return ExchangeOutcome::Failed(err),
        };
        trail.record(assertion.expose());

        let url = self.config.token_endpoint(creds.tenant_id);
        let form = [
            ("grant_type", auth::JWT_BEARER_GRANT),
            ("client_id", creds.client_id),
            ("client_assertion_type", auth::JWT_CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.expose()),
            ("assertion", bearer.expose()),
            ("scope", self.config.downstream_scope.as_str()),
            ("requested_token_use", auth::REQUESTED_TOKEN_USE),
        ];

        let started_at = Utc::now().timestamp_millis();
        let request = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .form(&form);
        let Fetched { status, body } = match fetch(request, self.timeout_ms).await {
            Ok(fetched) => fetched,
            Err(err) => {
                return ExchangeOutcome::Failed(RelayError::Network {
                    stage: Stage::Exchange,
                    detail: err.to_string(),
                })
            }
        };

        if !status.is_success() {
            let provider = ProviderError::parse(&body);
            let detail = provider.summary().unwrap_or_else(|| clip_detail(&body));
            self.logger.warn(
                "token exchange rejected",
                Some(&serde_json::json!({
                    "status": status.as_u16(),
                    "provider_code": provider.error.as_deref(),
                })),
            );
            return ExchangeOutcome::Failed(RelayError::Exchange {
                status: Some(status.as_u16()),
                code: provider.error,
                detail,
            });
        }

        match parse_issued_token(&body, Utc::now()) {
            Ok(issued) => {
                trail.record(issued.value.expose_secret());
                self.logger.info(
                    "Successfully obtained Graph token",
                    Some(&serde_json::json!({
                        "duration_ms": Utc::now().timestamp_millis() - started_at,
                        "expires_at": issued.expires_at.to_rfc3339(),
                    })),
                );
                ExchangeOutcome::Exchanged(ExchangedToken {
                    value: issued.value,
                })
            }
            Err(detail) => ExchangeOutcome::Failed(RelayError::Decode {
                stage: Stage::Exchange,
                detail,
            }),
        }
    }
}
