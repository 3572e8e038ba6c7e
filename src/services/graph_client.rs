use crate::constants::network;
use crate::errors::{RelayError, Stage, ToolError};
use crate::services::http::{build_client, clip_detail, fetch, Fetched};
use crate::services::logger::Logger;
use crate::services::obo::ExchangedToken;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;

/// Single authenticated GET against the downstream API. No retries.
#[derive(Clone)]
pub struct DownstreamClient {
    logger: Logger,
    client: Client,
    timeout_ms: u64,
}

impl DownstreamClient {
    pub fn new(logger: Logger) -> Result<Self, ToolError> {
        Ok(Self::with_client(logger, build_client()?))
    }

    pub fn with_client(logger: Logger, client: Client) -> Self {
        Self {
            logger: logger.child("graph"),
            client,
            timeout_ms: network::TIMEOUT_API_REQUEST_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub async fn call(&self, url: &str, token: &ExchangedToken) -> Result<Value, RelayError> {
        let started_at = chrono::Utc::now().timestamp_millis();
        let request = self
            .client
            .get(url)
            .bearer_auth(token.expose())
            .header(ACCEPT, "application/json");

        let Fetched { status, body } =
            fetch(request, self.timeout_ms)
                .await
                .map_err(|err| RelayError::Network {
                    stage: Stage::Downstream,
                    detail: err.to_string(),
                })?;
        self.logger.debug(
            "downstream response",
            Some(&serde_json::json!({
                "status": status.as_u16(),
                "duration_ms": chrono::Utc::now().timestamp_millis() - started_at,
            })),
        );

        if !status.is_success() {
            let detail = Some(clip_detail(&body)).filter(|d| !d.is_empty());
            return Err(RelayError::DownstreamHttp {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|err| RelayError::Decode {
            stage: Stage::Downstream,
            detail: format!("invalid JSON body: {}", err),
        })?;
        if !parsed.is_object() {
            return Err(RelayError::Decode {
                stage: Stage::Downstream,
                detail: "expected a JSON object".to_string(),
            });
        }
        Ok(parsed)
    }
}
