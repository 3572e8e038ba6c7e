use crate::errors::ToolError;
use crate::services::graph_client::DownstreamClient;
use crate::services::logger::Logger;
use crate::services::obo::{ExchangeOutcome, ObOExchanger};
use crate::services::request_context::InboundRequest;
use crate::services::response_shaper::{RelayResult, ResponseShaper, UserInfoResult};
use crate::utils::redact::SecretTrail;
use serde_json::Value;
use std::sync::Arc;

pub const GET_CURRENT_USER: &str = "get_current_user";
pub const GET_USER_INFO: &str = "get_user_info";

/// Resolves the calling user's Graph profile through the OBO relay.
pub struct UserManager {
    logger: Logger,
    exchanger: ObOExchanger,
    downstream: DownstreamClient,
    shaper: ResponseShaper,
    me_endpoint: String,
}

impl UserManager {
    pub fn new(
        logger: Logger,
        exchanger: ObOExchanger,
        downstream: DownstreamClient,
        shaper: ResponseShaper,
        me_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            logger: logger.child("user"),
            exchanger,
            downstream,
            shaper,
            me_endpoint: me_endpoint.into(),
        }
    }

    pub async fn current_user(&self, ctx: &InboundRequest) -> UserInfoResult {
        let mut trail = SecretTrail::default();
        let result = match self.exchanger.exchange(ctx, &mut trail).await {
            ExchangeOutcome::Unauthenticated(reason) => {
                self.logger.debug(
                    "request is unauthenticated",
                    Some(&serde_json::json!({ "reason": format!("{:?}", reason) })),
                );
                RelayResult::Unauthenticated(reason)
            }
            ExchangeOutcome::Failed(err) => RelayResult::Failure(err),
            ExchangeOutcome::Exchanged(token) => {
                match self.downstream.call(&self.me_endpoint, &token).await {
                    Ok(profile) => {
                        self.logger.info("Successfully retrieved user info", None);
                        RelayResult::Success(profile)
                    }
                    Err(err) => RelayResult::Failure(err),
                }
            }
        };

        if let RelayResult::Failure(err) = &result {
            self.logger.error(
                "Error getting user info",
                Some(&trail.object(&err.diagnostics(), usize::MAX)),
            );
        }
        self.shaper.shape(result, &trail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserToolFormat {
    /// Canonical JSON document.
    Json,
    /// Plain-text summary.
    Text,
}

#[derive(Clone)]
pub struct UserTool {
    manager: Arc<UserManager>,
    format: UserToolFormat,
}

impl UserTool {
    pub fn new(manager: Arc<UserManager>, format: UserToolFormat) -> Self {
        Self { manager, format }
    }
}

#[async_trait::async_trait]
impl crate::services::tool_executor::ToolHandler for UserTool {
    async fn handle(&self, ctx: &InboundRequest, _args: Value) -> Result<Value, ToolError> {
        let result = self.manager.current_user(ctx).await;
        let text = match self.format {
            UserToolFormat::Json => result.to_json_text(),
            UserToolFormat::Text => result.to_summary_text(),
        };
        Ok(Value::String(text))
    }
}
