use crate::config::RelayConfig;
use crate::constants::network;
use crate::errors::ToolError;
use crate::managers::user::{
    UserManager, UserTool, UserToolFormat, GET_CURRENT_USER, GET_USER_INFO,
};
use crate::mcp::catalog::tool_catalog;
use crate::services::assertion::{
    CachedAssertionProvider, FederatedAssertionProvider, ManagedIdentityAssertionProvider,
};
use crate::services::graph_client::DownstreamClient;
use crate::services::http::build_client;
use crate::services::logger::Logger;
use crate::services::obo::ObOExchanger;
use crate::services::response_shaper::ResponseShaper;
use crate::services::tool_executor::{ToolExecutor, ToolHandler};
use std::collections::HashMap;
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    fn validate_tool_wiring(
        handlers: &HashMap<String, Arc<dyn ToolHandler>>,
    ) -> Result<(), ToolError> {
        let mut missing: Vec<String> = tool_catalog()
            .iter()
            .filter(|tool| !handlers.contains_key(&tool.name))
            .map(|tool| tool.name.clone())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool in tool_catalog.json must have a handler.")
            .with_details(serde_json::json!({ "missing_tools": missing })))
    }

    pub fn initialize(config: RelayConfig) -> Result<Self, ToolError> {
        let logger = Logger::new("graph_relay");
        let client = build_client()?;

        let timeouts = config.timeouts;
        let managed_identity: Arc<dyn FederatedAssertionProvider> = Arc::new(
            ManagedIdentityAssertionProvider::with_client(
                logger.clone(),
                client.clone(),
                config.identity.clone(),
            )
            .with_timeout_ms(timeouts.assertion_ms),
        );
        let assertions: Arc<dyn FederatedAssertionProvider> = if config.assertion_cache {
            Arc::new(CachedAssertionProvider::new(logger.clone(), managed_identity))
        } else {
            managed_identity
        };

        let exchanger =
            ObOExchanger::with_client(logger.clone(), client.clone(), &config, assertions)
                .with_timeout_ms(timeouts.exchange_ms);
        let downstream = DownstreamClient::with_client(logger.clone(), client)
            .with_timeout_ms(timeouts.downstream_ms);
        let shaper = ResponseShaper::new(config.consent_url());
        let user_manager = Arc::new(UserManager::new(
            logger.clone(),
            exchanger,
            downstream,
            shaper,
            config.me_endpoint(),
        ));

        let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
        handlers.insert(
            GET_CURRENT_USER.to_string(),
            Arc::new(UserTool::new(user_manager.clone(), UserToolFormat::Json)),
        );
        handlers.insert(
            GET_USER_INFO.to_string(),
            Arc::new(UserTool::new(user_manager, UserToolFormat::Text)),
        );
        Self::validate_tool_wiring(&handlers)?;

        let missing = config.credentials.missing();
        if !missing.is_empty() {
            logger.warn(
                "OBO credentials are incomplete; user tools will report missing configuration",
                Some(&serde_json::json!({ "missing": missing })),
            );
        }
        logger.debug(
            "relay configured",
            Some(&serde_json::json!({
                "identity_source": config.identity.name(),
                "assertion_cache": config.assertion_cache,
                "port": config.port,
                "timeouts_ms": {
                    "assertion": timeouts.assertion_ms,
                    "exchange": timeouts.exchange_ms,
                    "downstream": timeouts.downstream_ms,
                },
            })),
        );

        let deadline_ms = timeouts.total_ms() + network::TOOL_DEADLINE_SLACK_MS;
        let tool_executor =
            Arc::new(ToolExecutor::new(logger.clone(), handlers).with_deadline_ms(deadline_ms));
        Ok(Self {
            logger,
            tool_executor,
        })
    }
}
