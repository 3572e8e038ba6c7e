use crate::app::App;
use crate::config::RelayConfig;
use crate::constants::{limits, network};
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::catalog::{normalize_args, tool_by_name, tool_catalog, validate_tool_args};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::services::request_context::InboundRequest;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "get-user";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": tool_catalog() })
    }

    async fn handle_tools_call(
        &self,
        ctx: &InboundRequest,
        params: &Value,
    ) -> Result<Value, McpError> {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        if name.is_empty() {
            return Err(McpError::new(ErrorCode::InvalidParams, "Missing tool name"));
        }
        if tool_by_name(name).is_none() || !self.app.tool_executor.has_tool(name) {
            return Err(self.app.tool_executor.unknown_tool(name).into());
        }

        let args = normalize_args(params.get("arguments").cloned());
        validate_tool_args(name, &args)?;

        let payload = self.app.tool_executor.execute(name, ctx, args).await?;
        let text = match payload.get("result") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => serde_json::to_string(other).unwrap_or_else(|_| "{}".to_string()),
            None => String::new(),
        };
        Ok(serde_json::json!({
            "content": [ { "type": "text", "text": text } ],
            "isError": false,
            "_meta": payload.get("meta").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Dispatches one JSON-RPC message. `None` means the message was a
    /// notification and gets no response body.
    pub async fn handle_message(
        &self,
        ctx: &InboundRequest,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                request.id.unwrap_or(Value::Null),
                ErrorCode::InvalidRequest.as_i32(),
                "Invalid request".to_string(),
            ));
        }
        if request.is_notification() {
            self.app.logger.debug(
                "notification received",
                Some(&serde_json::json!({ "method": request.method })),
            );
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => match self.handle_tools_call(ctx, &request.params).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::from_error(id, err),
            },
            method if method.starts_with("notifications/") => {
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            _ => JsonRpcResponse::failure(
                id,
                ErrorCode::MethodNotFound.as_i32(),
                "Method not found".to_string(),
            ),
        };
        Some(response)
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(network::MCP_PATH, post(handle_http))
            .layer(DefaultBodyLimit::max(limits::MAX_BODY_BYTES))
            .with_state(self)
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), ToolError> {
        let logger = self.app.logger.child("http");
        if let Ok(addr) = listener.local_addr() {
            logger.info(
                "Starting MCP get_user server",
                Some(&serde_json::json!({ "addr": addr.to_string(), "path": network::MCP_PATH })),
            );
        }
        axum::serve(listener, self.router())
            .await
            .map_err(|err| ToolError::internal(format!("HTTP server failed: {}", err)))
    }
}

fn parse_failure(code: ErrorCode, message: &str) -> Response {
    let response = JsonRpcResponse::failure(Value::Null, code.as_i32(), message.to_string());
    (StatusCode::BAD_REQUEST, Json(response)).into_response()
}

async fn handle_http(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = InboundRequest::capture(&headers);

    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => return parse_failure(ErrorCode::ParseError, "Parse error"),
    };
    let request: JsonRpcRequest = match serde_json::from_value(parsed) {
        Ok(req) => req,
        Err(_) => return parse_failure(ErrorCode::InvalidRequest, "Invalid request"),
    };

    match server.handle_message(&ctx, request).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Binds `{bind_host}:{port}` from the config and serves until the process
/// stops.
pub async fn run_http(config: RelayConfig) -> Result<(), ToolError> {
    let addr = format!("{}:{}", config.bind_host, config.port);
    let app = App::initialize(config)?;
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|err| ToolError::internal(format!("Failed to bind {}: {}", addr, err)))?;
    Arc::new(McpServer::new(app)).serve(listener).await
}
