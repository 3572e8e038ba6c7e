use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::request_context::InboundRequest;
use crate::utils::suggest::suggest;

use serde_json::Value;

/// A callable tool. `ctx` belongs to the HTTP request that carried this call
/// and must not be retained past it.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, ctx: &InboundRequest, args: Value) -> Result<Value, ToolError>;
}

#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    handlers: Arc<HashMap<String, Arc<dyn ToolHandler>>>,
    deadline_ms: Option<u64>,
}

impl ToolExecutor {
    pub fn new(logger: Logger, handlers: HashMap<String, Arc<dyn ToolHandler>>) -> Self {
        Self {
            logger: logger.child("executor"),
            handlers: Arc::new(handlers),
            deadline_ms: None,
        }
    }

    /// Caps the wall time of every call. A handler still running at the
    /// deadline is dropped and the call fails with `TIMEOUT`.
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    async fn run(
        &self,
        tool: &str,
        handler: &dyn ToolHandler,
        ctx: &InboundRequest,
        args: Value,
    ) -> Result<Value, ToolError> {
        let Some(deadline_ms) = self.deadline_ms else {
            return handler.handle(ctx, args).await;
        };
        tokio::time::timeout(
            std::time::Duration::from_millis(deadline_ms),
            handler.handle(ctx, args),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ToolError::timeout(format!(
                "Tool {} did not finish within {} ms",
                tool, deadline_ms
            ))
            .with_hint("Retry the call"))
        })
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.handlers.contains_key(tool)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn unknown_tool(&self, tool: &str) -> ToolError {
        let suggestions = suggest(tool, &self.tool_names(), 3);
        let hint = if suggestions.is_empty() {
            "Call tools/list to see available tools".to_string()
        } else {
            format!("Did you mean: {}", suggestions.join(", "))
        };
        ToolError::not_found(format!("Unknown tool: {}", tool)).with_hint(hint)
    }

    /// Runs one tool call. The payload is `{ok, result, meta}` where `meta`
    /// carries the trace identifiers and duration.
    pub async fn execute(
        &self,
        tool: &str,
        ctx: &InboundRequest,
        args: Value,
    ) -> Result<Value, ToolError> {
        let started_at = chrono::Utc::now().timestamp_millis();
        let Some(handler) = self.handlers.get(tool) else {
            return Err(self.unknown_tool(tool));
        };
        let trace_id = uuid::Uuid::new_v4().to_string();
        let span_id = uuid::Uuid::new_v4().to_string();

        let logger = self.logger.child(tool);
        logger.debug(
            "tool call started",
            Some(&serde_json::json!({
                "trace_id": trace_id,
                "header_names": ctx.header_names(),
            })),
        );

        let outcome = self.run(tool, handler.as_ref(), ctx, args).await;
        let duration_ms = chrono::Utc::now().timestamp_millis() - started_at;
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                logger.warn(
                    "tool call rejected",
                    Some(&serde_json::json!({
                        "trace_id": trace_id,
                        "code": err.code,
                        "duration_ms": duration_ms,
                    })),
                );
                return Err(err);
            }
        };

        logger.info(
            "tool call finished",
            Some(&serde_json::json!({
                "trace_id": trace_id,
                "duration_ms": duration_ms,
            })),
        );

        Ok(serde_json::json!({
            "ok": true,
            "result": result,
            "meta": {
                "tool": tool,
                "trace_id": trace_id,
                "span_id": span_id,
                "duration_ms": duration_ms,
            },
        }))
    }
}
