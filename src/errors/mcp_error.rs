use crate::errors::{ToolError, ToolErrorKind};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    RequestTimeout = -32001,
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for McpError {}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match err.kind {
            ToolErrorKind::InvalidParams | ToolErrorKind::NotFound => ErrorCode::InvalidParams,
            ToolErrorKind::Timeout => ErrorCode::RequestTimeout,
            ToolErrorKind::Internal => ErrorCode::InternalError,
        };
        let mut data = serde_json::json!({
            "code": err.code,
            "retryable": err.retryable,
        });
        if let Some(obj) = data.as_object_mut() {
            if let Some(hint) = err.hint {
                obj.insert("hint".to_string(), Value::String(hint));
            }
            if let Some(details) = err.details {
                obj.insert("details".to_string(), details);
            }
        }
        McpError::new(code, err.message).with_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_maps_to_invalid_params_with_hint() {
        let err: McpError = ToolError::not_found("Unknown tool: get_forecast")
            .with_hint("Call tools/list to see available tools")
            .into();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert_eq!(err.message, "Unknown tool: get_forecast");
        let data = err.data.expect("data");
        assert_eq!(data["code"], "NOT_FOUND");
        assert_eq!(data["hint"], "Call tools/list to see available tools");
    }

    #[test]
    fn timeouts_keep_their_own_code() {
        let err: McpError = ToolError::timeout("slow").into();
        assert_eq!(err.code.as_i32(), -32001);
    }
}
