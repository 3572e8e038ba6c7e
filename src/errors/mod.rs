mod mcp_error;
mod relay_error;
mod tool_error;

pub use mcp_error::{ErrorCode, McpError};
pub use relay_error::{RelayError, RelayErrorKind, Stage};
pub use tool_error::{ToolError, ToolErrorKind};
