pub mod assertion;
pub mod graph_client;
pub mod http;
pub mod logger;
pub mod obo;
pub mod request_context;
pub mod response_shaper;
pub mod token_response;
pub mod tool_executor;
