pub mod network {
    pub const DEFAULT_PORT: u16 = 8000;
    pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
    pub const MCP_PATH: &str = "/mcp";
    pub const TIMEOUT_ASSERTION_MS: u64 = 10_000;
    pub const TIMEOUT_EXCHANGE_MS: u64 = 15_000;
    pub const TIMEOUT_API_REQUEST_MS: u64 = 30_000;
    pub const TIMEOUT_CONNECTION_MS: u64 = 5_000;
    /// Added on top of the summed stage timeouts to bound one tool call.
    pub const TOOL_DEADLINE_SLACK_MS: u64 = 5_000;
    pub const USER_AGENT: &str = "graph-relay/0.3";
}

pub mod auth {
    pub const DEFAULT_TOKEN_EXCHANGE_AUDIENCE: &str = "api://AzureADTokenExchange";
    pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
    pub const DEFAULT_WEBSITE_HOSTNAME: &str = "your-function-app-hostname";
    pub const BEARER_PREFIX: &str = "bearer ";
    pub const SCOPE_SUFFIX: &str = "/.default";
    pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
    pub const JWT_CLIENT_ASSERTION_TYPE: &str =
        "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
    pub const REQUESTED_TOKEN_USE: &str = "on_behalf_of";
}

pub mod identity {
    pub const IMDS_HOST: &str = "http://169.254.169.254";
    pub const IMDS_TOKEN_PATH: &str = "/metadata/identity/oauth2/token";
    pub const IMDS_API_VERSION: &str = "2018-02-01";
    pub const APP_SERVICE_API_VERSION: &str = "2019-08-01";
    pub const APP_SERVICE_HEADER: &str = "X-IDENTITY-HEADER";
    pub const DEFAULT_ASSERTION_TTL_SECS: i64 = 300;
}

pub mod graph {
    pub const DEFAULT_BASE: &str = "https://graph.microsoft.com";
    pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";
    pub const ME_PATH: &str = "/v1.0/me";
}

pub mod cache {
    /// Cached assertions are refreshed this long before they expire.
    pub const ASSERTION_REFRESH_MARGIN_SECS: i64 = 60;
}

pub mod masking {
    pub const MASK: &str = "[MASKED]";
    pub const MASKED_SCALAR_FIELDS: &[&str] = &["id"];
    pub const MASKED_LIST_FIELDS: &[&str] = &["businessPhones"];
}

pub mod limits {
    pub const MAX_ERROR_DETAIL: usize = 2_048;
    pub const MAX_BODY_BYTES: usize = 1024 * 1024;
}
