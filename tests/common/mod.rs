#![allow(dead_code)]

use graph_relay::app::App;
use graph_relay::config::RelayConfig;
use graph_relay::mcp::protocol::JsonRpcRequest;
use graph_relay::mcp::server::McpServer;
use graph_relay::services::request_context::InboundRequest;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const HOSTNAME: &str = "relay.example.net";
pub const FEDERATED_CLIENT_ID: &str = "mi-client-id";
pub const CLIENT_ID: &str = "app-client-id";
pub const TENANT_ID: &str = "tenant-id";
pub const IDENTITY_HEADER: &str = "test-identity-header";
pub const ASSERTION: &str = "fed-xyz";

pub fn consent_url() -> String {
    format!(
        "https://{host}/.auth/login/aad?post_login_redirect_uri=https://{host}/",
        host = HOSTNAME
    )
}

pub fn jane_profile() -> Value {
    json!({
        "displayName": "Jane Doe",
        "mail": "jane@x.com",
        "id": "999",
        "businessPhones": ["555-1111"],
    })
}

/// Stub servers for the managed identity endpoint, the authority and Graph.
pub struct Stubs {
    pub identity: MockServer,
    pub authority: MockServer,
    pub graph: MockServer,
}

impl Stubs {
    pub async fn start() -> Self {
        Self {
            identity: MockServer::start().await,
            authority: MockServer::start().await,
            graph: MockServer::start().await,
        }
    }

    pub fn env(&self) -> HashMap<String, String> {
        HashMap::from([
            ("OVERRIDE_USE_MI_FIC_ASSERTION_CLIENTID".to_string(), FEDERATED_CLIENT_ID.to_string()),
            ("WEBSITE_AUTH_CLIENT_ID".to_string(), CLIENT_ID.to_string()),
            ("WEBSITE_AUTH_AAD_ALLOWED_TENANTS".to_string(), TENANT_ID.to_string()),
            ("WEBSITE_HOSTNAME".to_string(), HOSTNAME.to_string()),
            ("IDENTITY_ENDPOINT".to_string(), format!("{}/msi/token", self.identity.uri())),
            ("IDENTITY_HEADER".to_string(), IDENTITY_HEADER.to_string()),
            ("AZURE_AUTHORITY_HOST".to_string(), self.authority.uri()),
            ("GRAPH_API_BASE".to_string(), self.graph.uri()),
        ])
    }

    pub fn config(&self) -> RelayConfig {
        config_from(self.env())
    }

    pub fn config_without(&self, keys: &[&str]) -> RelayConfig {
        let mut env = self.env();
        for key in keys {
            env.remove(*key);
        }
        config_from(env)
    }

    pub async fn mount_assertion(&self, expected_calls: u64) {
        let expires_on = (chrono::Utc::now().timestamp() + 3600).to_string();
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(header("X-IDENTITY-HEADER", IDENTITY_HEADER))
            .and(query_param("resource", "api://AzureADTokenExchange"))
            .and(query_param("client_id", FEDERATED_CLIENT_ID))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": ASSERTION,
                "expires_on": expires_on,
                "resource": "api://AzureADTokenExchange",
                "token_type": "Bearer",
            })))
            .expect(expected_calls)
            .mount(&self.identity)
            .await;
    }

    /// OBO exchange answering `graph_token` for the given user bearer.
    pub async fn mount_exchange(&self, bearer: &str, graph_token: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/oauth2/v2.0/token", TENANT_ID)))
            .and(body_string_contains(format!("&assertion={}&", bearer)))
            .and(body_string_contains(format!("client_assertion={}", ASSERTION)))
            .and(body_string_contains(format!("client_id={}", CLIENT_ID)))
            .and(body_string_contains("requested_token_use=on_behalf_of"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fgraph.microsoft.com%2F.default",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "access_token": graph_token,
                "expires_in": 3599,
            })))
            .expect(expected_calls)
            .mount(&self.authority)
            .await;
    }

    pub async fn mount_exchange_failure(&self, status: u16, body: Value, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/oauth2/v2.0/token", TENANT_ID)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(expected_calls)
            .mount(&self.authority)
            .await;
    }

    pub async fn mount_profile(&self, graph_token: &str, profile: Value, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .and(header("Authorization", format!("Bearer {}", graph_token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile))
            .expect(expected_calls)
            .mount(&self.graph)
            .await;
    }

    pub async fn mount_profile_status(&self, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(1)
            .mount(&self.graph)
            .await;
    }

    /// Fails the test on drop if any stub is hit.
    pub async fn forbid_network(&self) {
        for server in [&self.identity, &self.authority, &self.graph] {
            Mock::given(wiremock::matchers::any())
                .respond_with(ResponseTemplate::new(500))
                .expect(0)
                .mount(server)
                .await;
        }
    }

    /// Stub environment with `overrides` applied; an empty value removes the key.
    pub fn config_with(&self, overrides: &[(&str, &str)]) -> RelayConfig {
        let mut env = self.env();
        for (key, value) in overrides {
            if value.is_empty() {
                env.remove(*key);
            } else {
                env.insert(key.to_string(), value.to_string());
            }
        }
        config_from(env)
    }
}

/// Answers every connection with headers and part of the declared body, then
/// never sends the rest. Returns the base URL.
pub async fn stalled_body_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"access_token\":",
                    )
                    .await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    format!("http://{}", addr)
}

pub fn config_from(env: HashMap<String, String>) -> RelayConfig {
    RelayConfig::from_lookup(move |key| env.get(key).cloned()).expect("config")
}

pub fn server(config: RelayConfig) -> McpServer {
    McpServer::new(App::initialize(config).expect("app"))
}

pub fn bearer(token: &str) -> InboundRequest {
    let value = format!("Bearer {}", token);
    InboundRequest::from_pairs([
        ("host", HOSTNAME),
        ("content-type", "application/json"),
        ("authorization", value.as_str()),
    ])
}

/// Calls a tool through JSON-RPC dispatch and returns its text content.
pub async fn call_tool(server: &McpServer, tool: &str, ctx: &InboundRequest) -> String {
    let request: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": tool, "arguments": {}},
    }))
    .expect("request");
    let response = server.handle_message(ctx, request).await.expect("response");
    assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
    let result = response.result.expect("result");
    result["content"][0]["text"]
        .as_str()
        .expect("text content")
        .to_string()
}

pub async fn current_user(server: &McpServer, ctx: &InboundRequest) -> Value {
    let text = call_tool(server, "get_current_user", ctx).await;
    serde_json::from_str(&text).expect("canonical json")
}
