use crate::constants::{auth, graph, identity, network};
use crate::errors::{RelayError, ToolError};
use crate::utils::feature_flags::is_truthy;
use secrecy::SecretString;

pub const ENV_TOKEN_EXCHANGE_AUDIENCE: &str = "TokenExchangeAudience";
pub const ENV_FEDERATED_CLIENT_ID: &str = "OVERRIDE_USE_MI_FIC_ASSERTION_CLIENTID";
pub const ENV_CLIENT_ID: &str = "WEBSITE_AUTH_CLIENT_ID";
pub const ENV_TENANT_ID: &str = "WEBSITE_AUTH_AAD_ALLOWED_TENANTS";
pub const ENV_WEBSITE_HOSTNAME: &str = "WEBSITE_HOSTNAME";
pub const ENV_PORT: &str = "FUNCTIONS_CUSTOMHANDLER_PORT";
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
pub const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";
pub const ENV_IMDS_ENDPOINT: &str = "IMDS_ENDPOINT";
pub const ENV_GRAPH_API_BASE: &str = "GRAPH_API_BASE";
pub const ENV_ASSERTION_CACHE: &str = "OBO_ASSERTION_CACHE";
pub const ENV_ASSERTION_TIMEOUT_MS: &str = "OBO_ASSERTION_TIMEOUT_MS";
pub const ENV_EXCHANGE_TIMEOUT_MS: &str = "OBO_EXCHANGE_TIMEOUT_MS";
pub const ENV_GRAPH_TIMEOUT_MS: &str = "GRAPH_API_TIMEOUT_MS";

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    what: &str,
) -> Result<Option<T>, ToolError> {
    match non_blank(lookup(key)) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            ToolError::invalid_params(format!("{} must be {}", key, what))
                .with_details(serde_json::json!({ "value": raw }))
        }),
    }
}

fn parse_timeout(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_ms: u64,
) -> Result<u64, ToolError> {
    match parse_number::<u64>(lookup, key, "a positive number of milliseconds")? {
        Some(0) => Err(ToolError::invalid_params(format!(
            "{} must be a positive number of milliseconds",
            key
        ))),
        Some(ms) => Ok(ms),
        None => Ok(default_ms),
    }
}

fn trim_base(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

/// Identity material for the assertion and the exchange. Read once at
/// startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedCredentialConfig {
    pub token_exchange_audience: String,
    pub federated_client_id: Option<String>,
    pub client_id: Option<String>,
    pub tenant_id: Option<String>,
}

/// Borrowed view of a config that passed [`FederatedCredentialConfig::require`].
#[derive(Debug, Clone, Copy)]
pub struct CompleteCredentials<'a> {
    pub audience: &'a str,
    pub federated_client_id: &'a str,
    pub client_id: &'a str,
    pub tenant_id: &'a str,
}

impl CompleteCredentials<'_> {
    pub fn assertion_scope(&self) -> String {
        format!("{}{}", self.audience, auth::SCOPE_SUFFIX)
    }
}

impl FederatedCredentialConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            token_exchange_audience: non_blank(lookup(ENV_TOKEN_EXCHANGE_AUDIENCE))
                .unwrap_or_else(|| auth::DEFAULT_TOKEN_EXCHANGE_AUDIENCE.to_string()),
            federated_client_id: non_blank(lookup(ENV_FEDERATED_CLIENT_ID)),
            client_id: non_blank(lookup(ENV_CLIENT_ID)),
            tenant_id: non_blank(lookup(ENV_TENANT_ID)),
        }
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.federated_client_id.is_none() {
            missing.push(ENV_FEDERATED_CLIENT_ID);
        }
        if self.client_id.is_none() {
            missing.push(ENV_CLIENT_ID);
        }
        if self.tenant_id.is_none() {
            missing.push(ENV_TENANT_ID);
        }
        missing
    }

    pub fn require(&self) -> Result<CompleteCredentials<'_>, RelayError> {
        match (
            self.federated_client_id.as_deref(),
            self.client_id.as_deref(),
            self.tenant_id.as_deref(),
        ) {
            (Some(federated_client_id), Some(client_id), Some(tenant_id)) => {
                Ok(CompleteCredentials {
                    audience: &self.token_exchange_audience,
                    federated_client_id,
                    client_id,
                    tenant_id,
                })
            }
            _ => Err(RelayError::ConfigMissing {
                missing: self.missing(),
            }),
        }
    }
}

/// Where the workload identity assertion is fetched from.
#[derive(Debug, Clone)]
pub enum ManagedIdentitySource {
    AppService {
        endpoint: String,
        header: SecretString,
    },
    Imds {
        endpoint: String,
    },
}

impl ManagedIdentitySource {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        match (
            non_blank(lookup(ENV_IDENTITY_ENDPOINT)),
            non_blank(lookup(ENV_IDENTITY_HEADER)),
        ) {
            (Some(endpoint), Some(header)) => ManagedIdentitySource::AppService {
                endpoint,
                header: SecretString::new(header.into()),
            },
            _ => {
                let host = non_blank(lookup(ENV_IMDS_ENDPOINT))
                    .map(|v| trim_base(&v))
                    .unwrap_or_else(|| identity::IMDS_HOST.to_string());
                ManagedIdentitySource::Imds {
                    endpoint: format!("{}{}", host, identity::IMDS_TOKEN_PATH),
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ManagedIdentitySource::AppService { .. } => "app_service",
            ManagedIdentitySource::Imds { .. } => "imds",
        }
    }
}

/// Per-stage bound on one outbound call, covering send and body read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub assertion_ms: u64,
    pub exchange_ms: u64,
    pub downstream_ms: u64,
}

impl StageTimeouts {
    /// Upper bound for a whole invocation: every stage at its limit.
    pub fn total_ms(&self) -> u64 {
        self.assertion_ms + self.exchange_ms + self.downstream_ms
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            assertion_ms: network::TIMEOUT_ASSERTION_MS,
            exchange_ms: network::TIMEOUT_EXCHANGE_MS,
            downstream_ms: network::TIMEOUT_API_REQUEST_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub credentials: FederatedCredentialConfig,
    pub website_hostname: String,
    pub bind_host: String,
    pub port: u16,
    pub authority_host: String,
    pub graph_base: String,
    pub downstream_scope: String,
    pub identity: ManagedIdentitySource,
    pub assertion_cache: bool,
    pub timeouts: StageTimeouts,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ToolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ToolError> {
        let port = parse_number::<u16>(&lookup, ENV_PORT, "a port number")?
            .unwrap_or(network::DEFAULT_PORT);
        let defaults = StageTimeouts::default();
        let timeouts = StageTimeouts {
            assertion_ms: parse_timeout(&lookup, ENV_ASSERTION_TIMEOUT_MS, defaults.assertion_ms)?,
            exchange_ms: parse_timeout(&lookup, ENV_EXCHANGE_TIMEOUT_MS, defaults.exchange_ms)?,
            downstream_ms: parse_timeout(&lookup, ENV_GRAPH_TIMEOUT_MS, defaults.downstream_ms)?,
        };
        Ok(Self {
            credentials: FederatedCredentialConfig::from_lookup(&lookup),
            website_hostname: non_blank(lookup(ENV_WEBSITE_HOSTNAME))
                .unwrap_or_else(|| auth::DEFAULT_WEBSITE_HOSTNAME.to_string()),
            bind_host: network::DEFAULT_BIND_HOST.to_string(),
            port,
            authority_host: non_blank(lookup(ENV_AUTHORITY_HOST))
                .map(|v| trim_base(&v))
                .unwrap_or_else(|| auth::DEFAULT_AUTHORITY_HOST.to_string()),
            graph_base: non_blank(lookup(ENV_GRAPH_API_BASE))
                .map(|v| trim_base(&v))
                .unwrap_or_else(|| graph::DEFAULT_BASE.to_string()),
            downstream_scope: graph::DEFAULT_SCOPE.to_string(),
            identity: ManagedIdentitySource::from_lookup(&lookup),
            assertion_cache: lookup(ENV_ASSERTION_CACHE)
                .map(is_truthy)
                .unwrap_or(false),
            timeouts,
        })
    }

    pub fn consent_url(&self) -> String {
        consent_url(&self.website_hostname)
    }

    pub fn token_endpoint(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id)
    }

    pub fn me_endpoint(&self) -> String {
        format!("{}{}", self.graph_base, graph::ME_PATH)
    }
}

pub fn consent_url(hostname: &str) -> String {
    format!(
        "https://{host}/.auth/login/aad?post_login_redirect_uri=https://{host}/",
        host = hostname
    )
}
