use crate::config::{FederatedCredentialConfig, ManagedIdentitySource};
use crate::constants::{cache, identity, network};
use crate::errors::{RelayError, ToolError};
use crate::services::http::{build_client, clip_detail, fetch, FetchError, Fetched};
use crate::services::logger::Logger;
use crate::services::token_response::{parse_issued_token, ProviderError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Workload identity token presented as the client assertion of the OBO
/// exchange.
#[derive(Debug, Clone)]
pub struct AssertionToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl AssertionToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        let value: String = value.into();
        Self {
            value: SecretString::new(value.into()),
            expires_at,
        }
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Still usable at `now` with at least `margin` left.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }
}

#[async_trait]
pub trait FederatedAssertionProvider: Send + Sync {
    /// Fails with `ConfigMissing` before any I/O when the credential
    /// configuration is incomplete.
    async fn get_assertion(
        &self,
        config: &FederatedCredentialConfig,
    ) -> Result<AssertionToken, RelayError>;
}

/// Fetches assertions from the App Service identity endpoint or IMDS.
#[derive(Clone)]
pub struct ManagedIdentityAssertionProvider {
    logger: Logger,
    client: Client,
    source: ManagedIdentitySource,
    timeout_ms: u64,
}

impl ManagedIdentityAssertionProvider {
    pub fn new(logger: Logger, source: ManagedIdentitySource) -> Result<Self, ToolError> {
        Ok(Self::with_client(logger, build_client()?, source))
    }

    pub fn with_client(logger: Logger, client: Client, source: ManagedIdentitySource) -> Self {
        Self {
            logger: logger.child("assertion"),
            client,
            source,
            timeout_ms: network::TIMEOUT_ASSERTION_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn request_url(&self, audience: &str, client_id: &str) -> Result<Url, RelayError> {
        let (endpoint, api_version) = match &self.source {
            ManagedIdentitySource::AppService { endpoint, .. } => {
                (endpoint.as_str(), identity::APP_SERVICE_API_VERSION)
            }
            ManagedIdentitySource::Imds { endpoint } => {
                (endpoint.as_str(), identity::IMDS_API_VERSION)
            }
        };
        let mut url = Url::parse(endpoint).map_err(|err| RelayError::IdentityProvider {
            status: None,
            detail: format!("invalid identity endpoint: {}", err),
        })?;
        url.query_pairs_mut()
            .append_pair("api-version", api_version)
            .append_pair("resource", audience)
            .append_pair("client_id", client_id);
        Ok(url)
    }
}

#[async_trait]
impl FederatedAssertionProvider for ManagedIdentityAssertionProvider {
    async fn get_assertion(
        &self,
        config: &FederatedCredentialConfig,
    ) -> Result<AssertionToken, RelayError> {
        let creds = config.require()?;
        let url = self.request_url(creds.audience, creds.federated_client_id)?;

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/json");
        request = match &self.source {
            ManagedIdentitySource::AppService { header, .. } => {
                request.header(identity::APP_SERVICE_HEADER, header.expose_secret())
            }
            ManagedIdentitySource::Imds { .. } => request.header("Metadata", "true"),
        };

        self.logger.debug(
            "requesting assertion",
            Some(&serde_json::json!({
                "source": self.source.name(),
                "scope": creds.assertion_scope(),
            })),
        );

        let Fetched { status, body } =
            fetch(request, self.timeout_ms)
                .await
                .map_err(|err| RelayError::IdentityProvider {
                    status: None,
                    detail: match err {
                        FetchError::TimedOut { .. } => format!("request {}", err),
                        FetchError::Transport(_) => format!("request failed: {}", err),
                    },
                })?;
        if !status.is_success() {
            let detail = ProviderError::parse(&body)
                .summary()
                .unwrap_or_else(|| clip_detail(&body));
            self.logger.warn(
                "assertion request rejected",
                Some(&serde_json::json!({ "status": status.as_u16() })),
            );
            return Err(RelayError::IdentityProvider {
                status: Some(status.as_u16()),
                detail,
            });
        }

        let issued =
            parse_issued_token(&body, Utc::now()).map_err(|detail| RelayError::IdentityProvider {
                status: Some(status.as_u16()),
                detail,
            })?;
        Ok(AssertionToken {
            value: issued.value,
            expires_at: issued.expires_at,
        })
    }
}

/// Process-wide assertion cache keyed by scope. A cached token is served only
/// while it has more than the refresh margin left; refreshes are serialized so
/// concurrent callers share one fetch.
pub struct CachedAssertionProvider {
    inner: Arc<dyn FederatedAssertionProvider>,
    slots: Mutex<HashMap<String, AssertionToken>>,
    margin: Duration,
    logger: Logger,
}

impl CachedAssertionProvider {
    pub fn new(logger: Logger, inner: Arc<dyn FederatedAssertionProvider>) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
            margin: Duration::seconds(cache::ASSERTION_REFRESH_MARGIN_SECS),
            logger: logger.child("assertion_cache"),
        }
    }
}

#[async_trait]
impl FederatedAssertionProvider for CachedAssertionProvider {
    async fn get_assertion(
        &self,
        config: &FederatedCredentialConfig,
    ) -> Result<AssertionToken, RelayError> {
        let scope = config.require()?.assertion_scope();
        let mut slots = self.slots.lock().await;
        if let Some(token) = slots.get(&scope) {
            if token.is_fresh(Utc::now(), self.margin) {
                self.logger.debug("assertion cache hit", None);
                return Ok(token.clone());
            }
            slots.remove(&scope);
        }

        let token = self.inner.get_assertion(config).await?;
        if token.is_fresh(Utc::now(), self.margin) {
            slots.insert(scope, token.clone());
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        ttl: Duration,
    }

    #[async_trait]
    impl FederatedAssertionProvider for CountingProvider {
        async fn get_assertion(
            &self,
            config: &FederatedCredentialConfig,
        ) -> Result<AssertionToken, RelayError> {
            config.require()?;
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::task::yield_now().await;
            Ok(AssertionToken::new(
                format!("assertion-{}", n),
                Utc::now() + self.ttl,
            ))
        }
    }

    fn complete_config() -> FederatedCredentialConfig {
        FederatedCredentialConfig {
            token_exchange_audience: "api://AzureADTokenExchange".to_string(),
            federated_client_id: Some("mi".to_string()),
            client_id: Some("client".to_string()),
            tenant_id: Some("tenant".to_string()),
        }
    }

    #[test]
    fn freshness_honors_margin() {
        let now = Utc::now();
        let token = AssertionToken::new("t", now + Duration::seconds(90));
        assert!(token.is_fresh(now, Duration::seconds(60)));
        assert!(!token.is_fresh(now, Duration::seconds(120)));
        assert!(!format!("{:?}", token).contains("\"t\""));
    }

    #[tokio::test]
    async fn cache_reuses_fresh_assertion() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            ttl: Duration::seconds(3600),
        });
        let cached = CachedAssertionProvider::new(Logger::new("test"), inner.clone());
        let config = complete_config();
        let first = cached.get_assertion(&config).await.expect("first");
        let second = cached.get_assertion(&config).await.expect("second");
        assert_eq!(first.expose(), second.expose());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_never_serves_token_inside_margin() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            ttl: Duration::seconds(30),
        });
        let cached = CachedAssertionProvider::new(Logger::new("test"), inner.clone());
        let config = complete_config();
        let first = cached.get_assertion(&config).await.expect("first");
        let second = cached.get_assertion(&config).await.expect("second");
        assert_ne!(first.expose(), second.expose());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_refresh_is_single_flight() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            ttl: Duration::seconds(3600),
        });
        let cached = Arc::new(CachedAssertionProvider::new(
            Logger::new("test"),
            inner.clone(),
        ));
        let config = complete_config();
        let (a, b) = tokio::join!(cached.get_assertion(&config), cached.get_assertion(&config));
        assert_eq!(a.expect("a").expose(), b.expect("b").expose());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn incomplete_config_fails_before_fetching() {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            ttl: Duration::seconds(3600),
        });
        let cached = CachedAssertionProvider::new(Logger::new("test"), inner.clone());
        let mut config = complete_config();
        config.tenant_id = None;
        let err = cached.get_assertion(&config).await.expect_err("missing");
        assert!(matches!(err, RelayError::ConfigMissing { .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }
}
