use crate::constants::auth::BEARER_PREFIX;
use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;

/// Headers of the HTTP request that carried one tool invocation.
///
/// Built by the transport for every request and handed down by reference.
/// It is never stored anywhere that outlives the invocation.
#[derive(Clone, Default)]
pub struct InboundRequest {
    headers: HashMap<String, String>,
}

impl InboundRequest {
    /// Captures the headers of an HTTP request. Names are lowercased; for
    /// repeated headers the first value wins; non-UTF-8 values are skipped.
    pub fn capture(headers: &HeaderMap) -> Self {
        let mut out = HashMap::new();
        for (name, value) in headers.iter() {
            let Ok(text) = value.to_str() else {
                continue;
            };
            out.entry(name.as_str().to_lowercase())
                .or_insert_with(|| text.to_string());
        }
        Self { headers: out }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut out = HashMap::new();
        for (name, value) in pairs {
            out.entry(name.trim().to_lowercase())
                .or_insert_with(|| value.to_string());
        }
        Self { headers: out }
    }

    /// Used by transports that carry no HTTP headers.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.trim().to_lowercase())
            .map(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn header_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.headers.keys().cloned().collect();
        names.sort();
        names
    }

    /// The caller's bearer token; `None` is the normal unauthenticated case.
    pub fn bearer_token(&self) -> Option<BearerToken> {
        let raw = self.header("authorization")?.trim_start();
        let prefix = raw.get(..BEARER_PREFIX.len())?;
        if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
            return None;
        }
        let token = raw[BEARER_PREFIX.len()..].trim();
        if token.is_empty() {
            return None;
        }
        Some(BearerToken(SecretString::new(token.into())))
    }
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("headers", &self.header_names())
            .finish()
    }
}

/// The calling user's access token, as presented to this service.
#[derive(Clone, Debug)]
pub struct BearerToken(SecretString);

impl BearerToken {
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}
