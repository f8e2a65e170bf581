//! HTTP access to the authorization server.
//!
//! The flow talks to the token, introspection and key endpoints through the
//! [`Transport`] trait. [`ReqwestTransport`] is the production implementation;
//! it works natively and in the browser (where reqwest uses `fetch`).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Error types for HTTP operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response (DNS, TLS, CORS, timeout...)
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The server answered with a non-2xx status
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The body could not be decoded into the expected shape
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fails with [`TransportError::Status`] unless the status is 2xx.
    pub fn error_for_status(self, url: &str) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            tracing::error!("HTTP {} from {}", self.status, url);
            Err(TransportError::Status {
                url: url.to_string(),
                status: self.status,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self, url: &str) -> Result<T, TransportError> {
        serde_json::from_str(&self.body).map_err(|e| TransportError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Network access used by the flow.
///
/// Requests are issued one at a time and never retried here.
#[async_trait(?Send)]
pub trait Transport {
    /// POSTs `params` as `application/x-www-form-urlencoded`.
    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError>;

    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a preconfigured client (proxies, headers, ...).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Creates a transport whose requests fail after `timeout`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    async fn read(
        url: &str,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<HttpResponse, TransportError> {
        let request_failed = |e: reqwest::Error| TransportError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = result.map_err(request_failed)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(request_failed)?;
        tracing::trace!("HTTP {} from {}", status, url);

        Ok(HttpResponse { status, body })
    }
}

#[async_trait(?Send)]
impl Transport for ReqwestTransport {
    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let result = self.client.post(url).form(params).send().await;
        Self::read(url, result).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let result = self.client.get(url).send().await;
        Self::read(url, result).await
    }
}

/// Token endpoint response.
///
/// Fields not modelled here (token type, scope, launch context such as
/// `patient` or `smart_style_url`) are kept in `context`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Lifetime in seconds
    #[serde(deserialize_with = "deserialize_seconds")]
    pub expires_in: u64,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub id_token: Option<String>,

    #[serde(flatten)]
    pub context: Map<String, Value>,
}

/// Introspection endpoint response for a refresh token.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionResponse {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub active: bool,

    #[serde(default)]
    pub exp: Option<i64>,

    pub scope: String,
}

/// Providers send `expires_in` both as a number and as a numeric string.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// `active` arrives as a boolean or as `"true"` / `"false"`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => Ok(s.eq_ignore_ascii_case("true")),
    }
}
