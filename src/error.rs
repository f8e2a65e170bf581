//! Error types for the launch flow.
//!
//! Every failure is fatal to the operation that triggered it. Nothing here is
//! retried internally; callers decide what the user sees.

use crate::client::http_client::TransportError;
use crate::client::jwt::ValidationError;
use crate::client::platform::StorageError;

/// Missing or placeholder configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("client id is not set")]
    MissingClientId,

    #[error("required configuration '{0}' is not set")]
    Missing(&'static str),

    #[error("invalid url '{0}'")]
    InvalidUrl(String),
}

/// Errors surfaced by [`OidcClient`](crate::OidcClient) and the flow steps.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Initial launch without the `iss` / `launch` embed parameters.
    #[error("missing required embed params in url (iss, launch)")]
    MissingEmbedParams,

    /// Returned `state` differs from the persisted one.
    #[error("state param does not match, possible csrf attack")]
    StateMismatch,

    /// The authorization server redirected back with `error=...`.
    #[error("error in authorization flow: {0}")]
    AuthorizationDenied(String),

    /// Non-2xx response from the token endpoint during code exchange.
    #[error("token exchange failed with HTTP status {status}")]
    TokenExchangeFailed { status: u16 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("token validation failed: {0}")]
    TokenValidationFailed(#[from] ValidationError),

    /// ID token `nonce` claim differs from the session nonce.
    #[error("nonce does not match")]
    NonceMismatch,

    /// ID token `aud` claim is not this client.
    #[error("audience and client id do not match")]
    AudienceMismatch,

    /// Introspection or refresh grant failed.
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] Box<AuthError>),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("no access token available, not logged in")]
    NotAuthenticated,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Random source unavailable; the flow cannot proceed safely.
    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
