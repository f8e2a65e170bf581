//! Client configuration for the authorization-code + PKCE flow.
//!
//! A [`ClientConfig`] is immutable for the life of an [`OidcClient`](crate::OidcClient):
//! it names the registered client, the scopes it asks for, where the
//! authorization server sends the browser back to, and the API host that
//! serves the `/oauth2/v1/*` endpoints.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Path of the authorization endpoint on the API host.
pub const AUTHORIZE_PATH: &str = "/oauth2/v1/authorize";
/// Path of the token endpoint on the API host.
pub const TOKEN_PATH: &str = "/oauth2/v1/token";
/// Path of the token introspection endpoint on the API host.
pub const INTROSPECT_PATH: &str = "/oauth2/v1/introspect";
/// Path of the signing-key (JWKS) endpoint on the API host.
pub const JWKS_PATH: &str = "/oauth2/v1/keys";

/// Placeholder client id shipped in `.env.example`; never valid at runtime.
const PLACEHOLDER_CLIENT_ID: &str = "unknown";

/// OIDC client configuration.
///
/// # Fields
///
/// - `client_id`: public identifier of the registered application
/// - `scopes`: space-separated scope set, e.g. `"openid launch offline_access"`
/// - `redirect_uri`: where the authorization server returns the browser
/// - `api_host`: host name (no scheme) serving the OAuth2 endpoints
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub scopes: String,
    pub redirect_uri: String,
    pub api_host: String,
}

impl ClientConfig {
    /// Creates a new configuration.
    ///
    /// # Example
    ///
    /// ```
    /// # use oidc_launch::ClientConfig;
    /// let config = ClientConfig::new(
    ///     "my-client",
    ///     "openid launch",
    ///     "https://app.example.com/",
    ///     "api.example.com",
    /// );
    /// assert_eq!(config.token_url(), "https://api.example.com/oauth2/v1/token");
    /// ```
    pub fn new(
        client_id: impl Into<String>,
        scopes: impl Into<String>,
        redirect_uri: impl Into<String>,
        api_host: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            scopes: scopes.into(),
            redirect_uri: redirect_uri.into(),
            api_host: api_host.into(),
        }
    }

    /// Loads the configuration from compile-time environment variables.
    ///
    /// Expected variables (see `build.rs`, which also reads `.env`):
    /// - `OIDC_CLIENT_ID`
    /// - `OIDC_SCOPES`
    /// - `OIDC_REDIRECT_URI`
    /// - `OIDC_API_HOST`
    ///
    /// Returns `None` if any of them was not set at compile time.
    pub fn from_env() -> Option<Self> {
        let client_id = option_env!("OIDC_CLIENT_ID")?;
        let scopes = option_env!("OIDC_SCOPES")?;
        let redirect_uri = option_env!("OIDC_REDIRECT_URI")?;
        let api_host = option_env!("OIDC_API_HOST")?;

        Some(Self::new(client_id, scopes, redirect_uri, api_host))
    }

    /// Checks that every required field is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() || self.client_id == PLACEHOLDER_CLIENT_ID {
            return Err(ConfigError::MissingClientId);
        }
        if self.scopes.trim().is_empty() {
            return Err(ConfigError::Missing("scopes"));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(ConfigError::Missing("redirect_uri"));
        }
        if self.api_host.trim().is_empty() {
            return Err(ConfigError::Missing("api_host"));
        }
        Ok(())
    }

    /// Returns true if `scope` is one of the configured scopes.
    pub fn has_scope(&self, scope: &str) -> bool {
        scope_contains(&self.scopes, scope)
    }

    /// Returns true if the configured scopes request a refresh token.
    pub fn wants_offline_access(&self) -> bool {
        grants_offline_access(&self.scopes)
    }

    /// Returns the base URL for the API host.
    ///
    /// ```
    /// # use oidc_launch::ClientConfig;
    /// let config = ClientConfig::new("c", "openid", "https://app/", "api.test.com");
    /// assert_eq!(config.base_url(), "https://api.test.com");
    /// ```
    pub fn base_url(&self) -> String {
        format!("https://{}", self.api_host)
    }

    pub fn authorize_url(&self) -> String {
        format!("{}{}", self.base_url(), AUTHORIZE_PATH)
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.base_url(), TOKEN_PATH)
    }

    pub fn introspect_url(&self) -> String {
        format!("{}{}", self.base_url(), INTROSPECT_PATH)
    }

    /// Returns the signing-key endpoint, scoped to this client.
    pub fn jwks_url(&self) -> String {
        let mut url = format!("{}{}?", self.base_url(), JWKS_PATH);
        url.push_str(
            &url::form_urlencoded::Serializer::new(String::new())
                .append_pair("client_id", &self.client_id)
                .finish(),
        );
        url
    }
}

/// Whitespace-token membership test on a scope string.
pub(crate) fn scope_contains(scopes: &str, scope: &str) -> bool {
    scopes.split_whitespace().any(|s| s == scope)
}

/// `offline` and the SMART spelling `offline_access` both request a refresh token.
pub(crate) fn grants_offline_access(scopes: &str) -> bool {
    scopes
        .split_whitespace()
        .any(|s| s == "offline" || s == "offline_access")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClientConfig {
        ClientConfig::new(
            "test-client-id",
            "test-scope openid",
            "http://localhost:3000/",
            "api.oauthtest.com",
        )
    }

    #[test]
    fn test_endpoint_urls() {
        let config = test_config();
        assert_eq!(
            config.authorize_url(),
            "https://api.oauthtest.com/oauth2/v1/authorize"
        );
        assert_eq!(config.token_url(), "https://api.oauthtest.com/oauth2/v1/token");
        assert_eq!(
            config.introspect_url(),
            "https://api.oauthtest.com/oauth2/v1/introspect"
        );
        assert_eq!(
            config.jwks_url(),
            "https://api.oauthtest.com/oauth2/v1/keys?client_id=test-client-id"
        );
    }

    #[test]
    fn test_jwks_url_encodes_client_id() {
        let config = ClientConfig::new("a b&c", "openid", "https://app/", "api.test.com");
        assert_eq!(
            config.jwks_url(),
            "https://api.test.com/oauth2/v1/keys?client_id=a+b%26c"
        );
    }

    #[test]
    fn test_validate() {
        assert!(test_config().validate().is_ok());

        let mut config = test_config();
        config.client_id = "unknown".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingClientId)));

        let mut config = test_config();
        config.client_id = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::MissingClientId)));

        let mut config = test_config();
        config.api_host = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("api_host"))
        ));
    }

    #[test]
    fn test_scope_membership_is_token_based() {
        let config = test_config();
        assert!(config.has_scope("openid"));
        assert!(config.has_scope("test-scope"));
        assert!(!config.has_scope("open"));
        assert!(!config.wants_offline_access());

        assert!(grants_offline_access("openid offline"));
        assert!(grants_offline_access("launch offline_access"));
        assert!(!grants_offline_access("openid offline_accessible"));
    }

    #[test]
    fn test_serialization() {
        let config = test_config();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_from_env() {
        // Only populated when OIDC_* was visible at compile time
        if let Some(cfg) = ClientConfig::from_env() {
            assert!(!cfg.api_host.is_empty());
            assert!(!cfg.scopes.is_empty());
        }
    }
}
