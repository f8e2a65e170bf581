//! The public client: launch once, then hand out access tokens.

use crate::ClientConfig;
use crate::User;
use crate::client::callback::{LaunchOutcome, handle_authorization_flow};
use crate::client::jwt::{IdTokenClaims, decode_id_token};
use crate::client::platform::{Capabilities, now_millis};
use crate::client::refresh::refresh_access_token;
use crate::client::token_storage::{TokenContext, TokenStore};
use crate::error::{AuthError, Result};

/// An OpenID Connect client bound to one configuration and host.
///
/// Construct with [`OidcClient::connect`] on every page-load. When the store
/// already holds an access token the authorization flow is skipped entirely.
///
/// ```rust,ignore
/// let client = OidcClient::connect(ClientConfig::from_env().unwrap(), Capabilities::browser()?).await?;
/// if let LaunchOutcome::Redirected { .. } = client.outcome() {
///     return Ok(()); // the page is leaving
/// }
/// let token = client.access_token().await?;
/// ```
pub struct OidcClient {
    config: ClientConfig,
    capabilities: Capabilities,
    store: TokenStore,
    outcome: LaunchOutcome,
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl OidcClient {
    /// Validates `config` and drives the launch flow for the current page.
    pub async fn connect(config: ClientConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;

        let store = TokenStore::for_scopes(
            capabilities.storage.clone(),
            &config.client_id,
            &config.scopes,
        );

        let outcome = if store.access_token()?.is_some() {
            tracing::trace!("Found stored access token under {}", store.prefix());
            LaunchOutcome::Authenticated
        } else {
            tracing::trace!("No stored access token, running authorization flow");
            handle_authorization_flow(&config, &capabilities, &store).await?
        };

        Ok(Self {
            config,
            capabilities,
            store,
            outcome,
        })
    }

    /// [`connect`](Self::connect) with the page's own storage, location and `fetch`.
    #[cfg(target_arch = "wasm32")]
    pub async fn connect_browser(config: ClientConfig) -> Result<Self> {
        Self::connect(config, Capabilities::browser()?).await
    }

    /// Returns a usable access token.
    ///
    /// The stored token is returned without network access unless offline
    /// access was requested and it has expired, in which case it is renewed
    /// with the stored refresh token.
    pub async fn access_token(&self) -> Result<String> {
        let access_token = self.store.access_token()?;
        let now = now_millis();
        // Missing expiry counts as expired
        let expires_at = self.store.expires_at()?.unwrap_or(now);

        if self.config.wants_offline_access() && access_token.is_some() && now >= expires_at {
            tracing::debug!("Access token expired, refreshing");
            let refresh_token = self
                .store
                .refresh_token()?
                .ok_or(AuthError::NoRefreshToken)?;
            return refresh_access_token(&self.config, &self.capabilities, &refresh_token).await;
        }

        access_token.ok_or(AuthError::NotAuthenticated)
    }

    pub fn outcome(&self) -> &LaunchOutcome {
        &self.outcome
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The store partition for the configured scopes.
    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Launch context returned with the last token grant.
    pub fn token_context(&self) -> Result<Option<TokenContext>> {
        self.store.token_context()
    }

    /// Claims of the stored ID token.
    ///
    /// The token was verified before it was stored; it is not re-verified here.
    pub fn id_token_claims(&self) -> Result<Option<IdTokenClaims>> {
        self.store
            .id_token()?
            .map(|token| decode_id_token(&token).map_err(AuthError::from))
            .transpose()
    }

    pub fn user(&self) -> Result<Option<User>> {
        Ok(self.id_token_claims()?.map(User::from))
    }

    /// Forgets the session (access, ID and refresh tokens, token context).
    pub fn log_out(&self) -> Result<()> {
        tracing::debug!("Logging out of {}", self.store.prefix());
        self.store.log_out()?;
        Ok(())
    }
}
