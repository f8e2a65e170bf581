//! Access-token renewal with a stored refresh token.
//!
//! The refresh token is introspected first. Its granted `scope` is used both
//! for the refresh grant and to pick the store partition the renewed session
//! is written to.

use crate::ClientConfig;
use crate::client::http_client::{IntrospectionResponse, TokenResponse, Transport};
use crate::client::platform::Capabilities;
use crate::client::token_storage::{TokenSet, TokenStore};
use crate::error::{AuthError, Result};

/// Asks the introspection endpoint what `refresh_token` grants.
pub async fn introspect(
    config: &ClientConfig,
    transport: &dyn Transport,
    refresh_token: &str,
) -> Result<IntrospectionResponse> {
    let url = config.introspect_url();
    tracing::trace!("Introspecting refresh token at {}", url);

    let response = transport
        .post_form(
            &url,
            &[
                ("token", refresh_token),
                ("token_type_hint", "refresh_token"),
            ],
        )
        .await?
        .error_for_status(&url)?;

    Ok(response.json(&url)?)
}

/// Runs the refresh grant for `scope` and stores the result.
///
/// Returns the new access token.
pub async fn refetch_tokens(
    config: &ClientConfig,
    caps: &Capabilities,
    scope: &str,
    refresh_token: &str,
) -> Result<String> {
    let url = config.token_url();
    tracing::trace!("Requesting refresh grant at {}", url);

    let response = caps
        .transport
        .post_form(
            &url,
            &[
                ("client_id", config.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("scope", scope),
                ("refresh_token", refresh_token),
            ],
        )
        .await?
        .error_for_status(&url)?;
    let tokens: TokenResponse = response.json(&url)?;

    let store = TokenStore::for_scopes(caps.storage.clone(), &config.client_id, scope);
    let tokens = TokenSet::from_response(tokens, scope);
    store.write_tokens(&tokens)?;

    tracing::debug!("Access token refreshed into {}", store.prefix());
    Ok(tokens.access_token)
}

/// Introspects `refresh_token` and renews the session with it.
///
/// Every failure is reported as [`AuthError::RefreshFailed`].
pub async fn refresh_access_token(
    config: &ClientConfig,
    caps: &Capabilities,
    refresh_token: &str,
) -> Result<String> {
    let result = async {
        let introspection = introspect(config, caps.transport.as_ref(), refresh_token).await?;
        if !introspection.active {
            tracing::warn!("Refresh token reported inactive, attempting refresh anyway");
        }
        refetch_tokens(config, caps, &introspection.scope, refresh_token).await
    }
    .await;

    result.map_err(|e| {
        tracing::error!("Token refresh failed: {}", e);
        AuthError::RefreshFailed(Box::new(e))
    })
}
