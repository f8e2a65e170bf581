//! Authorization redirect and callback handling.
//!
//! A page-load runs through [`handle_authorization_flow`] at most once:
//!
//! 1. No code verifier stored: this is the EHR launch. The `iss` and `launch`
//!    embed parameters are required; fresh PKCE secrets are persisted and the
//!    browser is sent to the authorization endpoint.
//! 2. `code` in the URL: the browser came back. The returned `state` must
//!    equal the stored one before the code is exchanged, the tokens verified,
//!    and the session written.
//! 3. `error` in the URL: the flow state is discarded and the provider's
//!    error is surfaced.

use url::Url;

use crate::ClientConfig;
use crate::client::http_client::TokenResponse;
use crate::client::jwt::validate_exchanged_tokens;
use crate::client::pkce::{AuthorizationRequest, LaunchParams, build_authorization_url};
use crate::client::platform::Capabilities;
use crate::client::token_storage::{NONCE_KEY, STATE_KEY, TokenSet, TokenStore};
use crate::error::{AuthError, Result};

/// Query parameters that end the authorization round trip.
const CALLBACK_PARAMS: [&str; 2] = ["code", "state"];

/// Where a page-load left the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A session is stored; [`OidcClient::access_token`](crate::OidcClient::access_token) will answer.
    Authenticated,

    /// The browser was sent to the authorization server.
    ///
    /// Nothing else should run on this page-load.
    Redirected { url: String },

    /// A flow is in progress but this URL carries neither `code` nor `error`.
    AwaitingCallback,
}

/// Parameters read from the current page URL.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub iss: Option<String>,
    pub launch: Option<String>,
}

impl CallbackQuery {
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| AuthError::Navigation(format!("invalid page url: {e}")))?;

        let mut query = Self::default();
        for (key, value) in parsed.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut query.code,
                "state" => &mut query.state,
                "error" => &mut query.error,
                "error_description" => &mut query.error_description,
                "iss" => &mut query.iss,
                "launch" => &mut query.launch,
                _ => continue,
            };
            // First occurrence wins
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        Ok(query)
    }

    /// The EHR embed parameters, when both are present and non-empty.
    pub fn launch_params(&self) -> Option<LaunchParams> {
        let iss = self.iss.as_deref().filter(|v| !v.is_empty())?;
        let launch = self.launch.as_deref().filter(|v| !v.is_empty())?;
        Some(LaunchParams {
            iss: iss.to_string(),
            launch: launch.to_string(),
        })
    }

    fn denial_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        Some(match &self.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error.clone(),
        })
    }
}

/// Runs the launch state machine for the current page.
pub async fn handle_authorization_flow(
    config: &ClientConfig,
    caps: &Capabilities,
    store: &TokenStore,
) -> Result<LaunchOutcome> {
    let current_url = caps
        .navigation
        .current_url()
        .map_err(AuthError::Navigation)?;
    let query = CallbackQuery::from_url(&current_url)?;

    if store.code_verifier()?.is_none() {
        let launch = query.launch_params().ok_or_else(|| {
            tracing::error!("Launch URL is missing the iss or launch parameter");
            AuthError::MissingEmbedParams
        })?;
        let url = redirect_to_authorization(config, caps, store, &current_url, &launch)?;
        return Ok(LaunchOutcome::Redirected { url });
    }

    let mut outcome = LaunchOutcome::AwaitingCallback;

    if let Some(code) = &query.code {
        let stored_state = store.get_item(STATE_KEY)?;
        if stored_state.is_none() || stored_state != query.state {
            tracing::warn!("Returned state does not match the stored state");
            return Err(AuthError::StateMismatch);
        }

        exchange_code(config, caps, store, code, &current_url).await?;
        outcome = LaunchOutcome::Authenticated;
    }

    if let Some(message) = query.denial_message() {
        tracing::error!("Authorization server returned an error: {}", message);
        store.clear_auth_code_state()?;
        return Err(AuthError::AuthorizationDenied(message));
    }

    Ok(outcome)
}

/// Persists fresh flow secrets and sends the browser to the authorization endpoint.
///
/// Returns the authorization URL. The page is leaving once this succeeds.
pub fn redirect_to_authorization(
    config: &ClientConfig,
    caps: &Capabilities,
    store: &TokenStore,
    current_url: &str,
    launch: &LaunchParams,
) -> Result<String> {
    let request = AuthorizationRequest::generate(caps.crypto.as_ref(), current_url)?;
    let url = build_authorization_url(config, &request, launch)?;

    store.write_flow_state(&request.code_verifier, &request.nonce, &request.state)?;

    tracing::debug!("Redirecting to authorization endpoint: {}", url);
    caps.navigation
        .redirect_to(&url)
        .map_err(AuthError::Navigation)?;

    Ok(url)
}

/// Exchanges an authorization code and stores the verified session.
///
/// Nothing is written unless every token check passes. On success the flow
/// state is cleared and `code` / `state` are removed from the visible URL.
pub async fn exchange_code(
    config: &ClientConfig,
    caps: &Capabilities,
    store: &TokenStore,
    code: &str,
    current_url: &str,
) -> Result<()> {
    let code_verifier = store.code_verifier()?.unwrap_or_default();
    let nonce = store.get_item(NONCE_KEY)?.unwrap_or_default();
    let token_url = config.token_url();

    tracing::trace!("Exchanging authorization code at {}", token_url);
    let response = caps
        .transport
        .post_form(
            &token_url,
            &[
                ("client_id", config.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("scope", config.scopes.as_str()),
                ("code", code),
                ("code_verifier", code_verifier.as_str()),
            ],
        )
        .await?;

    if !response.is_success() {
        tracing::error!("Token exchange failed with HTTP {}", response.status);
        return Err(AuthError::TokenExchangeFailed {
            status: response.status,
        });
    }

    let tokens: TokenResponse = response.json(&token_url)?;
    validate_exchanged_tokens(
        config,
        caps.transport.as_ref(),
        caps.validator.as_ref(),
        &tokens,
        &nonce,
    )
    .await?;

    store.write_tokens(&TokenSet::from_response(tokens, &config.scopes))?;
    store.clear_auth_code_state()?;
    tracing::debug!("Authorization code exchanged, session stored");

    let cleaned = strip_callback_params(current_url);
    caps.navigation
        .replace_url(&cleaned)
        .map_err(AuthError::Navigation)?;

    Ok(())
}

/// Removes `code` and `state` from `url`.
///
/// Every other query segment is kept byte for byte, in order. An unparsable
/// URL is returned unchanged.
pub fn strip_callback_params(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(query) = parsed.query() else {
        return parsed.into();
    };

    let kept = query
        .split('&')
        .filter(|segment| !segment.is_empty() && !is_callback_param(segment))
        .collect::<Vec<_>>()
        .join("&");

    parsed.set_query((!kept.is_empty()).then_some(kept.as_str()));
    parsed.into()
}

fn is_callback_param(segment: &str) -> bool {
    url::form_urlencoded::parse(segment.as_bytes())
        .next()
        .is_some_and(|(key, _)| CALLBACK_PARAMS.contains(&key.as_ref()))
}
