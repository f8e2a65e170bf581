//! Namespaced persistence for flow and session state.
//!
//! Everything the flow needs across a full page navigation lives in the
//! injected [`Storage`] under a prefix derived from the client id and the
//! scope string:
//!
//! ```text
//! <client_id>-<first 8 hex chars of SHA-1(scopes)>-<key>
//! ```
//!
//! so a client configured with different scopes sees a different store.
//! The 8-character truncation trades collision resistance for short keys.
//!
//! ## Keys
//!
//! - Flow-scoped (cleared when the callback completes or fails):
//!   `cv` (code verifier), `nonce`, `state`
//! - Session-scoped (cleared on logout): `at`, `expires_in` (absolute
//!   epoch-millis), `id`, `tc` (token context JSON), `rt`
//!
//! ## Concurrency
//!
//! The backing storage is visible to every same-origin tab and nothing here
//! locks it. Two tabs refreshing at once both write, and the last write wins.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use crate::client::http_client::TokenResponse;
use crate::client::platform::{Storage, StorageError, now_millis};
use crate::config::{grants_offline_access, scope_contains};
use crate::error::{AuthError, Result};

pub const CODE_VERIFIER_KEY: &str = "cv";
pub const NONCE_KEY: &str = "nonce";
pub const STATE_KEY: &str = "state";

pub const ACCESS_TOKEN_KEY: &str = "at";
pub const EXPIRES_AT_KEY: &str = "expires_in";
pub const ID_TOKEN_KEY: &str = "id";
pub const TOKEN_CONTEXT_KEY: &str = "tc";
pub const REFRESH_TOKEN_KEY: &str = "rt";

const FLOW_KEYS: [&str; 3] = [CODE_VERIFIER_KEY, NONCE_KEY, STATE_KEY];
const SESSION_KEYS: [&str; 5] = [
    ID_TOKEN_KEY,
    TOKEN_CONTEXT_KEY,
    ACCESS_TOKEN_KEY,
    EXPIRES_AT_KEY,
    REFRESH_TOKEN_KEY,
];

/// Hex characters of the scope digest kept in the prefix.
const SCOPE_HASH_LEN: usize = 8;

/// Returns `"<client_id>-<8 hex chars of SHA-1(scopes)>"`.
pub fn store_prefix(client_id: &str, scopes: &str) -> String {
    let digest = Sha1::digest(scopes.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{}", client_id, &hex[..SCOPE_HASH_LEN])
}

/// Tokens obtained from one successful grant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Unix timestamp in milliseconds when the access token expires
    pub expires_at: i64,
    /// Provider-specific fields of the token response
    pub token_context: Map<String, Value>,
}

impl TokenSet {
    /// Computes `expires_at` from a lifetime in seconds, starting now.
    pub fn expiring_in(
        access_token: String,
        expires_in_secs: u64,
        token_context: Map<String, Value>,
    ) -> Self {
        Self {
            access_token,
            refresh_token: None,
            id_token: None,
            expires_at: now_millis().saturating_add(
                i64::try_from(expires_in_secs)
                    .unwrap_or(i64::MAX)
                    .saturating_mul(1000),
            ),
            token_context,
        }
    }

    /// Builds the set to persist from a grant response.
    ///
    /// The ID token is kept only when `scopes` include `openid`, the refresh
    /// token only when they request offline access.
    pub fn from_response(response: TokenResponse, scopes: &str) -> Self {
        let mut tokens = Self::expiring_in(
            response.access_token,
            response.expires_in,
            response.context,
        );
        tokens.id_token = response.id_token.filter(|_| scope_contains(scopes, "openid"));
        tokens.refresh_token = response
            .refresh_token
            .filter(|_| grants_offline_access(scopes));
        tokens
    }

    pub fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }
}

/// Launch context the provider returned next to the tokens.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ah_department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_style_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ah_brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ah_csg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_patient_banner: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ah_practice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_user_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// View of the shared [`Storage`] restricted to one scope identity.
#[derive(Clone)]
pub struct TokenStore {
    storage: Rc<dyn Storage>,
    prefix: String,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Opens the store for `(client_id, scopes)`.
    pub fn for_scopes(storage: Rc<dyn Storage>, client_id: &str, scopes: &str) -> Self {
        Self {
            storage,
            prefix: store_prefix(client_id, scopes),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}-{}", self.prefix, key)
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage.get(&self.key(key))
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage.set(&self.key(key), value)
    }

    pub fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.storage.remove(&self.key(key))
    }

    /// Removes the flow-scoped keys (`cv`, `nonce`, `state`).
    pub fn clear_auth_code_state(&self) -> Result<(), StorageError> {
        tracing::trace!("Clearing authorization flow state for {}", self.prefix);
        FLOW_KEYS.iter().try_for_each(|key| self.remove_item(key))
    }

    /// Removes the session-scoped keys.
    pub fn log_out(&self) -> Result<(), StorageError> {
        tracing::trace!("Clearing session tokens for {}", self.prefix);
        SESSION_KEYS.iter().try_for_each(|key| self.remove_item(key))
    }

    pub fn code_verifier(&self) -> Result<Option<String>, StorageError> {
        self.get_item(CODE_VERIFIER_KEY)
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.get_item(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.get_item(REFRESH_TOKEN_KEY)
    }

    pub fn id_token(&self) -> Result<Option<String>, StorageError> {
        self.get_item(ID_TOKEN_KEY)
    }

    /// Stored expiry in epoch-millis; `None` when missing or unparsable.
    pub fn expires_at(&self) -> Result<Option<i64>, StorageError> {
        Ok(self
            .get_item(EXPIRES_AT_KEY)?
            .and_then(|v| v.trim().parse().ok()))
    }

    /// Reads the stored token context, if any.
    pub fn token_context(&self) -> Result<Option<TokenContext>> {
        self.get_item(TOKEN_CONTEXT_KEY)?
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| AuthError::InvalidResponse(format!("stored token context: {e}")))
            })
            .transpose()
    }

    /// Persists the flow secrets generated before the redirect.
    pub fn write_flow_state(
        &self,
        code_verifier: &str,
        nonce: &str,
        state: &str,
    ) -> Result<(), StorageError> {
        self.set_item(CODE_VERIFIER_KEY, code_verifier)?;
        self.set_item(NONCE_KEY, nonce)?;
        self.set_item(STATE_KEY, state)
    }

    /// Persists a validated token set.
    ///
    /// Absent optional tokens leave whatever is stored in place.
    pub fn write_tokens(&self, tokens: &TokenSet) -> Result<()> {
        let context = serde_json::to_string(&tokens.token_context)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        self.set_item(ACCESS_TOKEN_KEY, &tokens.access_token)?;
        self.set_item(EXPIRES_AT_KEY, &tokens.expires_at.to_string())?;
        if let Some(id_token) = &tokens.id_token {
            self.set_item(ID_TOKEN_KEY, id_token)?;
        }
        if let Some(refresh_token) = &tokens.refresh_token {
            self.set_item(REFRESH_TOKEN_KEY, refresh_token)?;
        }
        self.set_item(TOKEN_CONTEXT_KEY, &context)?;

        tracing::trace!(
            "Stored tokens under {}, expiring at {}",
            self.prefix,
            tokens.expires_at
        );
        Ok(())
    }

    /// Reads the stored session back, if an access token is present.
    pub fn read_tokens(&self) -> Result<Option<TokenSet>> {
        let Some(access_token) = self.access_token()? else {
            return Ok(None);
        };

        let token_context = match self.get_item(TOKEN_CONTEXT_KEY)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| AuthError::InvalidResponse(format!("stored token context: {e}")))?,
            None => Map::new(),
        };

        Ok(Some(TokenSet {
            access_token,
            refresh_token: self.refresh_token()?,
            id_token: self.id_token()?,
            // Missing expiry counts as expired
            expires_at: self.expires_at()?.unwrap_or(i64::MIN),
            token_context,
        }))
    }
}
