//! PKCE (Proof Key for Code Exchange) utilities for the authorization-code flow.
//!
//! This module derives the per-flow secrets (code verifier, challenge, nonce
//! and anti-CSRF state) and builds the authorization endpoint URL, as
//! specified in RFC 7636 and OpenID Connect Core.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ClientConfig;
use crate::client::platform::Crypto;
use crate::error::{AuthError, ConfigError, Result};

/// The only supported challenge method.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Random bytes behind the code verifier (43 base64url characters).
const CODE_VERIFIER_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 32;
/// Random bytes behind the secondary token embedded in `state`.
const XCRF_LENGTH: usize = 8;

/// Returns `len` random bytes, base64url-encoded without padding.
pub fn new_random(crypto: &dyn Crypto, len: usize) -> Result<String> {
    let bytes = crypto.random_bytes(len).map_err(AuthError::Crypto)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generates a high-entropy code verifier.
pub fn generate_code_verifier(crypto: &dyn Crypto) -> Result<String> {
    new_random(crypto, CODE_VERIFIER_LENGTH)
}

/// Derives the S256 code challenge: `base64url(SHA256(code_verifier))`.
pub fn generate_code_challenge(crypto: &dyn Crypto, code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(crypto.sha256(code_verifier.as_bytes()))
}

pub fn generate_nonce(crypto: &dyn Crypto) -> Result<String> {
    new_random(crypto, NONCE_LENGTH)
}

/// Decoded form of the `state` parameter.
///
/// Carries the page to return to after login next to a random token, so the
/// value is both unguessable and useful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    #[serde(rename = "redirectTo")]
    pub redirect_to: String,
    pub xcrf: String,
}

impl StatePayload {
    pub fn encode(&self) -> Result<String> {
        let json =
            serde_json::to_vec(self).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Parses a `state` value produced by [`StatePayload::encode`].
    pub fn decode(state: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(state)
            .map_err(|e| AuthError::InvalidResponse(format!("state is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidResponse(format!("state is not valid JSON: {e}")))
    }
}

/// Generates the `state` parameter for a flow started at `redirect_to`.
pub fn generate_state(crypto: &dyn Crypto, redirect_to: &str) -> Result<String> {
    StatePayload {
        redirect_to: redirect_to.to_string(),
        xcrf: new_random(crypto, XCRF_LENGTH)?,
    }
    .encode()
}

/// Secrets for one authorization request.
///
/// `code_verifier`, `nonce` and `state` are persisted before the redirect and
/// consumed when the browser comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub code_verifier: String,
    pub code_challenge: String,
    pub nonce: String,
    pub state: String,
}

impl AuthorizationRequest {
    /// Generates a fresh request for a flow started at `current_url`.
    pub fn generate(crypto: &dyn Crypto, current_url: &str) -> Result<Self> {
        let code_verifier = generate_code_verifier(crypto)?;
        let code_challenge = generate_code_challenge(crypto, &code_verifier);
        let nonce = generate_nonce(crypto)?;
        let state = generate_state(crypto, current_url)?;

        Ok(Self {
            code_verifier,
            code_challenge,
            nonce,
            state,
        })
    }
}

/// Embed parameters handed to the app by the launching EHR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    /// The `iss` parameter, forwarded as `aud`.
    pub iss: String,
    pub launch: String,
}

/// Builds the authorization URL for the given request.
///
/// The query is form-encoded in a fixed parameter order.
pub fn build_authorization_url(
    config: &ClientConfig,
    request: &AuthorizationRequest,
    launch: &LaunchParams,
) -> Result<String> {
    let authorize_url = config.authorize_url();
    let mut url =
        Url::parse(&authorize_url).map_err(|_| ConfigError::InvalidUrl(authorize_url.clone()))?;

    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes)
        .append_pair("aud", &launch.iss)
        .append_pair("code_challenge", &request.code_challenge)
        .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD)
        .append_pair("state", &request.state)
        .append_pair("nonce", &request.nonce)
        .append_pair("launch", &launch.launch);

    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::platform::SystemCrypto;
    use crate::client::testing::ZeroCrypto;

    const ZERO_32_B64: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

    #[test]
    fn test_generate_code_verifier() {
        let verifier = generate_code_verifier(&SystemCrypto).unwrap();
        // RFC 7636 minimum length
        assert_eq!(verifier.len(), 43);
        assert_ne!(verifier, generate_code_verifier(&SystemCrypto).unwrap());
    }

    #[test]
    fn test_code_challenge_matches_sha256_of_verifier() {
        let challenge = generate_code_challenge(&SystemCrypto, ZERO_32_B64);
        assert_eq!(challenge, "DwBzhbb51LfusnSGBa_hqYSgo7-j8BTQnip4TOnlzRo");
    }

    #[test]
    fn test_pkce_pair_is_bound() {
        let request = AuthorizationRequest::generate(&SystemCrypto, "http://localhost/").unwrap();
        assert_eq!(
            request.code_challenge,
            generate_code_challenge(&SystemCrypto, &request.code_verifier)
        );
    }

    #[test]
    fn test_zero_randomness_is_deterministic() {
        let request = AuthorizationRequest::generate(
            &ZeroCrypto,
            "http://localhost:3000/?iss=happy-dom&launch=mocked-launch",
        )
        .unwrap();

        assert_eq!(request.code_verifier, ZERO_32_B64);
        assert_eq!(request.nonce, ZERO_32_B64);
        assert_eq!(
            request.state,
            "eyJyZWRpcmVjdFRvIjoiaHR0cDovL2xvY2FsaG9zdDozMDAwLz9pc3M9aGFwcHktZG9tJmxhdW5jaD1tb2NrZWQtbGF1bmNoIiwieGNyZiI6IkFBQUFBQUFBQUFBIn0"
        );
    }

    #[test]
    fn test_state_payload_decode() {
        let state = generate_state(&SystemCrypto, "http://localhost:3000/?iss=x").unwrap();
        let payload = StatePayload::decode(&state).unwrap();
        assert_eq!(payload.redirect_to, "http://localhost:3000/?iss=x");
        assert_eq!(payload.xcrf.len(), 11);

        assert!(matches!(
            StatePayload::decode("test-state"),
            Err(AuthError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_unavailable_random_source_is_fatal() {
        struct BrokenCrypto;
        impl Crypto for BrokenCrypto {
            fn random_bytes(&self, _len: usize) -> std::result::Result<Vec<u8>, String> {
                Err("no entropy".to_string())
            }
            fn sha256(&self, data: &[u8]) -> Vec<u8> {
                SystemCrypto.sha256(data)
            }
        }

        let result = AuthorizationRequest::generate(&BrokenCrypto, "http://localhost/");
        assert!(matches!(result, Err(AuthError::Crypto(msg)) if msg == "no entropy"));
    }

    #[test]
    fn test_build_authorization_url() {
        let config = ClientConfig::new(
            "test-client-id",
            "test-scope openid",
            "http://localhost:3000/",
            "api.oauthtest.com",
        );
        let request = AuthorizationRequest {
            code_verifier: "verifier".to_string(),
            code_challenge: "challenge123".to_string(),
            nonce: "nonce123".to_string(),
            state: "state123".to_string(),
        };
        let launch = LaunchParams {
            iss: "https://ehr.example.com/fhir".to_string(),
            launch: "launch-ctx".to_string(),
        };

        let url = build_authorization_url(&config, &request, &launch).unwrap();

        assert_eq!(
            url,
            "https://api.oauthtest.com/oauth2/v1/authorize?client_id=test-client-id\
             &redirect_uri=http%3A%2F%2Flocalhost%3A3000%2F&response_type=code\
             &scope=test-scope+openid&aud=https%3A%2F%2Fehr.example.com%2Ffhir\
             &code_challenge=challenge123&code_challenge_method=S256\
             &state=state123&nonce=nonce123&launch=launch-ctx"
        );
        // The verifier itself never leaves the browser on this leg
        assert!(!url.contains("verifier"));
    }

    #[test]
    fn test_build_authorization_url_rejects_bad_host() {
        let config = ClientConfig::new("c", "openid", "https://app/", "bad host");
        let request = AuthorizationRequest::generate(&SystemCrypto, "http://localhost/").unwrap();
        let launch = LaunchParams {
            iss: "iss".to_string(),
            launch: "l".to_string(),
        };

        assert!(matches!(
            build_authorization_url(&config, &request, &launch),
            Err(AuthError::Config(ConfigError::InvalidUrl(_)))
        ));
    }
}
