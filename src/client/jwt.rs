//! Token validation for the code exchange.
//!
//! Signature and standard-claim checks are delegated to a [`Validator`]
//! (by default [`JwksValidator`], built on `jsonwebtoken`). On top of its
//! result this module enforces the session binding: the ID token must carry
//! the nonce generated for this flow and name this client as its audience.
//!
//! It also offers an unverified decoder for reading display claims out of an
//! ID token that was already validated when it was stored.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ClientConfig;
use crate::client::http_client::{TokenResponse, Transport, TransportError};
use crate::error::{AuthError, Result};

/// Error types for token validation operations.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// JWT header is missing the kid (key ID) field
    #[error("JWT header missing 'kid' field")]
    MissingKid,

    /// Failed to decode JWT header
    #[error("Failed to decode JWT header: {0}")]
    HeaderDecodeError(#[from] jsonwebtoken::errors::Error),

    /// No key with this kid in the key set
    #[error("Key with kid '{0}' not found in JWKS")]
    KeyNotFound(String),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token has expired")]
    TokenExpired,

    /// Signature or claim check failed
    #[error("Token validation failed: {0}")]
    ValidationFailed(String),

    /// Not a decodable JWT at all
    #[error("Malformed token: {0}")]
    Malformed(String),
}

/// A JSON Web Key from the signing-key endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA")
    pub kty: String,

    /// Key ID, matched against the JWT header
    pub kid: String,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(rename = "use", default)]
    pub key_use: Option<String>,

    /// RSA modulus (base64url encoded)
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded)
    #[serde(default)]
    pub e: Option<String>,

    /// X.509 certificate chain
    #[serde(default)]
    pub x5c: Option<Vec<String>>,
}

impl Jwk {
    /// Converts the JWK to a DecodingKey for JWT validation.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, ValidationError> {
        if self.kty == "RSA"
            && let (Some(n), Some(e)) = (&self.n, &self.e)
        {
            return DecodingKey::from_rsa_components(n, e)
                .map_err(|e| ValidationError::InvalidKey(e.to_string()));
        }

        // x5c entries are base64 DER certificates; wrap them as PEM
        if let Some(x5c) = &self.x5c
            && let Some(cert) = x5c.first()
        {
            let pem = format!("-----BEGIN CERTIFICATE-----\n{cert}\n-----END CERTIFICATE-----\n");
            return DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| ValidationError::InvalidKey(e.to_string()));
        }

        Err(ValidationError::InvalidKey(
            "No valid key material found in JWK".to_string(),
        ))
    }

    /// Gets the algorithm for this key.
    pub fn algorithm(&self) -> Result<Algorithm, ValidationError> {
        match self.alg.as_deref().unwrap_or("RS256") {
            "RS256" => Ok(Algorithm::RS256),
            "RS384" => Ok(Algorithm::RS384),
            "RS512" => Ok(Algorithm::RS512),
            "PS256" => Ok(Algorithm::PS256),
            "PS384" => Ok(Algorithm::PS384),
            "PS512" => Ok(Algorithm::PS512),
            other => Err(ValidationError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// JSON Web Key Set document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// Fetches the signing keys published for this client.
pub async fn fetch_jwks(
    transport: &dyn Transport,
    config: &ClientConfig,
) -> Result<JwkSet, TransportError> {
    let url = config.jwks_url();
    tracing::trace!("Fetching JWKS from: {}", url);

    let jwks: JwkSet = transport
        .get(&url)
        .await?
        .error_for_status(&url)?
        .json(&url)?;
    tracing::trace!("Fetched {} keys from JWKS", jwks.keys.len());

    Ok(jwks)
}

/// The `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// True when the audience is exactly `client_id` (a one-element array counts).
    pub fn is_exactly(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Multiple(auds) => auds.len() == 1 && auds[0] == client_id,
        }
    }
}

/// Claims returned by a successful verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Identity and provider-specific claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Signature and standard-claim verification.
///
/// Implementations must not apply session policy (nonce, audience); that is
/// done by [`validate_exchanged_tokens`].
pub trait Validator {
    fn verify(&self, token: &str, keys: &JwkSet) -> Result<Claims, ValidationError>;
}

/// [`Validator`] using `jsonwebtoken` and the key named by the JWT header `kid`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwksValidator;

impl Validator for JwksValidator {
    fn verify(&self, token: &str, keys: &JwkSet) -> Result<Claims, ValidationError> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or(ValidationError::MissingKid)?;

        let jwk = keys
            .find(&kid)
            .ok_or_else(|| ValidationError::KeyNotFound(kid.clone()))?;
        let algorithm = jwk.algorithm()?;
        let decoding_key = jwk.to_decoding_key()?;

        let mut validation = Validation::new(algorithm);
        // Audience is policy, checked by the caller against the client id
        validation.validate_aud = false;
        validation.validate_nbf = true;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::warn!("Token validation failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ValidationError::TokenExpired,
                _ => ValidationError::ValidationFailed(e.to_string()),
            }
        })?;

        tracing::trace!("Verified token signed with kid {}", kid);
        Ok(token_data.claims)
    }
}

/// Enforces the session binding on verified ID token claims.
pub fn check_id_token_claims(
    claims: &Claims,
    expected_nonce: &str,
    client_id: &str,
) -> Result<()> {
    if claims.nonce.as_deref() != Some(expected_nonce) {
        tracing::warn!("ID token nonce does not match the session nonce");
        return Err(AuthError::NonceMismatch);
    }

    let audience_ok = claims
        .aud
        .as_ref()
        .is_some_and(|aud| aud.is_exactly(client_id));
    if !audience_ok {
        tracing::warn!("ID token audience {:?} is not {}", claims.aud, client_id);
        return Err(AuthError::AudienceMismatch);
    }

    Ok(())
}

/// Verifies the tokens returned by the authorization-code exchange.
///
/// The access token is always verified. The ID token is verified and bound to
/// the session when `openid` was requested and one was returned. Nothing is
/// persisted here.
pub async fn validate_exchanged_tokens(
    config: &ClientConfig,
    transport: &dyn Transport,
    validator: &dyn Validator,
    tokens: &TokenResponse,
    expected_nonce: &str,
) -> Result<Option<Claims>> {
    let keys = fetch_jwks(transport, config).await?;

    validator.verify(&tokens.access_token, &keys)?;
    tracing::trace!("Access token verified");

    match &tokens.id_token {
        Some(id_token) if config.has_scope("openid") => {
            let claims = validator.verify(id_token, &keys)?;
            check_id_token_claims(&claims, expected_nonce, &config.client_id)?;
            tracing::trace!("ID token verified and bound to session");
            Ok(Some(claims))
        }
        _ => Ok(None),
    }
}

/// Display claims read from an ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject - unique user identifier (required)
    pub sub: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// FHIR resource reference of the user, e.g. `Practitioner/123`
    #[serde(rename = "fhirUser", skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,
}

/// Decodes an ID token payload without verifying its signature.
///
/// Only for tokens that went through [`validate_exchanged_tokens`] before
/// being stored.
pub fn decode_id_token(token: &str) -> Result<IdTokenClaims, ValidationError> {
    let parts: Vec<&str> = token.split('.').collect();

    if parts.len() != 3 {
        return Err(ValidationError::Malformed(format!(
            "expected 3 parts, got {}",
            parts.len()
        )));
    }

    let decoded_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| ValidationError::Malformed(format!("Failed to decode base64: {e}")))?;

    serde_json::from_slice(&decoded_bytes)
        .map_err(|e| ValidationError::Malformed(format!("Failed to parse JWT claims: {e}")))
}
