//! In-memory fakes shared by the unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::ClientConfig;
use crate::client::http_client::{HttpResponse, Transport, TransportError};
use crate::client::jwt::{Audience, Claims, JwkSet, ValidationError, Validator};
use crate::client::platform::{
    Capabilities, Crypto, MemoryNavigation, MemoryStorage, SystemCrypto,
};

pub fn test_config(scopes: &str) -> ClientConfig {
    ClientConfig::new(
        "test-client-id",
        scopes,
        "http://localhost:3000/",
        "api.oauthtest.com",
    )
}

/// "Random" bytes that are all zero, so generated values are predictable.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroCrypto;

impl Crypto for ZeroCrypto {
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, String> {
        Ok(vec![0; len])
    }

    fn sha256(&self, data: &[u8]) -> Vec<u8> {
        SystemCrypto.sha256(data)
    }
}

/// Scripted [`Transport`] that records every request.
///
/// Responses queue per URL; the last one keeps being served. Every request
/// yields to the executor once before it is answered, like a real network
/// round trip, so concurrently polled flows interleave.
#[derive(Debug, Default)]
pub struct FakeTransport {
    responses: RefCell<HashMap<String, VecDeque<HttpResponse>>>,
    calls: RefCell<Vec<String>>,
    forms: RefCell<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) {
        self.responses
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(HttpResponse::new(status, body));
    }

    pub fn respond_json(&self, url: &str, status: u16, body: Value) {
        self.respond(url, status, body.to_string());
    }

    /// `"METHOD url"` for every request, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Form bodies posted to `url`, in order.
    pub fn forms_to(&self, url: &str) -> Vec<HashMap<String, String>> {
        self.forms
            .borrow()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, params)| params.iter().cloned().collect())
            .collect()
    }

    fn next(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let mut responses = self.responses.borrow_mut();
        let queue = responses
            .get_mut(url)
            .ok_or_else(|| TransportError::Request {
                url: url.to_string(),
                message: "no response scripted".to_string(),
            })?;

        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        response.ok_or_else(|| TransportError::Request {
            url: url.to_string(),
            message: "no response scripted".to_string(),
        })
    }
}

#[async_trait(?Send)]
impl Transport for FakeTransport {
    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        tokio::task::yield_now().await;
        self.calls.borrow_mut().push(format!("POST {url}"));
        self.forms.borrow_mut().push((
            url.to_string(),
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        self.next(url)
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        tokio::task::yield_now().await;
        self.calls.borrow_mut().push(format!("GET {url}"));
        self.next(url)
    }
}

/// [`Validator`] that accepts every token except the ones marked as forged,
/// returning claims bound to `test-client-id` and the configured nonce.
#[derive(Debug, Default)]
pub struct FakeValidator {
    claims: RefCell<Claims>,
    forged: RefCell<Vec<String>>,
    verified: RefCell<Vec<String>>,
}

impl FakeValidator {
    pub fn with_nonce(nonce: &str) -> Self {
        let claims = Claims {
            sub: Some("test-subject".to_string()),
            iss: Some("https://api.oauthtest.com".to_string()),
            aud: Some(Audience::Single("test-client-id".to_string())),
            nonce: Some(nonce.to_string()),
            ..Claims::default()
        };
        Self {
            claims: RefCell::new(claims),
            ..Self::default()
        }
    }

    pub fn set_claims(&self, claims: Claims) {
        *self.claims.borrow_mut() = claims;
    }

    pub fn reject(&self, token: &str) {
        self.forged.borrow_mut().push(token.to_string());
    }

    /// Tokens passed to `verify`, in order.
    pub fn verified(&self) -> Vec<String> {
        self.verified.borrow().clone()
    }
}

impl Validator for FakeValidator {
    fn verify(&self, token: &str, _keys: &JwkSet) -> Result<Claims, ValidationError> {
        self.verified.borrow_mut().push(token.to_string());
        if self.forged.borrow().iter().any(|t| t == token) {
            return Err(ValidationError::ValidationFailed(
                "InvalidSignature".to_string(),
            ));
        }
        Ok(self.claims.borrow().clone())
    }
}

pub const ZERO_NONCE: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// A complete fake host: shared storage, a page URL, scripted network.
pub struct TestHost {
    pub storage: Rc<MemoryStorage>,
    pub navigation: Rc<MemoryNavigation>,
    pub transport: Rc<FakeTransport>,
    pub validator: Rc<FakeValidator>,
}

impl TestHost {
    pub fn new(url: &str) -> Self {
        Self {
            storage: Rc::new(MemoryStorage::new()),
            navigation: Rc::new(MemoryNavigation::new(url)),
            transport: Rc::new(FakeTransport::new()),
            validator: Rc::new(FakeValidator::with_nonce(ZERO_NONCE)),
        }
    }

    /// Another tab of the same origin: same storage, its own page and network.
    pub fn sibling(&self, url: &str) -> Self {
        Self {
            storage: self.storage.clone(),
            ..Self::new(url)
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            storage: self.storage.clone(),
            navigation: self.navigation.clone(),
            crypto: Rc::new(ZeroCrypto),
            transport: self.transport.clone(),
            validator: self.validator.clone(),
        }
    }
}

/// Token endpoint body as the provider sends it.
pub fn token_body(access_token: &str) -> Value {
    json!({
        "token_type": "Bearer",
        "expires_in": "3600",
        "access_token": access_token,
        "scope": "test-scope openid",
        "id_token": "test-id-token",
        "patient": "a-1.E-2",
        "ah_department": "a-1.Department-3",
        "smart_style_url": "https://preview.example.com/smart_stylesheet_v1.json",
        "need_patient_banner": true,
        "username": "test-user",
        "fhir_user_reference": "Practitioner/a-1.User-2"
    })
}

pub const EMPTY_JWKS: &str = r#"{"keys":[]}"#;
