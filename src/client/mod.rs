//! The launch flow and everything it runs on.
//!
//! - [`platform`]: host capabilities (storage, navigation, crypto) and their
//!   in-memory implementations
//! - [`pkce`]: verifier, challenge, nonce and state generation, authorization URL
//! - [`http_client`]: the [`Transport`] seam and token endpoint payloads
//! - [`jwt`]: key-set retrieval and token verification
//! - [`token_storage`]: the scope-partitioned session store
//! - [`callback`]: redirect to the authorization server and callback handling
//! - [`refresh`]: renewal with a refresh token
//! - [`provider`]: [`OidcClient`], the entry point
//!
//! On `wasm32` the [`browser`] module wires in `localStorage`, the page
//! location and `fetch`.

pub mod callback;
pub mod http_client;
pub mod jwt;
pub mod pkce;
pub mod platform;
pub mod provider;
pub mod refresh;
pub mod token_storage;

#[cfg(target_arch = "wasm32")]
pub mod browser;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::LaunchOutcome;
pub use http_client::{ReqwestTransport, Transport};
pub use jwt::{IdTokenClaims, JwksValidator, Validator};
pub use platform::{
    Capabilities, Crypto, MemoryNavigation, MemoryStorage, Navigation, Storage, SystemCrypto,
};
pub use provider::OidcClient;
pub use token_storage::{TokenContext, TokenSet, TokenStore};

#[cfg(target_arch = "wasm32")]
pub use browser::{BrowserNavigation, BrowserStorage};
