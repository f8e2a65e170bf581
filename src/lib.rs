//! # oidc-launch
//!
//! OpenID Connect authorization-code client with PKCE for apps embedded in an
//! EHR (SMART-style launch).
//!
//! ## Overview
//!
//! The app is opened by the EHR with `iss` and `launch` query parameters.
//! [`OidcClient::connect`] turns that page-load into one of three outcomes:
//!
//! - **Redirected**: no flow in progress, so fresh PKCE secrets are stored and
//!   the browser is sent to the authorization endpoint
//! - **Authenticated**: a stored session was found, or the browser just came
//!   back with a `code` that was exchanged and verified
//! - **AwaitingCallback**: a flow is pending but this URL does not finish it
//!
//! After that, [`OidcClient::access_token`] returns the stored token,
//! transparently refreshing it when offline access was requested and it has
//! expired.
//!
//! ## Hosts
//!
//! The flow reaches the outside world only through [`Capabilities`]:
//! storage, navigation, crypto, HTTP transport and token validation. On
//! `wasm32`, `Capabilities::browser()` uses `localStorage`, `window.location`
//! and `fetch`. Tests and native hosts use [`MemoryStorage`],
//! [`MemoryNavigation`] and [`ReqwestTransport`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oidc_launch::{ClientConfig, LaunchOutcome, OidcClient};
//!
//! let config = ClientConfig::from_env().expect("OIDC_* variables at build time");
//! let client = OidcClient::connect_browser(config).await?;
//!
//! if let LaunchOutcome::Redirected { .. } = client.outcome() {
//!     return Ok(());
//! }
//!
//! let token = client.access_token().await?;
//! let patient = client.token_context()?.and_then(|tc| tc.patient);
//! ```
//!
//! ## Storage layout
//!
//! Keys are `<client_id>-<8 hex chars of SHA-1(scopes)>-<key>`, so each scope
//! set gets its own session. See [`client::token_storage`].

pub mod client;
pub mod config;
pub mod error;
pub mod user;

pub use client::{
    Capabilities, LaunchOutcome, MemoryNavigation, MemoryStorage, OidcClient, ReqwestTransport,
    TokenContext,
};
pub use config::ClientConfig;
pub use error::{AuthError, ConfigError, Result};
pub use user::User;
