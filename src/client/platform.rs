//! Host capabilities the flow runs against.
//!
//! The flow never touches browser globals directly. Storage, navigation and
//! crypto are passed in, so the same code drives a real page (see
//! [`browser`](super::browser) on `wasm32`) or an in-memory host in tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::client::http_client::Transport;
use crate::client::jwt::Validator;

/// Failure reported by a [`Storage`] backend.
#[derive(Debug, Clone, thiserror::Error)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

/// Key-value persistence that outlives a page navigation.
///
/// Implementations are shared with other same-origin contexts (other tabs).
/// There is no locking or compare-and-swap: the last writer wins.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Control over the hosting page's location.
pub trait Navigation {
    /// Full URL of the current page, query string included.
    fn current_url(&self) -> Result<String, String>;

    /// Leaves the page for `url`. Terminal for the current page-load.
    fn redirect_to(&self, url: &str) -> Result<(), String>;

    /// Rewrites the visible URL without navigating.
    fn replace_url(&self, url: &str) -> Result<(), String>;
}

/// Randomness and hashing.
pub trait Crypto {
    /// Returns `len` bytes from a cryptographically secure source.
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, String>;

    fn sha256(&self, data: &[u8]) -> Vec<u8>;
}

/// Everything the flow needs from its host.
///
/// Handles are reference-counted so the caller can keep its own copy (for
/// example to inspect storage in tests, or share it with another client).
#[derive(Clone)]
pub struct Capabilities {
    pub storage: Rc<dyn Storage>,
    pub navigation: Rc<dyn Navigation>,
    pub crypto: Rc<dyn Crypto>,
    pub transport: Rc<dyn Transport>,
    pub validator: Rc<dyn Validator>,
}

/// In-process [`Storage`], the non-browser counterpart of `localStorage`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// In-process [`Navigation`] that tracks the current URL and every redirect.
#[derive(Debug, Default)]
pub struct MemoryNavigation {
    current: RefCell<String>,
    redirects: RefCell<Vec<String>>,
}

impl MemoryNavigation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            current: RefCell::new(url.into()),
            redirects: RefCell::new(Vec::new()),
        }
    }

    /// Simulates the browser arriving at `url` (e.g. the authorization callback).
    pub fn navigate(&self, url: impl Into<String>) {
        *self.current.borrow_mut() = url.into();
    }

    /// URLs passed to [`Navigation::redirect_to`], oldest first.
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.borrow().clone()
    }
}

impl Navigation for MemoryNavigation {
    fn current_url(&self) -> Result<String, String> {
        Ok(self.current.borrow().clone())
    }

    fn redirect_to(&self, url: &str) -> Result<(), String> {
        self.redirects.borrow_mut().push(url.to_string());
        *self.current.borrow_mut() = url.to_string();
        Ok(())
    }

    fn replace_url(&self, url: &str) -> Result<(), String> {
        *self.current.borrow_mut() = url.to_string();
        Ok(())
    }
}

/// [`Crypto`] backed by the operating system (or `crypto.getRandomValues` in the browser).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCrypto;

impl Crypto for SystemCrypto {
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, String> {
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| e.to_string())?;
        Ok(bytes)
    }

    fn sha256(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::now() as i64
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}
