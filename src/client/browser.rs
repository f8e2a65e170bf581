//! Browser implementations of the host capabilities (`wasm32` only).

use std::rc::Rc;

use wasm_bindgen::JsValue;

use crate::client::http_client::ReqwestTransport;
use crate::client::jwt::JwksValidator;
use crate::client::platform::{Capabilities, Navigation, Storage, StorageError, SystemCrypto};
use crate::error::Result;

fn js_error(e: JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{e:?}"))
}

fn window() -> Result<web_sys::Window, String> {
    web_sys::window().ok_or_else(|| "no global window".to_string())
}

/// [`Storage`] backed by `window.localStorage`.
#[derive(Debug, Clone)]
pub struct BrowserStorage {
    storage: web_sys::Storage,
}

impl BrowserStorage {
    pub fn local() -> Result<Self, StorageError> {
        let storage = window()
            .map_err(StorageError)?
            .local_storage()
            .map_err(|e| StorageError(js_error(e)))?
            .ok_or_else(|| StorageError("localStorage is not available".to_string()))?;
        Ok(Self { storage })
    }
}

impl Storage for BrowserStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage
            .get_item(key)
            .map_err(|e| StorageError(js_error(e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| StorageError(js_error(e)))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage
            .remove_item(key)
            .map_err(|e| StorageError(js_error(e)))
    }
}

/// [`Navigation`] over `window.location` and `window.history`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigation;

impl Navigation for BrowserNavigation {
    fn current_url(&self) -> Result<String, String> {
        window()?.location().href().map_err(js_error)
    }

    fn redirect_to(&self, url: &str) -> Result<(), String> {
        window()?.location().set_href(url).map_err(js_error)
    }

    fn replace_url(&self, url: &str) -> Result<(), String> {
        window()?
            .history()
            .map_err(js_error)?
            .replace_state_with_url(&JsValue::NULL, "", Some(url))
            .map_err(js_error)
    }
}

impl Capabilities {
    /// Local storage, the page location, Web Crypto randomness and `fetch`.
    pub fn browser() -> Result<Self> {
        Ok(Self {
            storage: Rc::new(BrowserStorage::local()?),
            navigation: Rc::new(BrowserNavigation),
            crypto: Rc::new(SystemCrypto),
            transport: Rc::new(ReqwestTransport::new()),
            validator: Rc::new(JwksValidator),
        })
    }
}
