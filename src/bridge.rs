/// Extension platform calls, implemented in `bridge.js`
use serde::Deserialize;
use wasm_bindgen::prelude::*;

use crate::error::{RelayError, js_error};
use crate::messaging::{ExtMessage, ExtResponse, Fetcher, Messenger, TabOpener, check_response};
use crate::relay::SlotStore;

#[wasm_bindgen(module = "/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch, js_name = getStorage)]
    async fn get_storage(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_name = setStorage)]
    async fn set_storage(key: &str, value: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_name = removeStorage)]
    async fn remove_storage(key: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_name = sendRuntimeMessage)]
    async fn send_runtime_message(message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_name = openTab)]
    async fn open_tab(url: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, js_name = fetchText)]
    async fn fetch_url(url: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_name = onRuntimeMessage)]
    fn on_runtime_message(handler: &Closure<dyn FnMut(JsValue) -> js_sys::Promise>);
}

/// `chrome.storage.local`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionStorage;

impl SlotStore for ExtensionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, RelayError> {
        let value = get_storage(key)
            .await
            .map_err(|e| RelayError::Storage(js_error(&e)))?;
        Ok(value.as_string())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RelayError> {
        set_storage(key, value)
            .await
            .map_err(|e| RelayError::Storage(js_error(&e)))
    }

    async fn remove(&self, key: &str) -> Result<(), RelayError> {
        remove_storage(key)
            .await
            .map_err(|e| RelayError::Storage(js_error(&e)))
    }
}

/// `chrome.tabs.create`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionTabs;

impl TabOpener for ExtensionTabs {
    async fn open(&self, url: &str) -> Result<(), RelayError> {
        open_tab(url)
            .await
            .map_err(|e| RelayError::Messaging(format!("open tab: {}", js_error(&e))))
    }
}

/// `chrome.runtime.sendMessage` from a content script
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeMessenger;

impl Messenger for RuntimeMessenger {
    async fn send(&self, message: &ExtMessage) -> Result<ExtResponse, RelayError> {
        let outgoing = serde_wasm_bindgen::to_value(message)
            .map_err(|e| RelayError::Messaging(format!("serialize: {}", e)))?;
        let reply = send_runtime_message(outgoing)
            .await
            .map_err(|e| RelayError::Messaging(js_error(&e)))?;

        if reply.is_null() || reply.is_undefined() {
            return Err(RelayError::Messaging("no response from background".to_string()));
        }
        serde_wasm_bindgen::from_value(reply)
            .map_err(|e| RelayError::Messaging(format!("malformed response: {}", e)))
    }
}

#[derive(Deserialize)]
struct FetchReply {
    status: u16,
    body: String,
}

/// Privileged `fetch` from the background context
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkFetcher;

impl Fetcher for NetworkFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, RelayError> {
        let reply = fetch_url(url).await.map_err(|e| {
            log::debug!("fetch {} failed: {}", url, js_error(&e));
            RelayError::Network {
                url: url.to_string(),
                status: None,
            }
        })?;
        let reply: FetchReply = serde_wasm_bindgen::from_value(reply)
            .map_err(|e| RelayError::Parse(format!("fetch reply: {}", e)))?;
        check_response(url, reply.status, &reply.body)
    }
}

/// Register the background's message handler. The handler resolves to the
/// response object; the closure lives for the worker's lifetime.
pub fn listen<H>(handler: H)
where
    H: FnMut(JsValue) -> js_sys::Promise + 'static,
{
    let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(JsValue) -> js_sys::Promise>);
    on_runtime_message(&closure);
    closure.forget();
}
