/// PGN Relay - Chrome Extension that sends chess games to an analysis site
/// Built with Rust + WASM

mod bridge;
mod config;
mod error;
mod extract;
mod insert;
mod messaging;
mod notation;
mod page;
mod poller;
mod relay;
mod session;
mod site;
mod transfer;
pub mod ui;

#[cfg(test)]
mod testing;

use log::{debug, error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::bridge::{ExtensionStorage, ExtensionTabs, NetworkFetcher};
use crate::config::Config;
use crate::error::RelayError;
use crate::insert::{Delivery, PageTargets, deliver, failure_notice};
use crate::messaging::{Background, ExtMessage, ExtResponse};
use crate::poller::BrowserTimer;
use crate::relay::Relay;
use crate::session::SourceSession;
use crate::site::{PageRole, classify};
use crate::ui::notify::notify;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Content script entry: acts as source or destination depending on the page
#[wasm_bindgen]
pub fn start_content_script() {
    spawn_local(async {
        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            warn!("Content script loaded without a document");
            return;
        };
        let url = match document.url() {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not read page URL: {}", error::js_error(&e));
                return;
            }
        };
        let config = Config::load(&ExtensionStorage).await;

        match classify(&url, &config) {
            PageRole::Source(site) => {
                let session = SourceSession::new(config.clone(), site.clone(), document);
                if let Err(e) = session.start() {
                    error!("Could not start source session: {}", e);
                }
            }
            PageRole::Destination => run_destination(&config, document).await,
            PageRole::Unrelated => debug!("Nothing to do on {}", url),
        }
    });
}

async fn run_destination(config: &Config, document: web_sys::Document) {
    let store = ExtensionStorage;
    let relay = Relay::new(&store, &config.relay_key);
    let targets = PageTargets::new(document.clone());

    match deliver(
        &relay,
        &config.destination,
        &targets,
        &BrowserTimer,
        &config.destination_poll,
        &config.timings,
    )
    .await
    {
        Ok(Delivery::Nothing) => debug!("No relayed notation waiting"),
        Ok(Delivery::Delivered) => info!("Relayed notation delivered"),
        Ok(Delivery::Abandoned) => warn!("Relayed notation could not be inserted"),
        Err(e) => {
            error!("Delivery failed: {}", e);
            if let Some(message) = failure_notice(&e) {
                notify(&document, &message, config.timings.notification_ms);
            }
        }
    }
}

// Background entry: answers fetch and store-and-open requests from content scripts
#[wasm_bindgen]
pub fn start_background() {
    bridge::listen(|message: JsValue| {
        future_to_promise(async move {
            let response = match serde_wasm_bindgen::from_value::<ExtMessage>(message) {
                Ok(message) => {
                    let config = Config::load(&ExtensionStorage).await;
                    Background::new(ExtensionStorage, ExtensionTabs, NetworkFetcher, config.relay_key)
                        .dispatch(message)
                        .await
                }
                Err(e) => ExtResponse::failed(&RelayError::Messaging(format!("unrecognized message: {}", e))),
            };
            serde_wasm_bindgen::to_value(&response).map_err(|e| JsValue::from_str(&e.to_string()))
        })
    });
    info!("Background listener registered");
}
