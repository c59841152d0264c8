/// Content script <-> background message contract.
///
/// Content scripts cannot open tabs and are subject to the page's CORS rules,
/// so they ask the background context to act on their behalf. Every request
/// gets an [`ExtResponse`] with a success flag and either data or an error.
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::notation::NotationPayload;
use crate::relay::{Relay, SlotStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtMessage {
    /// GET a URL with the extension's privileges and return the body
    FetchText { url: String },
    OpenDestination { url: String },
    /// Publish to the relay slot, then open the destination
    StoreAndOpen { pgn: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The structured error behind `error`, so the receiver keeps its kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<RelayError>,
}

impl ExtResponse {
    pub fn ok(data: Option<String>) -> Self {
        ExtResponse {
            success: true,
            data,
            error: None,
            cause: None,
        }
    }

    pub fn failed(e: &RelayError) -> Self {
        ExtResponse {
            success: false,
            data: None,
            error: Some(e.to_string()),
            cause: Some(e.clone()),
        }
    }

    /// A failure without a structured cause becomes a messaging error.
    pub fn into_result(self) -> Result<Option<String>, RelayError> {
        if self.success {
            return Ok(self.data);
        }
        Err(self.cause.unwrap_or_else(|| {
            RelayError::Messaging(self.error.unwrap_or_else(|| "unknown error".to_string()))
        }))
    }
}

#[allow(async_fn_in_trait)]
pub trait Fetcher {
    /// Body of a 2xx response, trimmed
    async fn fetch_text(&self, url: &str) -> Result<String, RelayError>;
}

#[allow(async_fn_in_trait)]
pub trait TabOpener {
    async fn open(&self, url: &str) -> Result<(), RelayError>;
}

#[allow(async_fn_in_trait)]
pub trait Messenger {
    async fn send(&self, message: &ExtMessage) -> Result<ExtResponse, RelayError>;
}

/// Map an HTTP status and body to the fetch contract.
pub fn check_response(url: &str, status: u16, body: &str) -> Result<String, RelayError> {
    if (200..300).contains(&status) {
        Ok(body.trim().to_string())
    } else {
        Err(RelayError::Network {
            url: url.to_string(),
            status: Some(status),
        })
    }
}

/// The background context's side of the contract
pub struct Background<S, T, F> {
    store: S,
    tabs: T,
    fetcher: F,
    relay_key: String,
}

impl<S: SlotStore, T: TabOpener, F: Fetcher> Background<S, T, F> {
    pub fn new(store: S, tabs: T, fetcher: F, relay_key: impl Into<String>) -> Self {
        Background {
            store,
            tabs,
            fetcher,
            relay_key: relay_key.into(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tabs(&self) -> &T {
        &self.tabs
    }

    pub async fn dispatch(&self, message: ExtMessage) -> ExtResponse {
        match message {
            ExtMessage::FetchText { url } => match self.fetcher.fetch_text(&url).await {
                Ok(body) => ExtResponse::ok(Some(body)),
                Err(e) => {
                    warn!("Fetch on behalf of page failed: {}", e);
                    ExtResponse::failed(&e)
                }
            },
            ExtMessage::OpenDestination { url } => match self.tabs.open(&url).await {
                Ok(()) => ExtResponse::ok(None),
                Err(e) => {
                    error!("Failed to open {}: {}", url, e);
                    ExtResponse::failed(&e)
                }
            },
            ExtMessage::StoreAndOpen { pgn, url } => match self.store_and_open(&pgn, &url).await {
                Ok(()) => ExtResponse::ok(None),
                Err(e) => {
                    error!("Store-and-open failed: {}", e);
                    ExtResponse::failed(&e)
                }
            },
        }
    }

    async fn store_and_open(&self, pgn: &str, url: &str) -> Result<(), RelayError> {
        let payload = NotationPayload::new(pgn)
            .ok_or_else(|| RelayError::Parse("empty notation".to_string()))?;

        Relay::new(&self.store, &self.relay_key).publish(&payload).await?;
        self.tabs.open(url).await?;
        info!("Opened destination {}", url);
        Ok(())
    }
}

/// Content-side fetcher that routes the request through the background.
pub struct BackgroundFetcher<'a, M: Messenger> {
    messenger: &'a M,
}

impl<'a, M: Messenger> BackgroundFetcher<'a, M> {
    pub fn new(messenger: &'a M) -> Self {
        BackgroundFetcher { messenger }
    }
}

impl<M: Messenger> Fetcher for BackgroundFetcher<'_, M> {
    async fn fetch_text(&self, url: &str) -> Result<String, RelayError> {
        let response = self
            .messenger
            .send(&ExtMessage::FetchText {
                url: url.to_string(),
            })
            .await?;

        match response.into_result() {
            Ok(Some(body)) => Ok(body),
            Ok(None) => Ok(String::new()),
            Err(network @ RelayError::Network { .. }) => Err(network),
            Err(reason) => {
                warn!("Background fetch of {} failed: {}", url, reason);
                Err(RelayError::Network {
                    url: url.to_string(),
                    status: None,
                })
            }
        }
    }
}

/// Ask the background to publish `payload` and open the destination.
pub async fn hand_off<M: Messenger>(
    messenger: &M,
    payload: &NotationPayload,
    destination_url: &str,
) -> Result<(), RelayError> {
    let response = messenger
        .send(&ExtMessage::StoreAndOpen {
            pgn: payload.as_str().to_string(),
            url: destination_url.to_string(),
        })
        .await?;

    response.into_result().map(|_| ())
}
