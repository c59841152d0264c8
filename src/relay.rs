/// Single-slot hand-off of a notation payload between tabs
use log::info;

use crate::error::RelayError;
use crate::notation::NotationPayload;

/// Extension-scoped key-value storage visible to every tab
#[allow(async_fn_in_trait)]
pub trait SlotStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RelayError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RelayError>;
    async fn remove(&self, key: &str) -> Result<(), RelayError>;
}

/// The relay slot. Last writer wins; a payload nobody consumes stays put.
pub struct Relay<'a, S: SlotStore> {
    store: &'a S,
    key: &'a str,
}

impl<'a, S: SlotStore> Relay<'a, S> {
    pub fn new(store: &'a S, key: &'a str) -> Self {
        Relay { store, key }
    }

    /// Overwrite the slot; returns once storage acknowledged the write.
    pub async fn publish(&self, payload: &NotationPayload) -> Result<(), RelayError> {
        self.store.set(self.key, payload.as_str()).await?;
        info!("Published {} bytes of notation to '{}'", payload.as_str().len(), self.key);
        Ok(())
    }

    /// Read without clearing. The caller clears once it has used the payload.
    pub async fn consume(&self) -> Result<Option<NotationPayload>, RelayError> {
        let stored = self.store.get(self.key).await?;
        Ok(stored.as_deref().and_then(NotationPayload::new))
    }

    pub async fn clear(&self) -> Result<(), RelayError> {
        self.store.remove(self.key).await
    }
}
