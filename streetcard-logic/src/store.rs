use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::card::Card;

/// Key the last successfully fetched card is stored under
pub const CACHE_KEY: &str = "last_card_v1";

#[derive(Error, Debug)]
#[error("Storage error: {0}")]
pub struct PersistenceError(pub String);

/// Durable key-value byte storage
pub trait CardStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    fn write(&self, key: &str, bytes: Vec<u8>) -> Result<(), PersistenceError>;
}

impl<S: CardStore> CardStore for Arc<S> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, bytes: Vec<u8>) -> Result<(), PersistenceError> {
        (**self).write(key, bytes)
    }
}

/// Read the cached card, an unreadable or corrupt entry counts as no cache.
pub fn load_cached_card(store: &impl CardStore) -> Option<Card> {
    let bytes = match store.read(CACHE_KEY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            debug!("No cached card");
            return None;
        }
        Err(why) => {
            warn!("Failed to read cached card: {why}");
            return None;
        }
    };

    match serde_json::from_slice::<Card>(&bytes) {
        Ok(card) => Some(card),
        Err(why) => {
            warn!("Discarding corrupt cached card: {why}");
            None
        }
    }
}

/// Overwrite the cached card, failures are logged and otherwise ignored.
pub fn persist_card(store: &impl CardStore, card: &Card) {
    let bytes = match serde_json::to_vec(card) {
        Ok(bytes) => bytes,
        Err(why) => {
            warn!("Failed to serialize card for cache: {why}");
            return;
        }
    };

    if let Err(why) = store.write(CACHE_KEY, bytes) {
        warn!("Failed to persist card: {why}");
    }
}
