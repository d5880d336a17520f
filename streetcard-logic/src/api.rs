use std::{future::Future, sync::Arc};

use thiserror::Error;

use crate::card::Card;

/// Why a card couldn't be fetched. The `Display` text is what gets shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network unreachable, DNS, connection reset, timeout
    #[error("Couldn't reach the card server: {0}")]
    Transport(String),
    /// Any status outside 2xx
    #[error("Server returned an error (HTTP {0})")]
    Server(u16),
    /// Body isn't JSON or doesn't match the card schema
    #[error("Couldn't read the server's response: {0}")]
    Decode(String),
}

pub trait CardApi: Send + Sync {
    /// Request the card for a position, single shot with no retries.
    fn fetch_card(
        &self,
        lat: f64,
        lon: f64,
        acc: f64,
    ) -> impl Future<Output = Result<Card, FetchError>> + Send;
}

impl<A: CardApi> CardApi for Arc<A> {
    fn fetch_card(
        &self,
        lat: f64,
        lon: f64,
        acc: f64,
    ) -> impl Future<Output = Result<Card, FetchError>> + Send {
        (**self).fetch_card(lat, lon, acc)
    }
}
