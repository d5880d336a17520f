use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    api::{CardApi, FetchError},
    card::Card,
    location::Position,
    settings::CardSettings,
    store::{CardStore, load_cached_card, persist_card},
};

pub trait StateUpdateSender: Send + Sync {
    fn send_update(&self);
}

impl<U: StateUpdateSender> StateUpdateSender for Arc<U> {
    fn send_update(&self) {
        (**self).send_update();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
pub enum CardPhase {
    /// Nothing fetched since startup, card (if any) came from the cache
    Idle,
    /// A request is outstanding, the previous card is still shown
    Fetching,
    /// Card is fresh from the server
    Ready,
    /// Last request failed, card (if any) is from before that request
    StaleError,
}

/// Everything the UI needs to render the card screen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
pub struct CardUiState {
    pub card: Option<Card>,
    pub error: Option<String>,
    pub fetching: bool,
    pub phase: CardPhase,
}

/// What a call to [CardController::update] ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Too soon after the last accepted update, nothing happened
    Debounced,
    /// A newer update started before this one finished, its result was thrown away
    Superseded,
    /// New card fetched and shown
    Updated,
    /// Fetch failed, the previous card stays
    Failed(FetchError),
}

struct ControllerState {
    card: Option<Card>,
    error: Option<String>,
    phase: CardPhase,
    last_attempt: Option<Instant>,
    /// Bumped on every accepted update, only the latest may write results
    generation: u64,
    inflight: Option<CancellationToken>,
}

impl ControllerState {
    /// Phase to show when nothing is in flight
    fn settled_phase(&self) -> CardPhase {
        if self.error.is_some() {
            CardPhase::StaleError
        } else if self.card.is_some() {
            CardPhase::Ready
        } else {
            CardPhase::Idle
        }
    }

    fn as_ui_state(&self) -> CardUiState {
        CardUiState {
            card: self.card.clone(),
            error: self.error.clone(),
            fetching: self.phase == CardPhase::Fetching,
            phase: self.phase,
        }
    }
}

/// Owns the card being shown. Decides when a position is worth asking the server about via
/// [CardApi], keeps the last good card on failure, and caches successes in [CardStore].
pub struct CardController<A: CardApi, S: CardStore, U: StateUpdateSender> {
    api: A,
    store: S,
    state_update_sender: U,
    debounce: Duration,
    min_accuracy_m: f64,
    state: Mutex<ControllerState>,
}

impl<A: CardApi, S: CardStore, U: StateUpdateSender> CardController<A, S, U> {
    pub fn new(settings: &CardSettings, api: A, store: S, state_update_sender: U) -> Self {
        let card = load_cached_card(&store);
        let phase = if card.is_some() {
            info!("Showing cached card until the first fetch");
            CardPhase::Ready
        } else {
            CardPhase::Idle
        };

        Self {
            api,
            store,
            state_update_sender,
            debounce: settings.debounce(),
            min_accuracy_m: settings.min_accuracy_m,
            state: Mutex::new(ControllerState {
                card,
                error: None,
                phase,
                last_attempt: None,
                generation: 0,
                inflight: None,
            }),
        }
    }

    pub async fn ui_state(&self) -> CardUiState {
        self.state.lock().await.as_ui_state()
    }

    /// Fetch the card for a new position. Calls closer together than the debounce interval are
    /// dropped, and starting a fetch cancels the one before it.
    pub async fn update(&self, position: Position) -> UpdateOutcome {
        let mut state = self.state.lock().await;

        let now = Instant::now();
        if state
            .last_attempt
            .is_some_and(|last| now.duration_since(last) < self.debounce)
        {
            debug!("Debounced update for {position:?}");
            return UpdateOutcome::Debounced;
        }

        state.last_attempt = Some(now);
        state.generation += 1;
        let generation = state.generation;

        let cancel = CancellationToken::new();
        if let Some(previous) = state.inflight.replace(cancel.clone()) {
            previous.cancel();
        }

        state.phase = CardPhase::Fetching;
        drop(state);
        self.state_update_sender.send_update();

        let acc = position.request_accuracy(self.min_accuracy_m);

        let res = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Fetch {generation} cancelled");
                return UpdateOutcome::Superseded;
            }

            res = self.api.fetch_card(position.lat, position.lon, acc) => res,
        };

        let mut state = self.state.lock().await;

        if state.generation != generation {
            debug!(
                "Discarding result of fetch {generation}, {} is newer",
                state.generation
            );
            return UpdateOutcome::Superseded;
        }

        state.inflight = None;

        let outcome = match res {
            Ok(card) => {
                persist_card(&self.store, &card);
                state.card = Some(card);
                state.error = None;
                state.phase = CardPhase::Ready;
                UpdateOutcome::Updated
            }
            Err(why) => {
                warn!("Failed to fetch card: {why}");
                state.error = Some(why.to_string());
                state.phase = CardPhase::StaleError;
                UpdateOutcome::Failed(why)
            }
        };

        drop(state);
        self.state_update_sender.send_update();

        outcome
    }

    /// Give up on the fetch in progress, if any. Its result is thrown away should it still
    /// arrive, and the phase goes back to what it was before the fetch started.
    pub async fn abandon_inflight(&self) {
        let mut state = self.state.lock().await;
        if let Some(cancel) = state.inflight.take() {
            cancel.cancel();
        }
        if state.phase != CardPhase::Fetching {
            return;
        }
        state.generation += 1;
        state.phase = state.settled_phase();
        drop(state);
        self.state_update_sender.send_update();
    }
}
