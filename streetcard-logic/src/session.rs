use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    api::CardApi,
    controller::{CardController, StateUpdateSender, UpdateOutcome},
    location::{LocationPlatform, LocationSource},
    store::CardStore,
};

/// Connects a [LocationSource] to a [CardController], every significant location seen while
/// authorized becomes a card update.
pub struct Session<P, L, A, S, C>
where
    P: LocationPlatform,
    L: StateUpdateSender,
    A: CardApi,
    S: CardStore,
    C: StateUpdateSender,
{
    source: Arc<LocationSource<P, L>>,
    controller: Arc<CardController<A, S, C>>,
    cancel: CancellationToken,
}

fn log_outcome(outcome: UpdateOutcome) {
    match outcome {
        UpdateOutcome::Updated => info!("Card updated"),
        UpdateOutcome::Failed(why) => warn!("Card update failed: {why}"),
        other => debug!("Card update finished: {other:?}"),
    }
}

impl<P, L, A, S, C> Session<P, L, A, S, C>
where
    P: LocationPlatform + 'static,
    L: StateUpdateSender + 'static,
    A: CardApi + 'static,
    S: CardStore + 'static,
    C: StateUpdateSender + 'static,
{
    pub fn new(
        source: Arc<LocationSource<P, L>>,
        controller: Arc<CardController<A, S, C>>,
    ) -> Self {
        Self {
            source,
            controller,
            cancel: CancellationToken::new(),
        }
    }

    pub fn source(&self) -> &Arc<LocationSource<P, L>> {
        &self.source
    }

    pub fn controller(&self) -> &Arc<CardController<A, S, C>> {
        &self.controller
    }

    pub fn quit(&self) {
        self.cancel.cancel();
    }

    /// Main loop of the session, runs until [Session::quit] is called or the platform stops
    /// sending locations. Updates still in flight when the platform stops are waited on, on quit
    /// they're aborted and the card goes back to how it was before them.
    pub async fn main_loop(&self) {
        let mut updates = JoinSet::new();

        'session: loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    updates.abort_all();
                    self.controller.abandon_inflight().await;
                    break 'session;
                }

                next = self.source.next_significant() => {
                    let Some(position) = next else {
                        while let Some(res) = updates.join_next().await {
                            if let Ok(outcome) = res {
                                log_outcome(outcome);
                            }
                        }
                        break 'session;
                    };

                    // Losing authorization only stops new fetches, one already running finishes
                    if !self.source.authorization().await.is_authorized() {
                        debug!("Ignoring significant location while unauthorized");
                        continue 'session;
                    }

                    let controller = self.controller.clone();
                    updates.spawn(async move { controller.update(position).await });

                    while let Some(res) = updates.try_join_next() {
                        if let Ok(outcome) = res {
                            log_outcome(outcome);
                        }
                    }
                }
            }
        }

        info!("Session ended");
    }
}
