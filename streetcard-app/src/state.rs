use std::{marker::PhantomData, sync::Arc};

use log::{error, info};
use serde::{Deserialize, Serialize};
use streetcard_logic::{
    AuthorizationState, CardController, CardSettings, LocationSource, Position, Session,
    StateUpdateSender, prelude::*,
};
use streetcard_transport::HttpCardApi;
use tauri::AppHandle;
use tauri_specta::Event;

use crate::{cache::TauriCardStore, location::TauriLocation};

/// The card, its error or the fetching indicator changed
#[derive(Serialize, Deserialize, Clone, Default, Debug, specta::Type, tauri_specta::Event)]
pub struct CardStateUpdate;

/// Location authorization or the last known position changed
#[derive(Serialize, Deserialize, Clone, Default, Debug, specta::Type, tauri_specta::Event)]
pub struct LocationUpdate;

pub struct TauriStateUpdateSender<E: Clone + Default + Event + Serialize>(
    AppHandle,
    PhantomData<E>,
);

impl<E: Serialize + Clone + Default + Event> TauriStateUpdateSender<E> {
    fn new(app: &AppHandle) -> Self {
        Self(app.clone(), PhantomData)
    }
}

impl<E: Serialize + Clone + Default + Event + Send + Sync> StateUpdateSender
    for TauriStateUpdateSender<E>
{
    fn send_update(&self) {
        if let Err(why) = E::default().emit(&self.0) {
            error!("Error sending state update to UI: {why:?}");
        }
    }
}

type Source = LocationSource<TauriLocation, TauriStateUpdateSender<LocationUpdate>>;
type Controller =
    CardController<HttpCardApi, TauriCardStore, TauriStateUpdateSender<CardStateUpdate>>;

pub type AppSession = Session<
    TauriLocation,
    TauriStateUpdateSender<LocationUpdate>,
    HttpCardApi,
    TauriCardStore,
    TauriStateUpdateSender<CardStateUpdate>,
>;

pub type AppStateHandle = Arc<AppSession>;

/// What the UI needs to know about location access
#[derive(Serialize, Deserialize, specta::Type, Debug, Clone, PartialEq)]
pub struct LocationUiState {
    pub authorization: AuthorizationState,
    pub authorized: bool,
    /// Human readable name of `authorization`
    pub status_text: String,
    pub last_position: Option<Position>,
}

pub async fn location_ui_state(session: &AppSession) -> LocationUiState {
    let source = session.source();
    let authorization = source.authorization().await;
    LocationUiState {
        authorization,
        authorized: authorization.is_authorized(),
        status_text: authorization.to_string(),
        last_position: source.last_position().await,
    }
}

pub fn create_session(app: &AppHandle) -> Result<AppStateHandle> {
    let settings = CardSettings::default();
    let api = HttpCardApi::from_build_env().context("Failed to set up card API")?;
    info!("Using card server at {}", api.base_url());

    let source: Source = LocationSource::new(
        TauriLocation::new(app.clone()),
        &settings,
        TauriStateUpdateSender::new(app),
    );
    let controller: Controller = CardController::new(
        &settings,
        api,
        TauriCardStore::new(app.clone()),
        TauriStateUpdateSender::new(app),
    );

    Ok(Arc::new(Session::new(Arc::new(source), Arc::new(controller))))
}

/// Run the session in the background, starting location updates right away if we already have
/// permission
pub fn session_loop(session: AppStateHandle) {
    tauri::async_runtime::spawn(async move {
        if session.source().authorization().await.is_authorized() {
            session.source().request_permission_and_start().await;
        }
        session.main_loop().await;
    });
}
