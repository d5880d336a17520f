mod cache;
mod location;
mod state;

use log::LevelFilter;
use streetcard_logic::CardUiState;
use tauri::{AppHandle, Manager, RunEvent, State};
use tauri_plugin_opener::OpenerExt;
use tauri_specta::{ErrorHandlingMode, collect_commands, collect_events};

use std::result::Result as StdResult;

use crate::state::{
    AppStateHandle, CardStateUpdate, LocationUiState, LocationUpdate, create_session,
    location_ui_state, session_loop,
};

type Result<T = (), E = String> = StdResult<T, E>;

#[tauri::command]
#[specta::specta]
/// Get the card to show along with any error and whether a new one is being fetched, call after
/// receiving a [CardStateUpdate]
async fn get_card_state(state: State<'_, AppStateHandle>) -> Result<CardUiState> {
    Ok(state.controller().ui_state().await)
}

#[tauri::command]
#[specta::specta]
/// Get location authorization and the last known position, call after receiving a
/// [LocationUpdate]
async fn get_location_state(state: State<'_, AppStateHandle>) -> Result<LocationUiState> {
    Ok(location_ui_state(&state).await)
}

#[tauri::command]
#[specta::specta]
/// Ask for location permission if needed and start tracking. Safe to call more than once.
async fn request_location(state: State<'_, AppStateHandle>) -> Result {
    state.source().request_permission_and_start().await;
    Ok(())
}

#[tauri::command]
#[specta::specta]
/// Open the source of the current card's trivia in the browser
async fn open_fact_source(app: AppHandle, state: State<'_, AppStateHandle>) -> Result {
    let ui_state = state.controller().ui_state().await;
    let url = ui_state
        .card
        .as_ref()
        .and_then(|card| card.fact_url())
        .ok_or_else(|| "This card has no source".to_string())?;

    app.opener()
        .open_url(url, None::<&str>)
        .map_err(|err| err.to_string())
}

pub fn mk_specta() -> tauri_specta::Builder {
    tauri_specta::Builder::<tauri::Wry>::new()
        .error_handling(ErrorHandlingMode::Throw)
        .commands(collect_commands![
            get_card_state,
            get_location_state,
            request_location,
            open_fact_source,
        ])
        .events(collect_events![CardStateUpdate, LocationUpdate])
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let builder = mk_specta();

    tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(LevelFilter::Debug)
                .build(),
        )
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_geolocation::init())
        .plugin(tauri_plugin_store::Builder::default().build())
        .invoke_handler(builder.invoke_handler())
        .setup(move |app| {
            builder.mount_events(app);

            let session = create_session(app.handle())?;
            app.manage(session.clone());
            session_loop(session);
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            // Permission may have been changed in the system settings while we were away
            if let RunEvent::Resumed = event
                && let Some(session) = app.try_state::<AppStateHandle>()
            {
                let session = session.inner().clone();
                tauri::async_runtime::spawn(async move {
                    session.source().refresh_authorization().await;
                });
            }
        });
}
