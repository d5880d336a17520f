use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use log::{error, warn};
use streetcard_logic::{
    AuthorizationState, LocationEvent, LocationEventTx, LocationPlatform, MovementGate, Position,
    prelude::*,
};
use tauri::{AppHandle, plugin::PermissionState};
use tauri_plugin_geolocation::{GeolocationExt, PermissionType, PositionOptions, WatchEvent};
use tokio::sync::mpsc::error::TrySendError;

pub struct TauriLocation {
    app: AppHandle,
    /// Bumped per started watch, events from older watches are dropped
    stream: Arc<AtomicU64>,
    /// Plugin id of the running watch
    watch: Mutex<Option<u32>>,
}

impl TauriLocation {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            stream: Arc::new(AtomicU64::new(0)),
            watch: Mutex::new(None),
        }
    }

    fn clear_previous_watch(&self) {
        let previous = match self.watch.lock() {
            Ok(mut watch) => watch.take(),
            Err(_) => None,
        };
        if let Some(id) = previous
            && let Err(why) = self.app.geolocation().clear_watch(id)
        {
            warn!("Failed to clear location watch {id}: {why:?}");
        }
    }
}

const OPTIONS: PositionOptions = PositionOptions {
    enable_high_accuracy: true,
    timeout: 10000, // Unused in our case, set to default
    maximum_age: 2000,
};

fn authorization_from(state: PermissionState) -> AuthorizationState {
    match state {
        PermissionState::Granted => AuthorizationState::AuthorizedWhileInUse,
        PermissionState::Denied => AuthorizationState::Denied,
        _ => AuthorizationState::NotDetermined,
    }
}

fn check_authorization(app: &AppHandle) -> AuthorizationState {
    match app.geolocation().check_permissions() {
        Ok(status) => authorization_from(status.location),
        Err(why) => {
            error!("Failed to check location permission: {why:?}");
            AuthorizationState::NotDetermined
        }
    }
}

/// Watch errors are how a revoked permission shows up, report it if that's what happened
fn recheck_after_error(app: AppHandle, events: LocationEventTx) {
    let _ = tauri::async_runtime::spawn_blocking(move || {
        let auth = check_authorization(&app);
        // Watches only run while authorized, so anything else is a change
        if !auth.is_authorized() {
            push(&events, LocationEvent::Authorization(auth));
        }
    });
}

fn push(events: &LocationEventTx, event: LocationEvent) {
    match events.try_send(event) {
        Ok(_) => {}
        Err(TrySendError::Full(event)) => warn!("Location queue full, dropping {event:?}"),
        Err(TrySendError::Closed(_)) => {}
    }
}

impl LocationPlatform for TauriLocation {
    fn authorization(&self) -> AuthorizationState {
        check_authorization(&self.app)
    }

    async fn request_authorization(&self) -> AuthorizationState {
        let app = self.app.clone();
        let res = tauri::async_runtime::spawn_blocking(move || {
            app.geolocation()
                .request_permissions(Some(vec![PermissionType::Location]))
        })
        .await;

        match res {
            Ok(Ok(status)) => authorization_from(status.location),
            Ok(Err(why)) => {
                error!("Failed to request location permission: {why:?}");
                AuthorizationState::NotDetermined
            }
            Err(why) => {
                error!("Location permission request panicked: {why:?}");
                AuthorizationState::NotDetermined
            }
        }
    }

    fn start_updates(&self, events: LocationEventTx, distance_filter_m: f64) -> Result {
        self.clear_previous_watch();

        let app = self.app.clone();
        let stream = self.stream.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.stream.clone();
        // The plugin has no distance filter of its own
        let filter = Mutex::new(MovementGate::new(distance_filter_m));

        let id = self
            .app
            .geolocation()
            .watch_position(OPTIONS, move |event| {
                if current.load(Ordering::SeqCst) != stream {
                    return;
                }
                match event {
                    WatchEvent::Position(pos) => {
                        let coords = pos.coords;
                        let pos = Position::new(coords.latitude, coords.longitude, coords.accuracy);
                        let passes = filter
                            .lock()
                            .map(|mut filter| filter.offer(pos).is_some())
                            .unwrap_or(true);
                        if passes {
                            push(&events, LocationEvent::Position(pos));
                        }
                    }
                    WatchEvent::Error(why) => {
                        push(&events, LocationEvent::Error(why));
                        recheck_after_error(app.clone(), events.clone());
                    }
                }
            })
            .context("Failed to watch position")?;

        if let Ok(mut watch) = self.watch.lock() {
            *watch = Some(id);
        }

        Ok(())
    }
}
