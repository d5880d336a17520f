use std::{fmt, future::Future, sync::Arc};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};

use crate::{controller::StateUpdateSender, prelude::*, settings::CardSettings};

/// A "part" of a location
pub type LocationComponent = f64;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, specta::Type)]
/// One position sample as reported by the platform
pub struct Position {
    /// Latitude in degrees
    pub lat: LocationComponent,
    /// Longitude in degrees
    pub lon: LocationComponent,
    /// Horizontal accuracy in meters
    pub accuracy: LocationComponent,
}

impl Position {
    pub fn new(lat: LocationComponent, lon: LocationComponent, accuracy: LocationComponent) -> Self {
        Self { lat, lon, accuracy }
    }

    /// Accuracy to send to the card server, never below `floor`
    pub fn request_accuracy(&self, floor: LocationComponent) -> LocationComponent {
        self.accuracy.max(floor)
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        distance_m(self, other)
    }
}

/// Great-circle distance in meters between two positions (haversine)
pub fn distance_m(from: &Position, to: &Position) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lon = (to.lon - from.lon).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, specta::Type)]
/// Whether the user lets us read their location
pub enum AuthorizationState {
    #[default]
    NotDetermined,
    Denied,
    Restricted,
    AuthorizedWhileInUse,
    AuthorizedAlways,
}

impl AuthorizationState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::AuthorizedWhileInUse | Self::AuthorizedAlways)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDetermined => "notDetermined",
            Self::Denied => "denied",
            Self::Restricted => "restricted",
            Self::AuthorizedWhileInUse => "authorizedWhenInUse",
            Self::AuthorizedAlways => "authorizedAlways",
        }
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lets a position through only once it's at least `threshold_m` away from the last one let
/// through. The first position always passes.
#[derive(Debug, Clone)]
pub struct MovementGate {
    threshold_m: f64,
    last: Option<Position>,
}

impl MovementGate {
    pub fn new(threshold_m: f64) -> Self {
        Self {
            threshold_m,
            last: None,
        }
    }

    pub fn offer(&mut self, pos: Position) -> Option<Position> {
        let passes = self
            .last
            .is_none_or(|last| distance_m(&last, &pos) >= self.threshold_m);

        if passes {
            self.last = Some(pos);
            Some(pos)
        } else {
            None
        }
    }

    pub fn last(&self) -> Option<Position> {
        self.last
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// The platform's authorization changed
    Authorization(AuthorizationState),
    /// New raw position, already coarsely filtered
    Position(Position),
    /// The platform failed to get a position, the stream keeps going
    Error(String),
    /// The platform won't send any more events, used to help consumers know when to stop
    Stopped,
}

pub type LocationEventTx = mpsc::Sender<LocationEvent>;
type LocationEventRx = mpsc::Receiver<LocationEvent>;

/// Positioning service of the device
pub trait LocationPlatform: Send + Sync {
    /// Authorization as currently known to the platform
    fn authorization(&self) -> AuthorizationState;
    /// Prompt the user for permission if the platform allows it, returns the resulting state
    fn request_authorization(&self) -> impl Future<Output = AuthorizationState> + Send;
    /// Begin pushing [LocationEvent]s into `events`. Updates closer than `distance_filter_m` to
    /// the previously pushed position shouldn't be pushed. Called again after authorization is
    /// regained, implementations should replace any previous stream.
    fn start_updates(&self, events: LocationEventTx, distance_filter_m: f64) -> Result;
}

impl<P: LocationPlatform> LocationPlatform for Arc<P> {
    fn authorization(&self) -> AuthorizationState {
        (**self).authorization()
    }

    fn request_authorization(&self) -> impl Future<Output = AuthorizationState> + Send {
        (**self).request_authorization()
    }

    fn start_updates(&self, events: LocationEventTx, distance_filter_m: f64) -> Result {
        (**self).start_updates(events, distance_filter_m)
    }
}

struct SourceState {
    authorization: AuthorizationState,
    updating: bool,
    last_position: Option<Position>,
    gate: MovementGate,
}

/// Turns the platform's raw location feed into significant-location events.
pub struct LocationSource<P: LocationPlatform, U: StateUpdateSender> {
    platform: P,
    distance_filter_m: f64,
    state: Mutex<SourceState>,
    events: (LocationEventTx, Mutex<LocationEventRx>),
    state_updates: U,
}

impl<P: LocationPlatform, U: StateUpdateSender> LocationSource<P, U> {
    pub fn new(platform: P, settings: &CardSettings, state_updates: U) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let authorization = platform.authorization();
        Self {
            platform,
            distance_filter_m: settings.distance_filter_m,
            state: Mutex::new(SourceState {
                authorization,
                updating: false,
                last_position: None,
                gate: MovementGate::new(settings.movement_gate_m),
            }),
            events: (tx, Mutex::new(rx)),
            state_updates,
        }
    }

    pub async fn authorization(&self) -> AuthorizationState {
        self.state.lock().await.authorization
    }

    /// Last raw position, significant or not
    pub async fn last_position(&self) -> Option<Position> {
        self.state.lock().await.last_position
    }

    pub async fn last_significant(&self) -> Option<Position> {
        self.state.lock().await.gate.last()
    }

    /// Ask for permission (if needed) and start updates once authorized. Safe to call repeatedly,
    /// only one update stream is ever started per authorization.
    pub async fn request_permission_and_start(&self) {
        let current = self.authorization().await;
        let auth = if current.is_authorized() {
            current
        } else {
            self.platform.request_authorization().await
        };
        self.handle_authorization(auth).await;
    }

    /// Re-read authorization from the platform, for when it may have changed behind our back
    /// (e.g. the user went to the system settings). Starts or stops updates to match.
    pub async fn refresh_authorization(&self) {
        let auth = self.platform.authorization();
        self.handle_authorization(auth).await;
    }

    async fn handle_authorization(&self, auth: AuthorizationState) {
        let mut state = self.state.lock().await;
        let changed = state.authorization != auth;
        state.authorization = auth;

        if changed {
            info!("Location authorization is now {auth}");
        }

        if auth.is_authorized() {
            if !state.updating {
                match self
                    .platform
                    .start_updates(self.events.0.clone(), self.distance_filter_m)
                {
                    Ok(_) => {
                        debug!("Started location updates");
                        state.updating = true;
                    }
                    Err(why) => {
                        warn!("Failed to start location updates: {why:?}");
                    }
                }
            }
        } else {
            state.updating = false;
        }

        drop(state);

        if changed {
            self.state_updates.send_update();
        }
    }

    /// Wait for the next significant position. Authorization changes and errors that arrive in
    /// the meantime are handled along the way. Returns `None` once the platform stops.
    pub async fn next_significant(&self) -> Option<Position> {
        let mut rx = self.events.1.lock().await;
        loop {
            match rx.recv().await? {
                LocationEvent::Authorization(auth) => self.handle_authorization(auth).await,
                LocationEvent::Error(why) => {
                    warn!("Location error: {why}");
                }
                LocationEvent::Stopped => {
                    info!("Location updates stopped");
                    return None;
                }
                LocationEvent::Position(pos) => {
                    let mut state = self.state.lock().await;
                    state.last_position = Some(pos);
                    let significant = state.gate.offer(pos);
                    drop(state);
                    self.state_updates.send_update();
                    if significant.is_some() {
                        return significant;
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn event_sender(&self) -> LocationEventTx {
        self.events.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{CountingSender, DummySender, MockPlatform};

    /// Move `meters` north of `pos`
    fn north(pos: Position, meters: f64) -> Position {
        let dlat = (meters / EARTH_RADIUS_M).to_degrees();
        Position::new(pos.lat + dlat, pos.lon, pos.accuracy)
    }

    const ORIGIN: Position = Position {
        lat: 40.7291,
        lon: -73.9965,
        accuracy: 5.0,
    };

    #[test]
    fn test_distance() {
        assert_eq!(distance_m(&ORIGIN, &ORIGIN), 0.0);

        let moved = north(ORIGIN, 50.0);
        assert!((distance_m(&ORIGIN, &moved) - 50.0).abs() < 0.01);
        assert!((moved.distance_to(&ORIGIN) - 50.0).abs() < 0.01);

        // One degree of longitude at the equator
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(0.0, 1.0, 0.0);
        assert!((distance_m(&a, &b) - 111_195.0).abs() < 10.0);
    }

    #[test]
    fn test_request_accuracy() {
        assert_eq!(ORIGIN.request_accuracy(10.0), 10.0);
        assert_eq!(Position::new(0.0, 0.0, 65.0).request_accuracy(10.0), 65.0);
    }

    #[test]
    fn test_gate_first_passes() {
        let mut gate = MovementGate::new(40.0);
        assert_eq!(gate.last(), None);
        assert_eq!(gate.offer(ORIGIN), Some(ORIGIN));
        assert_eq!(gate.last(), Some(ORIGIN));
    }

    #[test]
    fn test_gate_measures_from_last_significant() {
        let mut gate = MovementGate::new(40.0);
        gate.offer(ORIGIN);

        // 30m steps, only every other step is 40m+ from the last emitted position
        let p1 = north(ORIGIN, 30.0);
        let p2 = north(ORIGIN, 60.0);
        let p3 = north(ORIGIN, 90.0);
        let p4 = north(ORIGIN, 120.0);

        assert_eq!(gate.offer(p1), None);
        assert_eq!(gate.offer(p2), Some(p2));
        assert_eq!(gate.offer(p3), None);
        assert_eq!(gate.last(), Some(p2));
        assert_eq!(gate.offer(p4), Some(p4));
    }

    #[test]
    fn test_gate_threshold_inclusive() {
        let mut gate = MovementGate::new(40.0);
        gate.offer(ORIGIN);
        assert_eq!(gate.offer(north(ORIGIN, 39.9)), None);
        let edge = north(ORIGIN, 40.01);
        assert_eq!(gate.offer(edge), Some(edge));
    }

    #[test]
    fn test_gate_jitter_never_emits() {
        let mut gate = MovementGate::new(40.0);
        gate.offer(ORIGIN);
        for i in 0..50 {
            let jitter = if i % 2 == 0 { 15.0 } else { -15.0 };
            assert_eq!(gate.offer(north(ORIGIN, jitter)), None);
        }
    }

    type TestSource = LocationSource<Arc<MockPlatform>, DummySender>;

    fn mk_source(platform: Arc<MockPlatform>) -> TestSource {
        LocationSource::new(platform, &CardSettings::default(), DummySender)
    }

    #[tokio::test]
    async fn test_start_when_granted() {
        let platform = Arc::new(MockPlatform::new(
            AuthorizationState::NotDetermined,
            AuthorizationState::AuthorizedWhileInUse,
        ));
        let source = mk_source(platform.clone());

        source.request_permission_and_start().await;

        assert_eq!(platform.requests(), 1);
        assert_eq!(platform.starts(), 1);
        assert_eq!(
            source.authorization().await,
            AuthorizationState::AuthorizedWhileInUse
        );
        assert_eq!(platform.last_filter(), Some(10.0));
    }

    #[tokio::test]
    async fn test_start_idempotent() {
        let platform = Arc::new(MockPlatform::new(
            AuthorizationState::AuthorizedAlways,
            AuthorizationState::AuthorizedAlways,
        ));
        let source = mk_source(platform.clone());

        source.request_permission_and_start().await;
        source.request_permission_and_start().await;
        source.request_permission_and_start().await;

        assert_eq!(platform.requests(), 0, "Asked for permission we already had");
        assert_eq!(platform.starts(), 1);
    }

    #[tokio::test]
    async fn test_denied_never_starts() {
        let platform = Arc::new(MockPlatform::new(
            AuthorizationState::NotDetermined,
            AuthorizationState::Denied,
        ));
        let source = mk_source(platform.clone());

        source.request_permission_and_start().await;

        assert_eq!(platform.starts(), 0);
        assert_eq!(source.authorization().await, AuthorizationState::Denied);
    }

    #[tokio::test]
    async fn test_authorization_event_starts_updates() {
        let platform = Arc::new(MockPlatform::new(
            AuthorizationState::NotDetermined,
            AuthorizationState::NotDetermined,
        ));
        let source = mk_source(platform.clone());
        let tx = source.event_sender();

        tx.send(LocationEvent::Authorization(AuthorizationState::AuthorizedAlways))
            .await
            .unwrap();
        tx.send(LocationEvent::Position(ORIGIN)).await.unwrap();

        assert_eq!(source.next_significant().await, Some(ORIGIN));
        assert_eq!(platform.starts(), 1);

        // Losing and regaining authorization restarts updates
        tx.send(LocationEvent::Authorization(AuthorizationState::Denied))
            .await
            .unwrap();
        tx.send(LocationEvent::Authorization(AuthorizationState::AuthorizedWhileInUse))
            .await
            .unwrap();
        tx.send(LocationEvent::Stopped).await.unwrap();

        assert_eq!(source.next_significant().await, None);
        assert_eq!(platform.starts(), 2);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_settings_change() {
        let platform = Arc::new(MockPlatform::new(
            AuthorizationState::Denied,
            AuthorizationState::Denied,
        ));
        let updates = Arc::new(CountingSender::default());
        let source =
            LocationSource::new(platform.clone(), &CardSettings::default(), updates.clone());

        // Nothing changed, nothing to report
        source.refresh_authorization().await;
        assert_eq!(updates.count(), 0);
        assert_eq!(platform.starts(), 0);

        platform.set_current(AuthorizationState::AuthorizedWhileInUse);
        source.refresh_authorization().await;
        assert_eq!(updates.count(), 1);
        assert_eq!(platform.starts(), 1);
        assert!(source.authorization().await.is_authorized());

        platform.set_current(AuthorizationState::Denied);
        source.refresh_authorization().await;
        assert_eq!(source.authorization().await, AuthorizationState::Denied);

        platform.set_current(AuthorizationState::AuthorizedAlways);
        source.refresh_authorization().await;
        assert_eq!(updates.count(), 3);
        assert_eq!(platform.starts(), 2);
        assert_eq!(platform.requests(), 0);
    }

    #[tokio::test]
    async fn test_significant_stream() {
        let platform = Arc::new(MockPlatform::new(
            AuthorizationState::AuthorizedWhileInUse,
            AuthorizationState::AuthorizedWhileInUse,
        ));
        let source = mk_source(platform);
        let tx = source.event_sender();

        let near = north(ORIGIN, 5.0);
        let far = north(ORIGIN, 50.0);

        for event in [
            LocationEvent::Position(ORIGIN),
            LocationEvent::Position(near),
            LocationEvent::Error("kCLErrorLocationUnknown".to_string()),
            LocationEvent::Position(far),
            LocationEvent::Stopped,
        ] {
            tx.send(event).await.unwrap();
        }

        assert_eq!(source.next_significant().await, Some(ORIGIN));
        assert_eq!(source.next_significant().await, Some(far));
        assert_eq!(source.last_position().await, Some(far));
        assert_eq!(source.last_significant().await, Some(far));
        assert_eq!(source.next_significant().await, None);
    }

    #[tokio::test]
    async fn test_last_position_tracks_suppressed() {
        let platform = Arc::new(MockPlatform::new(
            AuthorizationState::AuthorizedWhileInUse,
            AuthorizationState::AuthorizedWhileInUse,
        ));
        let source = mk_source(platform);
        let tx = source.event_sender();
        let near = north(ORIGIN, 12.0);

        tx.send(LocationEvent::Position(ORIGIN)).await.unwrap();
        tx.send(LocationEvent::Position(near)).await.unwrap();
        tx.send(LocationEvent::Stopped).await.unwrap();

        assert_eq!(source.next_significant().await, Some(ORIGIN));
        assert_eq!(source.next_significant().await, None);
        assert_eq!(source.last_position().await, Some(near));
        assert_eq!(source.last_significant().await, Some(ORIGIN));
    }
}
