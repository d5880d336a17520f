mod api;
mod card;
mod controller;
mod location;
mod session;
mod settings;
mod store;

pub use api::{CardApi, FetchError};
pub use card::{Card, FactSource, NearbyItem};
pub use controller::{CardController, CardPhase, CardUiState, StateUpdateSender, UpdateOutcome};
pub use location::{
    AuthorizationState, LocationEvent, LocationEventTx, LocationPlatform, LocationSource,
    MovementGate, Position, distance_m,
};
pub use session::Session;
pub use settings::CardSettings;
pub use store::{CACHE_KEY, CardStore, PersistenceError, load_cached_card, persist_card};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
