use log::info;
use streetcard_logic::StateUpdateSender;

mod store;
mod track;

pub use store::FileStore;
pub use track::{TrackPlatform, TrackPoint, load_track};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

/// Logs whenever the given piece of state changes
pub struct LogUpdateSender(pub &'static str);

impl StateUpdateSender for LogUpdateSender {
    fn send_update(&self) {
        info!("{} state changed", self.0);
    }
}
