use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, specta::Type)]
/// Tunables for when the client decides to ask for a new card
pub struct CardSettings {
    /// Distance in meters the device must move from the last significant position before a new
    /// card is requested
    pub movement_gate_m: f64,
    /// Coarse filter in meters for raw position updates, platforms that can't filter updates
    /// themselves apply this in software
    pub distance_filter_m: f64,
    /// Minimum milliseconds between two accepted card requests
    pub debounce_ms: u32,
    /// Accuracy floor in meters sent to the server
    pub min_accuracy_m: f64,
}

impl CardSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms as u64)
    }
}

impl Default for CardSettings {
    fn default() -> Self {
        Self {
            movement_gate_m: 40.0,
            distance_filter_m: 10.0,
            debounce_ms: 2000,
            min_accuracy_m: 10.0,
        }
    }
}
