use std::{fs, path::Path, time::Duration};

use log::debug;
use serde::{Deserialize, Serialize};
use streetcard_logic::{
    AuthorizationState, LocationEvent, LocationEventTx, LocationPlatform, MovementGate, Position,
};

use crate::prelude::*;

fn default_accuracy() -> f64 {
    10.0
}

/// One recorded fix of a walk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
    /// Time since the previous point (or since updates started for the first one)
    #[serde(default)]
    pub after_ms: u64,
}

impl TrackPoint {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lon, self.accuracy)
    }
}

/// Read a track file, a JSON array of [TrackPoint]s
pub fn load_track(path: &Path) -> Result<Vec<TrackPoint>> {
    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let points: Vec<TrackPoint> =
        serde_json::from_slice(&raw).context("Failed to parse track file")?;
    if points.is_empty() {
        bail!("Track {} has no points", path.display());
    }
    Ok(points)
}

/// Location platform that plays back a recorded track, always authorized
pub struct TrackPlatform {
    points: Vec<TrackPoint>,
    speed: f64,
}

impl TrackPlatform {
    /// `speed` scales playback, 2.0 replays twice as fast as recorded
    pub fn new(points: Vec<TrackPoint>, speed: f64) -> Result<Self> {
        if !(speed.is_finite() && speed > 0.0) {
            bail!("Replay speed must be a positive number, got {speed}");
        }
        Ok(Self { points, speed })
    }
}

impl LocationPlatform for TrackPlatform {
    fn authorization(&self) -> AuthorizationState {
        AuthorizationState::AuthorizedWhileInUse
    }

    async fn request_authorization(&self) -> AuthorizationState {
        AuthorizationState::AuthorizedWhileInUse
    }

    fn start_updates(&self, events: LocationEventTx, distance_filter_m: f64) -> Result {
        let points = self.points.clone();
        let speed = self.speed;

        tokio::spawn(async move {
            let mut filter = MovementGate::new(distance_filter_m);
            for point in points {
                tokio::time::sleep(Duration::from_millis(point.after_ms).div_f64(speed)).await;
                let Some(pos) = filter.offer(point.position()) else {
                    debug!("Track point {point:?} within distance filter");
                    continue;
                };
                if events.send(LocationEvent::Position(pos)).await.is_err() {
                    return;
                }
            }
            let _ = events.send(LocationEvent::Stopped).await;
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::{sync::mpsc, test};

    use super::*;

    #[test]
    async fn test_parse_defaults() {
        let points: Vec<TrackPoint> = serde_json::from_str(
            r#"[{"lat": 40.7, "lon": -74.0}, {"lat": 40.71, "lon": -74.0, "accuracy": 4.5, "after_ms": 3000}]"#,
        )
        .unwrap();

        assert_eq!(points[0].accuracy, 10.0);
        assert_eq!(points[0].after_ms, 0);
        assert_eq!(points[1].position(), Position::new(40.71, -74.0, 4.5));
    }

    #[test]
    async fn test_bad_speed() {
        assert!(TrackPlatform::new(vec![], 0.0).is_err());
        assert!(TrackPlatform::new(vec![], f64::NAN).is_err());
        assert!(TrackPlatform::new(vec![], 0.5).is_ok());
    }

    #[test]
    async fn test_replay() {
        tokio::time::pause();

        let points = vec![
            TrackPoint {
                lat: 40.7291,
                lon: -73.9965,
                accuracy: 5.0,
                after_ms: 0,
            },
            // ~3m north, inside the filter
            TrackPoint {
                lat: 40.72913,
                lon: -73.9965,
                accuracy: 5.0,
                after_ms: 1000,
            },
            // ~55m north
            TrackPoint {
                lat: 40.7296,
                lon: -73.9965,
                accuracy: 5.0,
                after_ms: 4000,
            },
        ];
        let platform = TrackPlatform::new(points.clone(), 2.0).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let started = tokio::time::Instant::now();
        platform.start_updates(tx, 10.0).unwrap();

        assert_eq!(
            rx.recv().await,
            Some(LocationEvent::Position(points[0].position()))
        );
        assert_eq!(
            rx.recv().await,
            Some(LocationEvent::Position(points[2].position()))
        );
        // Half of the recorded 5s, each paused sleep may round up a tick
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(2500) && elapsed < Duration::from_millis(2510),
            "Replay took {elapsed:?}"
        );
        assert_eq!(rx.recv().await, Some(LocationEvent::Stopped));
        assert_eq!(rx.recv().await, None);
    }
}
