//! Core types for the geo-broker crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Caller-supplied identifier for a watch.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct WatchId(pub String);

impl WatchId {
    /// Create a new watch ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the watch ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for WatchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for WatchId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle for a one-shot position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Whether the underlying location stream is currently emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Stopped,
    Running,
}

impl StreamState {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// A single position fix.
///
/// `heading` is only present when the source reported both a bearing and a
/// speed. `speed` falls back to 0 when unknown and serializes as `velocity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f64,
    pub heading: Option<f64>,
    #[serde(rename = "velocity")]
    pub speed: f64,
    /// Fix time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy,
            heading: None,
            speed: 0.0,
            timestamp,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    /// Attach motion data as reported by the platform.
    ///
    /// A bearing without a speed is discarded.
    pub fn with_motion(mut self, bearing: Option<f64>, speed: Option<f64>) -> Self {
        self.heading = match (bearing, speed) {
            (Some(bearing), Some(_)) => Some(bearing),
            _ => None,
        };
        self.speed = speed.unwrap_or(0.0);
        self
    }

    /// Age of this fix relative to `now_millis`. Fixes from the future are age zero.
    pub fn age_at(&self, now_millis: i64) -> Duration {
        let delta = now_millis.saturating_sub(self.timestamp).max(0);
        Duration::from_millis(delta as u64)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "latitude": self.latitude,
            "longitude": self.longitude,
            "altitude": self.altitude,
            "accuracy": self.accuracy,
            "heading": self.heading,
            "velocity": self.speed,
            "timestamp": self.timestamp,
        })
    }
}

/// Accuracy/power trade-off requested from the location source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    HighAccuracy,
    Balanced,
    LowPower,
}

/// Parameters handed to [`LocationSource::start`](crate::LocationSource::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub interval: Duration,
    pub fastest_interval: Duration,
    pub priority: Priority,
}

/// Options for [`LocationBroker::get_current_position`](crate::LocationBroker::get_current_position).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Oldest cached fix that may satisfy the request without waiting
    pub maximum_age: Duration,
    /// Deadline for a fresh fix
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            maximum_age: Duration::ZERO,
            timeout: Duration::from_millis(60_000),
        }
    }
}

impl PositionOptions {
    pub fn new(maximum_age: Duration, timeout: Duration) -> Self {
        Self {
            maximum_age,
            timeout,
        }
    }
}

/// How a current-position request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentPosition {
    /// A cached fix was delivered immediately
    Cached,
    /// A one-shot request is waiting for the next fix
    Pending(RequestId),
}
