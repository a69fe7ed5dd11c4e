//! Error types for the geo-broker crate.
//!
//! Two families live here. [`BrokerError`] is returned from broker API calls
//! and never reaches a sink. [`LocationError`] is the payload handed to a
//! [`ResultSink`](crate::ResultSink) when a subscription fails.

use serde::{Deserialize, Serialize};

/// Errors returned by [`LocationBroker`](crate::LocationBroker) operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The timeout scheduler runtime could not be created
    #[error("Failed to start timeout scheduler: {0}")]
    SchedulerStartup(#[from] std::io::Error),

    /// The timeout scheduler worker is no longer accepting commands
    #[error("Timeout scheduler is not running")]
    SchedulerUnavailable,

    /// The broker has been torn down and accepts no new subscriptions
    #[error("Location broker has been torn down")]
    TornDown,
}

/// Convenience type alias for Results using BrokerError.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Failure codes delivered to result sinks.
///
/// The numeric values follow the W3C geolocation `PositionError` codes.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ErrorCode {
    /// The platform refused access to location data
    PermissionDenied,
    /// No position could be obtained
    PositionUnavailable,
    /// A one-shot request reached its deadline
    Timeout,
}

impl ErrorCode {
    /// Numeric code as exposed to callers.
    pub fn code(self) -> u8 {
        match self {
            Self::PermissionDenied => 1,
            Self::PositionUnavailable => 2,
            Self::Timeout => 3,
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::PermissionDenied),
            2 => Ok(Self::PositionUnavailable),
            3 => Ok(Self::Timeout),
            other => Err(format!("unknown location error code: {other}")),
        }
    }
}

/// Failure payload routed to result sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code:?} ({}): {message}", .code.code())]
pub struct LocationError {
    pub code: ErrorCode,
    pub message: String,
}

impl LocationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The failure raised by the broker's own timer.
    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "Unable to retrieve position")
    }

    /// Render as `{ "code": n, "message": "..." }`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code.code(),
            "message": self.message,
        })
    }
}
