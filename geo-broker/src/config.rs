//! Configuration types for the geo-broker crate
//!
//! This module defines the configuration that controls how the broker asks
//! its location source for updates and the defaults applied to
//! current-position requests.

use std::time::Duration;

use crate::types::{PositionOptions, Priority, UpdateRequest};

/// Configuration for the LocationBroker
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Desired interval between position fixes
    /// Default: 5 seconds
    pub update_interval: Duration,

    /// Fastest rate at which the source may deliver fixes
    /// Default: 1 second
    pub fastest_interval: Duration,

    /// Accuracy/power trade-off requested from the source
    /// Default: HighAccuracy
    pub priority: Priority,

    /// Timeout applied to current-position requests without an explicit one
    /// Default: 60 seconds
    pub default_timeout: Duration,

    /// Maximum cached fix age accepted by current-position requests
    /// Default: 0 (always wait for a fresh fix)
    pub default_maximum_age: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
            fastest_interval: Duration::from_secs(1),
            priority: Priority::HighAccuracy,
            default_timeout: Duration::from_secs(60),
            default_maximum_age: Duration::ZERO,
        }
    }
}

impl BrokerConfig {
    /// Create a new BrokerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Frequent, precise fixes
    pub fn high_accuracy() -> Self {
        Self::default()
    }

    /// Infrequent coarse fixes, accepting cached positions up to a minute old
    pub fn battery_saver() -> Self {
        Self {
            update_interval: Duration::from_secs(60),
            fastest_interval: Duration::from_secs(30),
            priority: Priority::LowPower,
            default_maximum_age: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), crate::BrokerError> {
        if self.update_interval == Duration::ZERO {
            return Err(crate::BrokerError::Configuration(
                "Update interval must be greater than 0".to_string(),
            ));
        }

        if self.fastest_interval == Duration::ZERO {
            return Err(crate::BrokerError::Configuration(
                "Fastest interval must be greater than 0".to_string(),
            ));
        }

        if self.fastest_interval > self.update_interval {
            return Err(crate::BrokerError::Configuration(
                "Invalid intervals: fastest interval must not exceed update interval".to_string(),
            ));
        }

        Ok(())
    }

    /// The request handed to the location source on start.
    pub fn update_request(&self) -> UpdateRequest {
        UpdateRequest {
            interval: self.update_interval,
            fastest_interval: self.fastest_interval,
            priority: self.priority,
        }
    }

    pub fn default_position_options(&self) -> PositionOptions {
        PositionOptions::new(self.default_maximum_age, self.default_timeout)
    }

    pub fn with_intervals(mut self, update: Duration, fastest: Duration) -> Self {
        self.update_interval = update;
        self.fastest_interval = fastest;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_default_maximum_age(mut self, maximum_age: Duration) -> Self {
        self.default_maximum_age = maximum_age;
        self
    }
}
