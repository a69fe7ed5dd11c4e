//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod mock_source;

use geo_broker::{LocationBroker, LocationError, Position, ResultSink};
use std::sync::{Arc, Mutex};

use mock_source::MockLocationSource;

/// Sink that records deliveries in order, for assertions after the fact.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Recorded>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Success(Position, bool),
    Failure(LocationError, bool),
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl ResultSink for RecordingSink {
    fn deliver_success(&self, position: &Position, persistent: bool) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Success(position.clone(), persistent));
    }

    fn deliver_failure(&self, error: &LocationError, persistent: bool) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Failure(error.clone(), persistent));
    }
}

/// A broker wired to a fresh mock source.
pub fn create_test_broker() -> (LocationBroker, Arc<MockLocationSource>) {
    let source = Arc::new(MockLocationSource::new());
    let broker = LocationBroker::new(source.clone()).expect("Failed to build broker");
    (broker, source)
}

pub fn sample_position() -> Position {
    Position::new(1.0, 2.0, 5.0, 1000)
}
