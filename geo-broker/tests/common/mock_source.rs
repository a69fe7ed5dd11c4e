//! Mock location source for testing.
//!
//! Records every lifecycle call, flags calls that break the start/stop
//! discipline, and lets tests inject positions and failures through the
//! handle the broker supplied.

use geo_broker::{ErrorCode, LocationSource, Position, UpdateHandle, UpdateRequest};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Lifecycle calls observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle {
    Started(UpdateRequest),
    Stopped,
}

#[derive(Default)]
pub struct MockLocationSource {
    calls: Mutex<Vec<Lifecycle>>,
    handle: Mutex<Option<UpdateHandle>>,
    last_known: Mutex<Option<Position>>,
    violations: AtomicU32,
}

impl MockLocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the broker currently has the source started.
    pub fn is_running(&self) -> bool {
        matches!(
            self.calls.lock().unwrap().last(),
            Some(Lifecycle::Started(_))
        )
    }

    pub fn start_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Lifecycle::Started(_)))
            .count()
    }

    pub fn stop_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Lifecycle::Stopped))
            .count()
    }

    pub fn calls(&self) -> Vec<Lifecycle> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `start` while running or `stop` while stopped.
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn set_last_known(&self, position: Option<Position>) {
        *self.last_known.lock().unwrap() = position;
    }

    /// Emit a fix as the platform would. Panics if never started.
    pub fn emit_position(&self, position: Position) {
        let handle = self.handle.lock().unwrap().clone();
        handle.expect("source was never started").position(position);
    }

    pub fn emit_failure(&self, code: ErrorCode, message: &str) {
        let handle = self.handle.lock().unwrap().clone();
        handle.expect("source was never started").failure(code, message);
    }
}

impl LocationSource for MockLocationSource {
    fn start(&self, updates: UpdateHandle, request: &UpdateRequest) {
        if self.is_running() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        *self.handle.lock().unwrap() = Some(updates);
        self.calls
            .lock()
            .unwrap()
            .push(Lifecycle::Started(request.clone()));
    }

    fn stop(&self) {
        if !self.is_running() {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(Lifecycle::Stopped);
    }

    fn last_known_position(&self) -> Option<Position> {
        self.last_known.lock().unwrap().clone()
    }
}
