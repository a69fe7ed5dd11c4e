//! The location broker
//!
//! Multiplexes watches and one-shot requests over a single location stream.
//! The stream is started when the first subscriber of either kind arrives and
//! stopped as soon as both registries drain.
//!
//! All registry mutations and stream transitions happen under one mutex.
//! Sink deliveries are collected under that lock and performed after it is
//! released.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::BrokerConfig;
use crate::error::{BrokerError, ErrorCode, LocationError, Result};
use crate::scheduler::TimeoutScheduler;
use crate::sink::ResultSink;
use crate::source::{LocationSource, UpdateHandle};
use crate::types::{CurrentPosition, Position, PositionOptions, RequestId, StreamState, WatchId};

/// Snapshot of broker activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    pub stream_state: StreamState,
    pub watches: usize,
    pub pending_requests: usize,
    /// Position updates received from the source
    pub positions_received: u64,
    /// Stream failures received from the source
    pub failures_received: u64,
    /// One-shot requests that reached their deadline
    pub timeouts_fired: u64,
}

/// Multiplexes position consumers over one location source
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use geo_broker::{ChannelSink, LocationBroker};
///
/// let broker = LocationBroker::new(Arc::new(MyPlatformSource::default()))?;
///
/// // Persistent subscription: every fix until cleared
/// let (watch_sink, watch_rx) = ChannelSink::channel();
/// broker.add_watch("dashboard", watch_sink)?;
///
/// // One-shot: the next fix, or a timeout after 10 seconds
/// let (once_sink, once_rx) = ChannelSink::channel();
/// broker.add_request(once_sink, Duration::from_secs(10))?;
///
/// for delivery in watch_rx {
///     println!("{:?}", delivery);
/// }
/// ```
pub struct LocationBroker {
    shared: Arc<Shared>,
}

impl LocationBroker {
    /// Create a broker over `source` with default configuration
    pub fn new(source: Arc<dyn LocationSource>) -> Result<Self> {
        Self::with_config(source, BrokerConfig::default())
    }

    /// Create a broker over `source` with custom configuration
    ///
    /// Spawns the timeout worker thread. The source is not started until the
    /// first subscription.
    pub fn with_config(source: Arc<dyn LocationSource>, config: BrokerConfig) -> Result<Self> {
        config.validate()?;

        let slot: Arc<OnceLock<Weak<Shared>>> = Arc::new(OnceLock::new());
        let timer_slot = Arc::clone(&slot);
        let scheduler = TimeoutScheduler::spawn(move |id| {
            if let Some(shared) = timer_slot.get().and_then(Weak::upgrade) {
                shared.on_request_timeout(id);
            }
        })?;

        let shared = Arc::new(Shared {
            state: Mutex::new(BrokerState::default()),
            source,
            scheduler,
            config,
        });
        let _ = slot.set(Arc::downgrade(&shared));

        Ok(Self { shared })
    }

    /// Register or replace a watch
    ///
    /// Replacing an existing id swaps the sink silently; the previous sink is
    /// released without a final delivery.
    pub fn add_watch(&self, id: impl Into<WatchId>, sink: Arc<dyn ResultSink>) -> Result<()> {
        self.shared.add_watch(id.into(), sink)
    }

    /// Register a one-shot request that fails with `Timeout` after `timeout`
    pub fn add_request(&self, sink: Arc<dyn ResultSink>, timeout: Duration) -> Result<RequestId> {
        self.shared.add_request(sink, timeout)
    }

    /// Remove a watch. Returns whether it was registered.
    pub fn clear_watch(&self, id: &WatchId) -> bool {
        self.shared.clear_watch(id)
    }

    /// Serve a cached fix if fresh enough, otherwise wait for the next one
    pub fn get_current_position(
        &self,
        sink: Arc<dyn ResultSink>,
        options: PositionOptions,
    ) -> Result<CurrentPosition> {
        self.shared.get_current_position(sink, options)
    }

    /// [`get_current_position`](Self::get_current_position) with the
    /// configured `default_maximum_age` and `default_timeout`
    pub fn get_current_position_with_defaults(
        &self,
        sink: Arc<dyn ResultSink>,
    ) -> Result<CurrentPosition> {
        let options = self.shared.config.default_position_options();
        self.shared.get_current_position(sink, options)
    }

    /// Fan a new fix out to every subscriber
    ///
    /// Normally called by the source through its [`UpdateHandle`].
    pub fn on_position_update(&self, position: Position) {
        self.shared.on_position_update(position);
    }

    /// Fan a stream failure out to every subscriber
    pub fn on_stream_failure(&self, code: ErrorCode, message: impl Into<String>) {
        self.shared.on_stream_failure(code, message.into());
    }

    /// Cancel timers, stop the stream and drop every subscription without
    /// notifying sinks. Called automatically on drop.
    pub fn teardown(&self) {
        self.shared.teardown();
    }

    pub fn stream_state(&self) -> StreamState {
        self.shared.state.lock().stream
    }

    pub fn watch_count(&self) -> usize {
        self.shared.state.lock().watches.len()
    }

    pub fn pending_request_count(&self) -> usize {
        self.shared.state.lock().requests.len()
    }

    pub fn has_watch(&self, id: &WatchId) -> bool {
        self.shared.state.lock().watches.contains_key(id)
    }

    pub fn has_request(&self, id: RequestId) -> bool {
        self.shared.state.lock().requests.contains_key(&id)
    }

    pub fn stats(&self) -> BrokerStats {
        let state = self.shared.state.lock();
        BrokerStats {
            stream_state: state.stream,
            watches: state.watches.len(),
            pending_requests: state.requests.len(),
            ..state.counters
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.shared.config
    }

    #[cfg(test)]
    pub(crate) fn expire_request(&self, id: RequestId) {
        self.shared.on_request_timeout(id);
    }
}

impl Drop for LocationBroker {
    fn drop(&mut self) {
        tracing::debug!("LocationBroker dropping");
        self.shared.teardown();
    }
}

struct PendingRequest {
    sink: Arc<dyn ResultSink>,
    deadline: Option<Instant>,
}

#[derive(Default)]
struct BrokerState {
    watches: HashMap<WatchId, Arc<dyn ResultSink>>,
    requests: HashMap<RequestId, PendingRequest>,
    stream: StreamState,
    next_request_id: u64,
    last_position: Option<Position>,
    counters: BrokerStats,
    torn_down: bool,
}

impl BrokerState {
    fn is_idle(&self) -> bool {
        self.watches.is_empty() && self.requests.is_empty()
    }
}

enum Outcome {
    Position(Position),
    Failure(LocationError),
}

/// Deliveries decided under the lock, performed after releasing it.
struct Dispatch {
    outcome: Outcome,
    finals: Vec<Arc<dyn ResultSink>>,
    watches: Vec<Arc<dyn ResultSink>>,
}

impl Dispatch {
    fn deliver(self) {
        match &self.outcome {
            Outcome::Position(position) => {
                for sink in &self.finals {
                    sink.deliver_success(position, false);
                }
                for sink in &self.watches {
                    sink.deliver_success(position, true);
                }
            }
            Outcome::Failure(error) => {
                for sink in &self.finals {
                    sink.deliver_failure(error, false);
                }
                for sink in &self.watches {
                    sink.deliver_failure(error, true);
                }
            }
        }
    }
}

pub(crate) struct Shared {
    state: Mutex<BrokerState>,
    source: Arc<dyn LocationSource>,
    scheduler: TimeoutScheduler,
    config: BrokerConfig,
}

impl Shared {
    fn add_watch(self: &Arc<Self>, id: WatchId, sink: Arc<dyn ResultSink>) -> Result<()> {
        let replaced = {
            let mut state = self.state.lock();
            if state.torn_down {
                return Err(BrokerError::TornDown);
            }

            let replaced = state.watches.insert(id.clone(), sink);
            tracing::debug!(
                "Watch {} {} ({} watches, {} pending requests)",
                id,
                if replaced.is_some() { "replaced" } else { "added" },
                state.watches.len(),
                state.requests.len()
            );

            self.start_if_needed(&mut state);
            replaced
        };

        drop(replaced);
        Ok(())
    }

    fn add_request(self: &Arc<Self>, sink: Arc<dyn ResultSink>, timeout: Duration) -> Result<RequestId> {
        let mut state = self.state.lock();
        if state.torn_down {
            return Err(BrokerError::TornDown);
        }

        state.next_request_id += 1;
        let id = RequestId::new(state.next_request_id);

        // A deadline past the clock's range never fires; such requests wait
        // for the stream or teardown.
        let deadline = Instant::now().checked_add(timeout);
        if deadline.is_some() {
            // The worker cannot act on the timer until this lock is released.
            self.scheduler.arm(id, timeout)?;
        } else {
            tracing::debug!("Request {} has no reachable deadline, not arming a timer", id);
        }
        state.requests.insert(id, PendingRequest { sink, deadline });

        tracing::debug!(
            "Request {} added with timeout {:?} ({} pending)",
            id,
            timeout,
            state.requests.len()
        );

        self.start_if_needed(&mut state);
        Ok(id)
    }

    fn clear_watch(&self, id: &WatchId) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.watches.remove(id);
            match &removed {
                Some(_) => {
                    tracing::debug!("Watch {} cleared ({} remaining)", id, state.watches.len());
                    self.stop_if_idle(&mut state);
                }
                None => tracing::debug!("Watch {} not registered, nothing to clear", id),
            }
            removed
        };

        removed.is_some()
    }

    fn get_current_position(
        self: &Arc<Self>,
        sink: Arc<dyn ResultSink>,
        options: PositionOptions,
    ) -> Result<CurrentPosition> {
        let platform_fix = self.source.last_known_position();
        let cached = {
            let state = self.state.lock();
            if state.torn_down {
                return Err(BrokerError::TornDown);
            }
            platform_fix.or_else(|| state.last_position.clone())
        };

        let now = chrono::Utc::now().timestamp_millis();
        if let Some(position) = cached.filter(|p| p.age_at(now) <= options.maximum_age) {
            tracing::debug!(
                "Serving cached position aged {:?} (maximum age {:?})",
                position.age_at(now),
                options.maximum_age
            );
            sink.deliver_success(&position, false);
            return Ok(CurrentPosition::Cached);
        }

        self.add_request(sink, options.timeout)
            .map(CurrentPosition::Pending)
    }

    pub(crate) fn on_position_update(&self, position: Position) {
        let dispatch = {
            let mut state = self.state.lock();
            state.counters.positions_received += 1;
            state.last_position = Some(position.clone());
            self.drain_subscribers(&mut state, Outcome::Position(position))
        };

        dispatch.deliver();
    }

    pub(crate) fn on_stream_failure(&self, code: ErrorCode, message: String) {
        tracing::warn!("Location stream failure {:?}: {}", code, message);

        let dispatch = {
            let mut state = self.state.lock();
            state.counters.failures_received += 1;
            self.drain_subscribers(&mut state, Outcome::Failure(LocationError::new(code, message)))
        };

        dispatch.deliver();
    }

    /// Settle every one-shot request and collect every watch.
    fn drain_subscribers(&self, state: &mut BrokerState, outcome: Outcome) -> Dispatch {
        let finals: Vec<_> = state
            .requests
            .drain()
            .map(|(id, request)| {
                self.scheduler.disarm(id);
                request.sink
            })
            .collect();
        let watches: Vec<_> = state.watches.values().cloned().collect();

        if finals.is_empty() && watches.is_empty() {
            tracing::debug!("Event arrived with no subscribers");
        } else {
            tracing::debug!(
                "Dispatching to {} requests and {} watches",
                finals.len(),
                watches.len()
            );
        }

        self.stop_if_idle(state);

        Dispatch {
            outcome,
            finals,
            watches,
        }
    }

    fn on_request_timeout(&self, id: RequestId) {
        let sink = {
            let mut state = self.state.lock();
            let Some(request) = state.requests.remove(&id) else {
                tracing::debug!("Timer for {} fired after the request was settled", id);
                return;
            };

            state.counters.timeouts_fired += 1;
            if let Some(deadline) = request.deadline {
                tracing::debug!(
                    "Request {} timed out ({:?} past deadline)",
                    id,
                    Instant::now().saturating_duration_since(deadline)
                );
            }
            self.stop_if_idle(&mut state);
            request.sink
        };

        sink.deliver_failure(&LocationError::timeout(), false);
    }

    fn teardown(&self) {
        let released = {
            let mut state = self.state.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;

            self.scheduler.disarm_all();
            self.scheduler.shutdown();

            tracing::debug!(
                "Tearing down broker with {} watches and {} pending requests",
                state.watches.len(),
                state.requests.len()
            );

            let released = (
                std::mem::take(&mut state.watches),
                std::mem::take(&mut state.requests),
            );
            self.stop_if_idle(&mut state);
            released
        };

        drop(released);
    }

    fn start_if_needed(self: &Arc<Self>, state: &mut BrokerState) {
        if state.stream == StreamState::Stopped && !state.is_idle() {
            tracing::info!("Starting location stream");
            self.source
                .start(UpdateHandle::new(self), &self.config.update_request());
            state.stream = StreamState::Running;
        }
    }

    fn stop_if_idle(&self, state: &mut BrokerState) {
        if state.stream == StreamState::Running && state.is_idle() {
            tracing::info!("Stopping location stream");
            self.source.stop();
            state.stream = StreamState::Stopped;
        }
    }
}
