//! Result sinks: where the broker sends positions and failures.
//!
//! [`ResultSink`] is the contract the broker delivers through. [`ChannelSink`]
//! is a ready-made implementation that forwards each delivery over a channel,
//! paired with a [`DeliveryReceiver`] offering blocking and non-blocking reads.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::error::LocationError;
use crate::types::Position;

/// Receives the outcome of a watch or one-shot request.
///
/// `persistent == false` marks the final event for the subscription; the
/// broker has released the sink. `persistent == true` means more events may
/// follow.
///
/// Deliveries happen outside the broker's internal lock, so an implementation
/// may call back into the broker.
pub trait ResultSink: Send + Sync {
    fn deliver_success(&self, position: &Position, persistent: bool);

    fn deliver_failure(&self, error: &LocationError, persistent: bool);
}

/// A single delivery captured by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Success {
        position: Position,
        persistent: bool,
    },
    Failure {
        error: LocationError,
        persistent: bool,
    },
}

impl Delivery {
    pub fn is_persistent(&self) -> bool {
        match self {
            Self::Success { persistent, .. } | Self::Failure { persistent, .. } => *persistent,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Self::Success { position, .. } => Some(position),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&LocationError> {
        match self {
            Self::Failure { error, .. } => Some(error),
            Self::Success { .. } => None,
        }
    }
}

/// Sink that forwards every delivery into a channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Delivery>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it.
    pub fn channel() -> (Arc<Self>, DeliveryReceiver) {
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(Self { tx });
        (sink, DeliveryReceiver::new(rx))
    }

    fn send(&self, delivery: Delivery) {
        if self.tx.send(delivery).is_err() {
            tracing::debug!("Delivery receiver dropped, discarding delivery");
        }
    }
}

impl ResultSink for ChannelSink {
    fn deliver_success(&self, position: &Position, persistent: bool) {
        self.send(Delivery::Success {
            position: position.clone(),
            persistent,
        });
    }

    fn deliver_failure(&self, error: &LocationError, persistent: bool) {
        self.send(Delivery::Failure {
            error: error.clone(),
            persistent,
        });
    }
}

/// Blocking receiver over the deliveries made to a [`ChannelSink`]
///
/// `next()` blocks until a delivery is available or the sink is dropped.
/// Use `try_recv()` for non-blocking access.
pub struct DeliveryReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
}

impl DeliveryReceiver {
    fn new(rx: mpsc::Receiver<Delivery>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Block until a delivery is available
    ///
    /// Returns `None` once the sink has been dropped by everyone holding it.
    pub fn recv(&self) -> Option<Delivery> {
        self.rx.lock().ok()?.recv().ok()
    }

    /// Try to receive a delivery without blocking
    pub fn try_recv(&self) -> Option<Delivery> {
        self.rx.lock().ok()?.try_recv().ok()
    }

    /// Block until a delivery is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Delivery> {
        self.rx.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// Non-blocking iterator over deliveries already received
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }

    /// Blocking iterator that gives up after `timeout` on each `next()`
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIterator<'_> {
        TimeoutIterator {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for DeliveryReceiver {
    type Item = Delivery;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for DeliveryReceiver {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

pub struct TryIterator<'a> {
    inner: &'a DeliveryReceiver,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = Delivery;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

pub struct TimeoutIterator<'a> {
    inner: &'a DeliveryReceiver,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIterator<'a> {
    type Item = Delivery;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_channel_sink_forwards_deliveries() {
        let (sink, rx) = ChannelSink::channel();
        let position = Position::new(1.0, 2.0, 5.0, 1000);

        sink.deliver_success(&position, true);
        sink.deliver_failure(
            &LocationError::new(ErrorCode::PositionUnavailable, "lost fix"),
            false,
        );

        let first = rx.try_recv().unwrap();
        assert_eq!(first.position(), Some(&position));
        assert!(first.is_persistent());

        let second = rx.try_recv().unwrap();
        assert_eq!(second.error().unwrap().code, ErrorCode::PositionUnavailable);
        assert!(!second.is_persistent());

        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_recv_timeout_empty() {
        let (_sink, rx) = ChannelSink::channel();

        let start = std::time::Instant::now();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn test_recv_returns_none_after_sink_dropped() {
        let (sink, rx) = ChannelSink::channel();
        sink.deliver_success(&Position::new(0.0, 0.0, 1.0, 0), false);
        drop(sink);

        let all: Vec<_> = rx.collect();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_try_iter_and_clone() {
        let (sink, rx) = ChannelSink::channel();
        let rx2 = rx.clone();
        for ts in 0..3 {
            sink.deliver_success(&Position::new(0.0, 0.0, 1.0, ts), true);
        }

        assert_eq!(rx.try_iter().count(), 3);
        assert!(rx2.try_recv().is_none());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.deliver_failure(&LocationError::timeout(), false);
    }
}
