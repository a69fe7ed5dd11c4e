//! The location source seam.
//!
//! A [`LocationSource`] wraps whatever actually produces fixes (a platform
//! location service, a GPS daemon, a replayed track). The broker starts it when
//! the first subscriber arrives and stops it when the last one leaves; while
//! running the source reports through the [`UpdateHandle`] it was given.

use std::sync::{Arc, Weak};

use crate::broker::Shared;
use crate::error::ErrorCode;
use crate::types::{Position, UpdateRequest};

/// Producer of position fixes.
///
/// The broker guarantees `start` is only called while stopped and `stop`
/// only while running. Both are invoked with the broker's internal lock held,
/// so they must return promptly and must not report through the handle
/// synchronously; report from the source's own thread or callback instead.
pub trait LocationSource: Send + Sync {
    /// Begin emitting updates through `updates`.
    fn start(&self, updates: UpdateHandle, request: &UpdateRequest);

    /// Cease emitting updates and release any underlying resources.
    fn stop(&self);

    /// The platform's most recent cached fix, if it keeps one.
    fn last_known_position(&self) -> Option<Position> {
        None
    }
}

/// Inbound event hooks handed to a running [`LocationSource`].
///
/// Holds only a weak reference: once the broker is dropped, reports are
/// discarded.
#[derive(Clone)]
pub struct UpdateHandle {
    shared: Weak<Shared>,
}

impl UpdateHandle {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// Report a new position fix.
    pub fn position(&self, position: Position) {
        match self.shared.upgrade() {
            Some(shared) => shared.on_position_update(position),
            None => tracing::debug!("Broker dropped, discarding position update"),
        }
    }

    /// Report a connectivity-level failure.
    pub fn failure(&self, code: ErrorCode, message: impl Into<String>) {
        match self.shared.upgrade() {
            Some(shared) => shared.on_stream_failure(code, message.into()),
            None => tracing::debug!("Broker dropped, discarding stream failure"),
        }
    }

    /// Whether the broker that issued this handle still exists.
    pub fn is_connected(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl std::fmt::Debug for UpdateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateHandle")
            .field("connected", &self.is_connected())
            .finish()
    }
}
