//! # geo-broker
//!
//! A location-update subscription broker. Many consumers share a single
//! location stream:
//!
//! - **Watches** receive every fix and failure until cleared.
//! - **One-shot requests** receive exactly one terminal event: the next fix,
//!   a stream failure, or a timeout.
//!
//! The underlying [`LocationSource`] is started when the first consumer of
//! either kind registers and stopped as soon as none remain.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use geo_broker::prelude::*;
//!
//! let broker = LocationBroker::new(Arc::new(GpsdSource::connect()?))?;
//!
//! let (sink, rx) = ChannelSink::channel();
//! broker.add_request(sink, Duration::from_secs(10))?;
//!
//! match rx.recv() {
//!     Some(Delivery::Success { position, .. }) => println!("{:?}", position),
//!     Some(Delivery::Failure { error, .. }) => eprintln!("{}", error),
//!     None => {}
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`LocationBroker`] owns the watch and request registries behind one mutex
//!   and decides stream start/stop under that lock.
//! - A timeout worker thread with its own tokio runtime keeps a delay queue of
//!   request deadlines and reports expirations back to the broker.
//! - Deliveries to [`ResultSink`]s happen after the lock is released.

mod broker;
pub mod config;
pub mod error;
pub mod logging;
mod scheduler;
pub mod sink;
pub mod source;
pub mod types;

pub use broker::{BrokerStats, LocationBroker};
pub use config::BrokerConfig;
pub use error::{BrokerError, ErrorCode, LocationError, Result};
pub use sink::{ChannelSink, Delivery, DeliveryReceiver, ResultSink};
pub use source::{LocationSource, UpdateHandle};
pub use types::{
    CurrentPosition, Position, PositionOptions, Priority, RequestId, StreamState, UpdateRequest,
    WatchId,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        BrokerConfig, BrokerError, ChannelSink, CurrentPosition, Delivery, ErrorCode,
        LocationBroker, LocationError, LocationSource, Position, PositionOptions, RequestId,
        ResultSink, StreamState, UpdateHandle, UpdateRequest, WatchId,
    };
}
