//! `livetrack` - Live location sharing
//!
//! This library turns a stream of device position samples into a local
//! route with a running distance, and mirrors it into a shared presence
//! store that every participant observes as full snapshots.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod distance;
pub mod error;
pub mod geo;
pub mod logging;
pub mod maps;
pub mod position;
pub mod presence;
pub mod session;
pub mod store;
pub mod track;

pub use config::Config;
pub use distance::DistanceAccumulator;
pub use error::{Error, Result};
pub use geo::{Coordinate, Region};
pub use logging::init_logging;
pub use position::{PositionSample, PositionSource, WatchOptions};
pub use presence::{Identity, PresencePublisher, PresenceSubscriber, SharedSnapshot};
pub use session::{RenderFrame, SessionSummary, TrackingSession};
pub use store::{MemoryStore, SharedStore, SqliteStore, StoreStats};
pub use track::{Track, TrackRecorder};
