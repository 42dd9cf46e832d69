//! Generated route keys whose natural order is insertion order.
//!
//! A key is 13 hex digits of Unix milliseconds followed by 6 hex digits of a
//! per-millisecond sequence. Both parts are fixed width, so comparing keys as
//! strings compares them chronologically. A generator never goes backwards:
//! if the clock steps back it keeps using the last millisecond it issued.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence values available within one millisecond.
const SEQUENCE_LIMIT: u32 = 0x0100_0000;

/// A key in a user's `routeCoordinates` collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(String);

impl RouteKey {
    /// The key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RouteKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for RouteKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Issues strictly increasing [`RouteKey`]s.
#[derive(Debug, Default, Clone)]
pub struct PushKeyGenerator {
    last_millis: i64,
    sequence: u32,
    issued: bool,
}

impl PushKeyGenerator {
    /// Create a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a key for the current time.
    pub fn next_key(&mut self) -> RouteKey {
        self.next_key_at(Utc::now())
    }

    /// Issue a key for `now`.
    pub fn next_key_at(&mut self, now: DateTime<Utc>) -> RouteKey {
        let millis = now.timestamp_millis().max(0);

        if !self.issued || millis > self.last_millis {
            self.last_millis = millis;
            self.sequence = 0;
        } else {
            self.sequence += 1;
            if self.sequence >= SEQUENCE_LIMIT {
                self.last_millis += 1;
                self.sequence = 0;
            }
        }
        self.issued = true;

        RouteKey(format!("{:013x}{:06x}", self.last_millis, self.sequence))
    }
}
