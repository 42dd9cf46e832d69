//! `SQLite` schema for the presence store.
//!
//! Statements are grouped by the schema version that introduced them.

/// Key-value table holding the schema version. Always created first.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Latest location per user, overwritten in place.
pub const CREATE_USER_LOCATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS user_locations (
    user_id TEXT PRIMARY KEY,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL
)
";

/// Route history per user. `push_key` sorts in insertion order.
pub const CREATE_ROUTE_COORDINATES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS route_coordinates (
    user_id TEXT NOT NULL,
    push_key TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    PRIMARY KEY (user_id, push_key)
)
";

/// When each location was last written.
pub const ADD_LOCATION_UPDATED_AT: &str = r"
ALTER TABLE user_locations ADD COLUMN updated_at TEXT
";

/// Speeds up reading the whole tree ordered by key.
pub const CREATE_ROUTE_KEY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_route_push_key ON route_coordinates(push_key)
";

/// Version 1: the presence tables.
pub const V1_STATEMENTS: &[&str] = &[CREATE_USER_LOCATIONS_TABLE, CREATE_ROUTE_COORDINATES_TABLE];

/// Version 2: location timestamps and the route key index.
pub const V2_STATEMENTS: &[&str] = &[ADD_LOCATION_UPDATED_AT, CREATE_ROUTE_KEY_INDEX];
