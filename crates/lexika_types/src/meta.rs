//! Well-known sync metadata keys.
//!
//! The local store holds free-form key/value metadata; these are the keys
//! the sync layer reads and writes.

/// ISO-8601 timestamp of the most recent completed sync.
pub const LAST_SYNC_TIME: &str = "last_sync_time";

/// First-run marker, set after the first completed sync.
pub const ONBOARDED: &str = "onboarded";
