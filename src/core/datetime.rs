//! Timestamp encoding for persisted records.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision, so that `ORDER BY` on the text column is chronological.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::SyncError;

/// Encode a timestamp for storage.
#[must_use]
pub fn to_storage(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode an optional timestamp for storage.
#[must_use]
pub fn opt_to_storage(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(to_storage)
}

/// Decode a stored timestamp.
///
/// # Errors
///
/// Returns `SyncError::LocalCorruption` if the text is not RFC 3339.
pub fn from_storage(raw: &str) -> Result<DateTime<Utc>, SyncError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SyncError::LocalCorruption(format!("bad timestamp {raw:?}: {e}")))
}

/// Decode an optional stored timestamp.
///
/// # Errors
///
/// Returns `SyncError::LocalCorruption` if the text is present but invalid.
pub fn opt_from_storage(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, SyncError> {
    raw.map(from_storage).transpose()
}
