use chrono::{DateTime, Utc};

/// Convert SDK epoch parts to a chrono timestamp.
pub(crate) fn utc_from_parts(secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, nanos)
}
