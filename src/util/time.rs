use chrono::{DateTime, Utc};

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Whole seconds since the Unix epoch, as used in object filenames.
pub fn unix_seconds(now: &DateTime<Utc>) -> i64 {
    now.timestamp()
}

pub fn format_utc(now: &DateTime<Utc>, pattern: &str) -> String {
    now.format(pattern).to_string()
}
