mod time;

pub use time::{format_utc, now_utc, unix_seconds};
