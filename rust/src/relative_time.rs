use crate::state::now_seconds;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// English "N units ago" for an elapsed number of seconds.
/// Future timestamps (negative elapsed) read as "0 seconds ago".
pub fn format_elapsed(elapsed_secs: i64) -> String {
    let secs = elapsed_secs.max(0);
    if secs < MINUTE {
        format!("{secs} seconds ago")
    } else if secs < HOUR {
        format!("{} minutes ago", secs / MINUTE)
    } else if secs < DAY {
        format!("{} hours ago", secs / HOUR)
    } else {
        format!("{} days ago", secs / DAY)
    }
}

pub fn format_relative_time_at(created_at: i64, now: i64) -> String {
    format_elapsed(now.saturating_sub(created_at))
}

#[uniffi::export]
pub fn format_relative_time(created_at: i64) -> String {
    format_relative_time_at(created_at, now_seconds())
}
