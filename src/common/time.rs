//! Wall-clock helpers shared by the engines and the log sinks.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{LocalResult, NaiveDate, TimeZone, Utc};

/// Current wall clock in whole seconds since the Unix epoch.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// UTC `YYYY-MM-DD` tag for `secs`; names the daily log files and stamps
/// mapping records.
pub fn date_tag(secs: u64) -> String {
    match Utc.timestamp_opt(secs as i64, 0) {
        LocalResult::Single(stamp) => stamp.format("%Y-%m-%d").to_string(),
        _ => "1970-01-01".to_string(),
    }
}

/// Parse a `YYYY-MM-DD` tag back to epoch seconds (midnight UTC).
pub fn parse_date_tag(tag: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(tag, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;

    Some(Utc.from_utc_datetime(&midnight).timestamp())
}
