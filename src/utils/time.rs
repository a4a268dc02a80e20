use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Format the remote service expects for `startedAt`/`stoppedAt`. Millisecond precision, no
/// offset, always UTC.
const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub fn to_api_timestamp(moment: DateTime<Utc>) -> String {
    moment.format(API_TIMESTAMP_FORMAT).to_string()
}

/// Parses timestamps coming from the remote service. The service usually omits the offset, but
/// RFC 3339 strings are accepted too. Unparsable values are treated as missing.
pub fn parse_api_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(v) = DateTime::parse_from_rfc3339(value) {
        return Some(v.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|v| v.and_utc())
}

/// Renders a duration as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_hms(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
