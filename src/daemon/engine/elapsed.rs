use chrono::{DateTime, Duration, Utc};

/// Time since `started_at`, truncated to whole seconds. A start in the future (clock skew between
/// here and the service) counts as zero.
pub fn elapsed_since(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    let started_at = started_at?;
    Some(Duration::seconds((now - started_at).num_seconds().max(0)))
}
