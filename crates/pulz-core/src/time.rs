use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time formatted as ISO8601 with a `Z` suffix at second precision,
/// e.g. `2026-01-01T00:00:00Z`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Truncates an ISO8601 timestamp to its containing hour, e.g.
/// `2026-01-01T13:45:12Z` -> `2026-01-01T13:00:00Z`. Used to bucket telemetry.
pub fn truncate_to_hour(ts: &str) -> String {
    match DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => {
            let dt = dt.with_timezone(&Utc);
            format!(
                "{:04}-{:02}-{:02}T{:02}:00:00Z",
                dt.format("%Y"),
                dt.format("%m"),
                dt.format("%d"),
                dt.format("%H")
            )
        }
        Err(_) => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_iso_ends_with_z() {
        assert!(now_iso().ends_with('Z'));
    }

    #[test]
    fn truncate_to_hour_zeroes_minutes_and_seconds() {
        assert_eq!(
            truncate_to_hour("2026-03-05T13:45:12Z"),
            "2026-03-05T13:00:00Z"
        );
    }
}
