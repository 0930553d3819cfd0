// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clock helpers. Record timestamps are RFC3339 strings; token times are
//! whole Unix seconds.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time for `created_at`/`updated_at` fields.
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

/// Current Unix time in seconds, the unit of JWT and refresh token expiry.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc3339_uses_z_suffix_and_whole_seconds() {
        let date = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(format_utc_rfc3339(date), "2026-03-01T12:30:05Z");
    }

    #[test]
    fn clocks_agree() {
        let parsed = DateTime::parse_from_rfc3339(&now_rfc3339()).unwrap();
        assert!((parsed.timestamp() - unix_now()).abs() <= 1);
    }
}
