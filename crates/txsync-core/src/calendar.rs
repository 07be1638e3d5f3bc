//! Reporting calendar.
//!
//! "Today" for the pending-record query is the calendar date in
//! America/El_Salvador (UTC-6 year round), whatever the host zone is.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

pub const REPORTING_TZ: Tz = chrono_tz::America::El_Salvador;

pub fn today_in_reporting_tz(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&REPORTING_TZ).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn early_utc_morning_is_still_previous_day_locally() {
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 3, 0, 0).unwrap();
        assert_eq!(
            today_in_reporting_tz(now),
            NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
        );
    }

    #[test]
    fn six_utc_is_local_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 6, 0, 0).unwrap();
        assert_eq!(
            today_in_reporting_tz(now),
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
        );
    }
}
