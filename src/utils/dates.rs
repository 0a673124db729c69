use chrono::{DateTime, Duration, NaiveDate, Utc};

// Taiwan has no daylight saving, so a fixed shift is exact.
const TAIWAN_UTC_OFFSET_HOURS: i64 = 8;

/// Calendar date in Taiwan (UTC+8).
pub fn taiwan_date(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::hours(TAIWAN_UTC_OFFSET_HOURS)).date_naive()
}

pub fn taiwan_today() -> NaiveDate {
    taiwan_date(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rolls_over_at_taiwan_midnight() {
        let before = Utc.with_ymd_and_hms(2025, 3, 1, 15, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 1, 16, 0, 0).unwrap();
        assert_eq!(taiwan_date(before), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(taiwan_date(after), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }
}
