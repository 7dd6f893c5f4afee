use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};

const MARKER_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a date to a string in usagewatch.
pub fn date_to_marker(date: NaiveDate) -> String {
    date.format(MARKER_FORMAT).to_string()
}

pub fn marker_to_date(marker: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(marker.trim(), MARKER_FORMAT).ok()
}

/// Returns start of the next day. When a timezone transition swallows midnight the first existing
/// minute of the next day is used.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    let next_day = date.date_naive().succ_opt().unwrap_or(NaiveDate::MAX);
    let timezone = date.timezone();
    (0..24 * 60)
        .filter_map(|minute| NaiveTime::from_hms_opt(minute / 60, minute % 60, 0))
        .find_map(|time| {
            timezone
                .from_local_datetime(&next_day.and_time(time))
                .earliest()
        })
        .unwrap_or_else(|| date + chrono::Duration::days(1))
}

/// How long to wait from `now` until the next day starts.
pub fn until_next_day<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    (next_day_start(now.clone()) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{
        FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc,
    };

    use super::{date_to_marker, marker_to_date, next_day_start, until_next_day};

    /// Zone that moves clocks from 00:00 to 00:30 at the start of 2018-07-05.
    #[derive(Debug, Clone, Copy)]
    struct HalfHourGap;

    impl HalfHourGap {
        fn transition() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2018, 7, 5)
                .unwrap()
                .and_time(NaiveTime::MIN)
        }

        fn before() -> FixedOffset {
            FixedOffset::east_opt(0).unwrap()
        }

        fn after() -> FixedOffset {
            FixedOffset::east_opt(30 * 60).unwrap()
        }
    }

    impl TimeZone for HalfHourGap {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            HalfHourGap
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            if *local < Self::transition() {
                LocalResult::Single(Self::before())
            } else if *local - TimeDelta::minutes(30) >= Self::transition() {
                LocalResult::Single(Self::after())
            } else {
                LocalResult::None
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::transition() {
                Self::before()
            } else {
                Self::after()
            }
        }
    }

    #[test]
    fn test_marker_format() {
        let date = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        assert_eq!(date_to_marker(date), "2018-07-04");
        assert_eq!(marker_to_date("2018-07-04"), Some(date));
        assert_eq!(marker_to_date("04/07/2018"), None);
    }

    #[test]
    fn test_next_day_start() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 22, 30, 15).unwrap();
        assert_eq!(
            next_day_start(now),
            Utc.with_ymd_and_hms(2018, 7, 5, 0, 0, 0).unwrap()
        );
        assert_eq!(until_next_day(now), Duration::from_secs(5385));
    }

    #[test]
    fn test_next_day_start_skips_missing_midnight() {
        let now = HalfHourGap.with_ymd_and_hms(2018, 7, 4, 23, 0, 0).unwrap();
        let start = next_day_start(now);
        assert_eq!(
            start.naive_local(),
            NaiveDate::from_ymd_opt(2018, 7, 5)
                .unwrap()
                .and_hms_opt(0, 30, 0)
                .unwrap()
        );
        assert_eq!(until_next_day(now), Duration::from_secs(3600));
    }

    #[test]
    fn test_next_day_start_respects_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2018, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(until_next_day(now), Duration::from_secs(1));
        assert_eq!(
            next_day_start(now).date_naive(),
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()
        );
    }
}
