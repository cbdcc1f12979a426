//! Calendar timestamps as stored in the ledger file.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use serde::{Serialize, Serializer};
use std::fmt;

const SECONDS_PER_DAY: i64 = 86_400;

/// A broken-down local wall-clock time.
///
/// A year of `-1` is reserved: it marks a borrow record that has not been
/// returned yet (see [`Timestamp::UNRETURNED`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    pub year: i16,
    /// 1..=12
    pub month: i8,
    /// 1..=31
    pub day: i8,
    /// 1 = Sunday .. 7 = Saturday
    pub weekday: i8,
    pub hour: i8,
    pub min: i8,
    pub sec: i8,
}

impl Timestamp {
    /// Return stamp of a borrow record that is still out.
    pub const UNRETURNED: Timestamp = Timestamp {
        year: -1,
        month: 0,
        day: 0,
        weekday: 0,
        hour: 0,
        min: 0,
        sec: 0,
    };

    /// Current local time.
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        Timestamp {
            year: dt.year() as i16,
            month: dt.month() as i8,
            day: dt.day() as i8,
            weekday: dt.weekday().num_days_from_sunday() as i8 + 1,
            hour: dt.hour() as i8,
            min: dt.minute() as i8,
            sec: dt.second() as i8,
        }
    }

    /// Converts back to a calendar date-time.
    ///
    /// Returns `None` for the unreturned sentinel or any stamp that does not
    /// name a real calendar instant.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::try_from(self.month).ok()?,
            u32::try_from(self.day).ok()?,
        )?;
        date.and_hms_opt(
            u32::try_from(self.hour).ok()?,
            u32::try_from(self.min).ok()?,
            u32::try_from(self.sec).ok()?,
        )
    }

    pub fn is_unreturned(&self) -> bool {
        self.year == Self::UNRETURNED.year
    }

    /// Whole days elapsed from `self` to `end` in local time, truncated
    /// toward zero.
    ///
    /// Both stamps are resolved to real instants, so a span that crosses a
    /// daylight saving change is an hour shorter or longer than its wall
    /// clock difference.
    pub fn whole_days_until(&self, end: &Timestamp) -> Option<i64> {
        self.whole_days_until_in(end, &Local)
    }

    /// [`Timestamp::whole_days_until`] with the stamps read in `tz`.
    ///
    /// A wall clock time that does not exist in `tz` (skipped by a forward
    /// change) falls back to plain calendar differencing.
    pub fn whole_days_until_in<Tz: TimeZone>(&self, end: &Timestamp, tz: &Tz) -> Option<i64> {
        let begin = self.to_datetime()?;
        let end = end.to_datetime()?;
        let seconds = match (
            tz.from_local_datetime(&begin).earliest(),
            tz.from_local_datetime(&end).earliest(),
        ) {
            (Some(begin), Some(end)) => end.signed_duration_since(begin).num_seconds(),
            _ => end.signed_duration_since(begin).num_seconds(),
        };
        Some(seconds / SECONDS_PER_DAY)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unreturned() {
            return write!(f, "pending");
        }
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.min, self.sec
        )
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, LocalResult, Utc};

    /// UTC+1 until 2026-03-29 02:00 local, then UTC+2. Wall clock times
    /// from 02:00 to 03:00 that day do not exist.
    #[derive(Debug, Clone, Copy)]
    struct SpringForward;

    impl SpringForward {
        fn winter() -> FixedOffset {
            FixedOffset::east_opt(3600).unwrap()
        }

        fn summer() -> FixedOffset {
            FixedOffset::east_opt(7200).unwrap()
        }

        fn local_switch(hour: u32) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, 3, 29)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap()
        }
    }

    impl TimeZone for SpringForward {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            SpringForward
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            if *local < Self::local_switch(2) {
                LocalResult::Single(Self::winter())
            } else if *local >= Self::local_switch(3) {
                LocalResult::Single(Self::summer())
            } else {
                LocalResult::None
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            // 02:00 local winter time is 01:00 UTC
            if *utc < Self::local_switch(1) {
                Self::winter()
            } else {
                Self::summer()
            }
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
        Timestamp::from_datetime(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, s)
                .unwrap(),
        )
    }

    #[test]
    fn test_from_datetime_fills_weekday() {
        // 2026-01-04 is a Sunday
        let ts = at(2026, 1, 4, 9, 30, 15);
        assert_eq!(ts.weekday, 1);
        assert_eq!((ts.year, ts.month, ts.day), (2026, 1, 4));
        assert_eq!((ts.hour, ts.min, ts.sec), (9, 30, 15));
        assert_eq!(ts.to_string(), "2026-01-04 09:30:15");
    }

    #[test]
    fn test_to_datetime_inverts_from_datetime() {
        let ts = at(2024, 2, 29, 23, 59, 59);
        assert_eq!(Timestamp::from_datetime(ts.to_datetime().unwrap()), ts);
    }

    #[test]
    fn test_unreturned_sentinel() {
        assert!(Timestamp::UNRETURNED.is_unreturned());
        assert!(Timestamp::UNRETURNED.to_datetime().is_none());
        assert_eq!(Timestamp::UNRETURNED.to_string(), "pending");
        assert!(!at(2026, 1, 1, 0, 0, 0).is_unreturned());
    }

    #[test]
    fn test_whole_days_crosses_month_and_leap_day() {
        let begin = at(2024, 2, 27, 12, 0, 0);
        let end = at(2024, 3, 2, 12, 0, 0);
        assert_eq!(begin.whole_days_until_in(&end, &Utc), Some(4));
    }

    #[test]
    fn test_whole_days_counts_real_time_across_dst_change() {
        let begin = at(2026, 3, 25, 10, 0, 0);
        let end = at(2026, 4, 4, 10, 0, 0);

        // ten wall clock days, one hour short in real time
        assert_eq!(begin.whole_days_until_in(&end, &Utc), Some(10));
        assert_eq!(begin.whole_days_until_in(&end, &SpringForward), Some(9));

        let before = at(2026, 3, 28, 10, 0, 0);
        assert_eq!(before.whole_days_until_in(&at(2026, 3, 29, 10, 0, 0), &SpringForward), Some(0));
    }

    #[test]
    fn test_skipped_wall_clock_time_uses_calendar_difference() {
        let begin = at(2026, 3, 27, 2, 30, 0);
        let skipped = at(2026, 3, 29, 2, 30, 0);
        assert_eq!(begin.whole_days_until_in(&skipped, &SpringForward), Some(2));
    }

    #[test]
    fn test_whole_days_truncates_toward_zero() {
        let begin = at(2026, 1, 10, 8, 0, 0);
        assert_eq!(begin.whole_days_until(&at(2026, 1, 11, 7, 59, 59)), Some(0));
        assert_eq!(begin.whole_days_until(&at(2026, 1, 12, 8, 0, 0)), Some(2));
        assert_eq!(begin.whole_days_until(&at(2026, 1, 9, 8, 0, 1)), Some(0));
    }

    #[test]
    fn test_whole_days_with_sentinel_is_none() {
        let begin = at(2026, 1, 10, 8, 0, 0);
        assert_eq!(begin.whole_days_until(&Timestamp::UNRETURNED), None);
    }
}
