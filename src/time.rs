//! Header-facing time types: broken-down dates, durations, the time-axis
//! value of a date, and calendar guessing.
//!
//! [`Date`] is what the header's DATE/DATE1/DATE2 slots hold (one-based
//! month and day plus h:m:s); arithmetic happens in [`CalTime`] and the
//! conversions live here.  [`guess_calendar`] recovers the calendar kind a
//! file was written under by checking the header's time-axis value against
//! its date field under every calendar.

use std::path::Path;

use crate::caltime::{CalTime, Calendar, GUESS_ORDER};
use crate::error::{bad_call, Result};
use crate::file::Gt3File;
use crate::header::Gt3Header;

/// A broken-down date as stored in the header: one-based month and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Date {
    pub year: i64,
    pub mon: i64,
    pub day: i64,
    pub hour: i64,
    pub min: i64,
    pub sec: i64,
}

impl Date {
    pub fn new(year: i64, mon: i64, day: i64, hour: i64, min: i64, sec: i64) -> Self {
        Date {
            year,
            mon,
            day,
            hour,
            min,
            sec,
        }
    }

    /// Seconds past midnight.
    pub fn second_of_day(&self) -> i64 {
        self.sec + 60 * (self.min + 60 * self.hour)
    }

    /// Convert into calendar time under `cal`, normalizing out-of-range
    /// fields.
    pub fn to_caltime(&self, cal: Calendar) -> CalTime {
        let mut t = CalTime {
            calendar: cal,
            year: self.year,
            month: (self.mon - 1) as i32,
            day: (self.day - 1) as i32,
            sec: 0,
        };
        t.add_days(0);
        t.add_seconds(self.second_of_day());
        t
    }

    pub fn from_caltime(t: &CalTime) -> Self {
        let (year, mon, day) = t.ymd();
        let hour = i64::from(t.sec) / 3600;
        let rest = i64::from(t.sec) - 3600 * hour;
        Date {
            year,
            mon,
            day,
            hour,
            min: rest / 60,
            sec: rest % 60,
        }
    }

    /// Is this a representable date under `cal`?
    pub fn valid(&self, cal: Calendar) -> bool {
        cal.valid_date(self.year, self.mon, self.day)
            && (0..24).contains(&self.hour)
            && (0..60).contains(&self.min)
            && (0..60).contains(&self.sec)
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.mon, self.day, self.hour, self.min, self.sec
        )
    }
}

// ── Durations ─────────────────────────────────────────────────────────────────

/// Unit of a [`Duration`] and of the header's UTIM slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeUnit {
    /// Parse a UTIM spelling.
    pub fn parse(s: &str) -> Option<TimeUnit> {
        match s {
            "YEAR" => Some(TimeUnit::Year),
            "MON" | "MONTH" => Some(TimeUnit::Month),
            "DAY" => Some(TimeUnit::Day),
            "HOUR" => Some(TimeUnit::Hour),
            "MIN" => Some(TimeUnit::Minute),
            "SEC" => Some(TimeUnit::Second),
            _ => None,
        }
    }

    /// Seconds per unit, for the units that have a fixed length.
    fn seconds(self) -> Option<i64> {
        match self {
            TimeUnit::Day => Some(24 * 3600),
            TimeUnit::Hour => Some(3600),
            TimeUnit::Minute => Some(60),
            TimeUnit::Second => Some(1),
            TimeUnit::Year | TimeUnit::Month => None,
        }
    }
}

/// A step of time in one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub value: i64,
    pub unit: TimeUnit,
}

impl Duration {
    /// The duration of one chunk, from its TDUR and UTIM header slots.
    pub fn from_header(head: &Gt3Header) -> Result<Duration> {
        let value = i64::from(head.get_int("TDUR")?);
        let utim = head.get_str("UTIM")?;
        let unit = TimeUnit::parse(&utim)
            .ok_or_else(|| bad_call(format!("UTIM {utim:?}: unknown time unit")))?;
        Ok(Duration { value, unit })
    }

    /// Apply this duration to `date` under `cal`.
    pub fn add_to(&self, date: &Date, cal: Calendar) -> Date {
        let mut t = date.to_caltime(cal);
        match self.unit {
            TimeUnit::Year => {
                t.add_months(12 * self.value);
            }
            TimeUnit::Month => {
                t.add_months(self.value);
            }
            TimeUnit::Day => {
                t.add_days(self.value);
            }
            TimeUnit::Hour => {
                t.add_seconds(self.value * 3600);
            }
            TimeUnit::Minute => {
                t.add_seconds(self.value * 60);
            }
            TimeUnit::Second => {
                t.add_seconds(self.value);
            }
        }
        Date::from_caltime(&t)
    }
}

/// The duration from `from` to `to`, expressed in the coarsest unit that
/// represents it exactly under `cal`.
pub fn duration_between(from: &Date, to: &Date, cal: Calendar) -> Duration {
    let d_ym = 12 * (to.year - from.year) + to.mon - from.mon;
    let same_clock = to.day == from.day && to.second_of_day() == from.second_of_day();

    if d_ym != 0 && same_clock {
        return if d_ym % 12 == 0 {
            Duration {
                value: d_ym / 12,
                unit: TimeUnit::Year,
            }
        } else {
            Duration {
                value: d_ym,
                unit: TimeUnit::Month,
            }
        };
    }

    let sec = to.to_caltime(cal).diff_seconds(&from.to_caltime(cal));
    for (unit, per) in [
        (TimeUnit::Day, 24 * 3600),
        (TimeUnit::Hour, 3600),
        (TimeUnit::Minute, 60),
    ] {
        if sec % per == 0 {
            return Duration {
                value: sec / per,
                unit,
            };
        }
    }
    Duration {
        value: sec,
        unit: TimeUnit::Second,
    }
}

/// Time-axis value of `date` relative to `since`, in `unit`, under `cal`.
/// Year and month have no fixed length and are rejected.
pub fn time_value(date: &Date, since: &Date, unit: TimeUnit, cal: Calendar) -> Result<f64> {
    let per = unit
        .seconds()
        .ok_or_else(|| bad_call("time_value: unit must be DAY or finer"))?;
    let sec = date.to_caltime(cal).diff_seconds(&since.to_caltime(cal));
    Ok(sec as f64 / per as f64)
}

// ── Calendar guessing ─────────────────────────────────────────────────────────

/// Find the calendar under which `date` lies `sec` seconds after `origin`:
/// first an exact match, then within one hour.
pub fn guess_calendar(sec: f64, date: &Date, origin: &Date) -> Option<Calendar> {
    let elapsed = |cal: Calendar| {
        let t = date.to_caltime(cal);
        t.diff_seconds(&origin.to_caltime(cal)) as f64
    };

    GUESS_ORDER
        .into_iter()
        .find(|&cal| sec - elapsed(cal) == 0.0)
        .or_else(|| {
            GUESS_ORDER
                .into_iter()
                .find(|&cal| (sec - elapsed(cal)).abs() <= 3600.0)
        })
}

/// Guess the calendar from one header: its DATE slot must be consistent
/// with TIME (in UTIM units) counted from year 0.
pub fn guess_calendar_header(head: &Gt3Header) -> Result<Option<Calendar>> {
    let date = head.get_date("DATE")?;
    let utim = head.get_str("UTIM")?;
    let time = f64::from(head.get_int("TIME")?);

    let factor = TimeUnit::parse(&utim)
        .and_then(TimeUnit::seconds)
        .unwrap_or(3600) as f64;

    let origin = Date::new(0, 1, 1, 0, 0, 0);
    Ok(guess_calendar(time * factor, &date, &origin))
}

/// Guess the calendar of a file.  When the first chunk sits at year zero
/// (no elapsed time to compare against), the last chunk is used instead.
pub fn guess_calendar_file(path: impl AsRef<Path>) -> Result<Option<Calendar>> {
    let mut fp = Gt3File::open(path)?;
    let mut head = fp.read_header()?;

    if head.get_date("DATE")?.year < 1 {
        fp.seek_chunk(crate::file::ChunkSeek::End(-1))?;
        head = fp.read_header()?;
    }
    guess_calendar_header(&head)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_ordering_is_field_major() {
        let a = Date::new(1970, 7, 15, 12, 0, 0);
        assert!(a > Date::new(1970, 7, 1, 12, 0, 0));
        assert!(a < Date::new(1970, 8, 1, 12, 0, 0));
        assert!(a > Date::new(1970, 7, 15, 0, 0, 0));
        assert!(a < Date::new(1970, 7, 15, 15, 0, 0));
        assert_eq!(a, Date::new(1970, 7, 15, 12, 0, 0));
    }

    #[test]
    fn caltime_conversion_roundtrip() {
        let d = Date::new(1999, 2, 28, 23, 59, 59);
        let t = d.to_caltime(Calendar::Gregorian);
        assert_eq!(Date::from_caltime(&t), d);
    }

    #[test]
    fn duration_picks_the_coarsest_exact_unit() {
        let cal = Calendar::Gregorian;
        let a = Date::new(1900, 1, 1, 0, 0, 0);

        let d = duration_between(&a, &Date::new(1900, 2, 1, 0, 0, 0), cal);
        assert_eq!(d, Duration { value: 1, unit: TimeUnit::Month });

        let d = duration_between(&a, &Date::new(1903, 1, 1, 0, 0, 0), cal);
        assert_eq!(d, Duration { value: 3, unit: TimeUnit::Year });

        let d = duration_between(&a, &Date::new(1900, 1, 4, 0, 0, 0), cal);
        assert_eq!(d, Duration { value: 3, unit: TimeUnit::Day });

        let d = duration_between(&a, &Date::new(1900, 1, 1, 7, 0, 0), cal);
        assert_eq!(d, Duration { value: 7, unit: TimeUnit::Hour });

        let d = duration_between(&a, &Date::new(1900, 1, 1, 0, 0, 30), cal);
        assert_eq!(d, Duration { value: 30, unit: TimeUnit::Second });
    }

    #[test]
    fn duration_application_inverts_measurement() {
        let cal = Calendar::Noleap;
        let a = Date::new(2000, 12, 30, 22, 0, 0);
        let b = Date::new(2001, 1, 2, 4, 0, 0);
        let d = duration_between(&a, &b, cal);
        assert_eq!(d.add_to(&a, cal), b);
    }

    #[test]
    fn time_value_in_days() {
        let cal = Calendar::Day360;
        let origin = Date::new(2000, 1, 1, 0, 0, 0);
        let d = Date::new(2000, 2, 1, 12, 0, 0);
        let v = time_value(&d, &origin, TimeUnit::Day, cal).unwrap();
        assert_eq!(v, 30.5);

        assert!(time_value(&d, &origin, TimeUnit::Month, cal).is_err());
    }

    #[test]
    fn guessing_prefers_the_exact_calendar() {
        let origin = Date::new(0, 1, 1, 0, 0, 0);
        let date = Date::new(2000, 1, 16, 12, 0, 0);
        let sec = 3600.0 * 17_532_012.0;
        assert_eq!(guess_calendar(sec, &date, &origin), Some(Calendar::Gregorian));

        // 360-day arithmetic: 2000 years of 360 days, 15.5 days into the year
        let sec = (2000.0 * 360.0 + 15.5) * 86_400.0;
        assert_eq!(guess_calendar(sec, &date, &origin), Some(Calendar::Day360));
    }

    #[test]
    fn header_roundtrip_guess() {
        let mut head = Gt3Header::new();
        let date = Date::new(1950, 7, 1, 0, 0, 0);
        head.set_date("DATE", &date).unwrap();
        head.set_str("UTIM", "HOUR").unwrap();

        // hours from year 0 to 1950-07-01 under noleap
        let origin = Date::new(0, 1, 1, 0, 0, 0);
        let hours = date
            .to_caltime(Calendar::Noleap)
            .diff_seconds(&origin.to_caltime(Calendar::Noleap))
            / 3600;
        head.set_int("TIME", hours as i32).unwrap();

        assert_eq!(
            guess_calendar_header(&head).unwrap(),
            Some(Calendar::Noleap)
        );
    }
}
