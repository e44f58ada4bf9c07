//! MS-DOS date/time stamps.
//!
//! ZIP stores the last-modified time of an entry as two 16-bit words in the
//! MS-DOS layout: 2-second resolution, years 1980 through 2107, no time zone.
//! Conversions to and from [`SystemTime`] treat the stamp as UTC.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SECONDS_PER_DAY: u64 = 86_400;

/// A DOS date/time pair as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DosDateTime {
    /// Packed date: `(year - 1980) << 9 | month << 5 | day`.
    pub date: u16,
    /// Packed time: `hour << 11 | minute << 5 | second / 2`.
    pub time: u16,
}

impl Default for DosDateTime {
    /// 1980-01-01 00:00:00, the DOS epoch.
    fn default() -> Self {
        Self {
            date: (1 << 5) | 1,
            time: 0,
        }
    }
}

impl DosDateTime {
    /// Build from raw header words.
    pub fn from_parts(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Build from calendar fields, returning `None` when out of the DOS range.
    pub fn from_fields(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Option<Self> {
        if !(1980..=2107).contains(&year)
            || !(1..=12).contains(&month)
            || day == 0
            || day > days_in_month(year as i64, month as u32) as u8
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }
        Some(Self {
            date: ((year - 1980) << 9) | ((month as u16) << 5) | day as u16,
            time: ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2),
        })
    }

    /// Current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a [`SystemTime`], clamping to the representable range.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs(),
            Err(_) => return Self::default(),
        };
        let days = (secs / SECONDS_PER_DAY) as i64;
        let rem = secs % SECONDS_PER_DAY;
        let (year, month, day) = civil_from_days(days);

        if year < 1980 {
            return Self::default();
        }
        if year > 2107 {
            return Self {
                date: (127 << 9) | (12 << 5) | 31,
                time: (23 << 11) | (59 << 5) | 29,
            };
        }

        let hour = (rem / 3600) as u8;
        let minute = ((rem % 3600) / 60) as u8;
        let second = (rem % 60) as u8;
        Self::from_fields(year as u16, month as u8, day as u8, hour, minute, second)
            .unwrap_or_default()
    }

    /// Convert to a [`SystemTime`].
    pub fn to_system_time(self) -> SystemTime {
        let year = self.year() as i64;
        let month = self.month().clamp(1, 12) as u32;
        let day = self.day().max(1) as u32;
        let days = days_from_civil(year, month, day).max(0) as u64;
        let secs = days * SECONDS_PER_DAY
            + self.hour() as u64 * 3600
            + self.minute() as u64 * 60
            + self.second() as u64;
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    /// Calendar year.
    pub fn year(self) -> u16 {
        (self.date >> 9) + 1980
    }

    /// Month, 1-12.
    pub fn month(self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }

    /// Day of month, 1-31.
    pub fn day(self) -> u8 {
        (self.date & 0x1F) as u8
    }

    /// Hour, 0-23.
    pub fn hour(self) -> u8 {
        (self.time >> 11) as u8
    }

    /// Minute, 0-59.
    pub fn minute(self) -> u8 {
        ((self.time >> 5) & 0x3F) as u8
    }

    /// Second, always even.
    pub fn second(self) -> u8 {
        ((self.time & 0x1F) * 2) as u8
    }
}

impl std::fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap(year) => 29,
        _ => 28,
    }
}

// Days since 1970-01-01 for a proleptic Gregorian date (H. Hinnant).
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_dos_epoch() {
        let dt = DosDateTime::default();
        assert_eq!(dt.year(), 1980);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 1);
        assert_eq!(dt.to_string(), "1980-01-01 00:00:00");
    }

    #[test]
    fn test_fields_roundtrip() {
        let dt = DosDateTime::from_fields(2024, 2, 29, 13, 45, 31).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 2);
        assert_eq!(dt.day(), 29);
        assert_eq!(dt.hour(), 13);
        assert_eq!(dt.minute(), 45);
        // two second resolution
        assert_eq!(dt.second(), 30);
    }

    #[test]
    fn test_invalid_fields() {
        assert!(DosDateTime::from_fields(1979, 12, 31, 0, 0, 0).is_none());
        assert!(DosDateTime::from_fields(2023, 2, 29, 0, 0, 0).is_none());
        assert!(DosDateTime::from_fields(2023, 13, 1, 0, 0, 0).is_none());
    }

    #[test]
    fn test_system_time_roundtrip() {
        // 2021-06-15 08:30:42 UTC
        let time = UNIX_EPOCH + Duration::from_secs(1_623_745_842);
        let dt = DosDateTime::from_system_time(time);
        assert_eq!(dt.to_string(), "2021-06-15 08:30:42");
        assert_eq!(dt.to_system_time(), time);
    }

    #[test]
    fn test_before_epoch_clamps() {
        let dt = DosDateTime::from_system_time(UNIX_EPOCH);
        assert_eq!(dt, DosDateTime::default());
    }

    #[test]
    fn test_civil_conversion() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(days_from_civil(2000, 2, 29)), (2000, 2, 29));
    }
}
