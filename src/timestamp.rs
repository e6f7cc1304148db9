//! MS-DOS timestamp handling.
//!
//! ZIP headers store an entry's modification time as two 16-bit MS-DOS
//! fields. This module provides [`DosDateTime`] for converting between those
//! fields and Unix time.
//!
//! # Precision
//!
//! - 2-second resolution (odd seconds round down)
//! - Years 1980 through 2107; earlier times clamp to 1980-01-01 00:00:00,
//!   later ones to 2107-12-31 23:59:58
//! - No time zone: values are interpreted as UTC
//!
//! # Example
//!
//! ```rust
//! use jarcloak::DosDateTime;
//!
//! let ts = DosDateTime::from_unix_secs(1_700_000_000);
//! assert_eq!(ts.as_unix_secs(), 1_700_000_000);
//! assert_eq!(ts.year(), 2023);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds per day.
const SECS_PER_DAY: i64 = 86_400;

/// Unix time of 1980-01-01 00:00:00 UTC, the DOS epoch.
const DOS_EPOCH_UNIX: i64 = 315_532_800;

/// A modification time as stored in ZIP local and central headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DosDateTime {
    /// Date field: `(year - 1980) << 9 | month << 5 | day`.
    date: u16,
    /// Time field: `hour << 11 | minute << 5 | second / 2`.
    time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable time.
    pub const EPOCH: Self = Self {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// Creates a timestamp from raw header fields.
    #[inline]
    pub const fn from_fields(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Returns the raw date field.
    #[inline]
    pub const fn date(&self) -> u16 {
        self.date
    }

    /// Returns the raw time field.
    #[inline]
    pub const fn time(&self) -> u16 {
        self.time
    }

    /// Returns the calendar year.
    pub fn year(&self) -> i64 {
        1980 + i64::from(self.date >> 9)
    }

    /// Converts Unix seconds to a DOS timestamp, clamping to the
    /// representable range.
    pub fn from_unix_secs(secs: i64) -> Self {
        let max = Self::from_civil(2107, 12, 31, 23, 59, 58).as_unix_secs();
        if secs <= DOS_EPOCH_UNIX {
            return Self::EPOCH;
        }
        let secs = secs.min(max);
        let days = secs.div_euclid(SECS_PER_DAY);
        let rem = secs.rem_euclid(SECS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        Self::from_civil(
            year,
            month,
            day,
            (rem / 3600) as u16,
            ((rem % 3600) / 60) as u16,
            (rem % 60) as u16,
        )
    }

    /// Converts to Unix seconds.
    ///
    /// Out-of-range fields (month 0, day 0) are normalized the way most ZIP
    /// tools do: treated as the first month or day.
    pub fn as_unix_secs(&self) -> i64 {
        let year = self.year();
        let month = i64::from((self.date >> 5) & 0x0F).clamp(1, 12);
        let day = i64::from(self.date & 0x1F).max(1);
        let hour = i64::from(self.time >> 11);
        let minute = i64::from((self.time >> 5) & 0x3F);
        let second = i64::from(self.time & 0x1F) * 2;
        days_from_civil(year, month, day) * SECS_PER_DAY + hour * 3600 + minute * 60 + second
    }

    /// Converts a [`SystemTime`] to a DOS timestamp.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            Err(_) => return Self::EPOCH,
        };
        Self::from_unix_secs(secs)
    }

    /// Converts to a [`SystemTime`].
    pub fn as_system_time(&self) -> SystemTime {
        // Always after the Unix epoch.
        UNIX_EPOCH + Duration::from_secs(self.as_unix_secs() as u64)
    }

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    fn from_civil(year: i64, month: i64, day: i64, hour: u16, minute: u16, second: u16) -> Self {
        let date = (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16;
        let time = (hour << 11) | (minute << 5) | (second / 2);
        Self { date, time }
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl From<SystemTime> for DosDateTime {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}
