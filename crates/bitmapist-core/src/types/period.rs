//! Time-period coordinates.
//!
//! A [`Period`] is one bucket of one [`Granularity`]: a dateless "unique"
//! bucket, or a calendar year, month, ISO week, day or hour. Periods are plain
//! values; the same calendar fields always produce the same key suffix, which
//! is what lets independently built handles land on the same store key.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{BitmapistError, BitmapistResult, ErrorCode};

/// Time-bucket width of a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Granularity {
    /// Dateless: one bitmap per event, forever.
    Unique,
    Year,
    Month,
    /// ISO week (Monday start).
    Week,
    Day,
    Hour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "granularity", rename_all = "lowercase")]
enum Coord {
    Unique,
    Year { year: i32 },
    Month { year: i32, month: u32 },
    Week { year: i32, week: u32 },
    Day { year: i32, month: u32, day: u32 },
    Hour { year: i32, month: u32, day: u32, hour: u32 },
}

/// A validated period coordinate.
///
/// Construct with [`Period::year`], [`Period::month`], [`Period::week`],
/// [`Period::day`], [`Period::hour`], [`Period::unique`] or resolve one from an
/// instant with [`Period::containing`]. Invalid calendar fields are rejected
/// with [`BitmapistError::InvalidPeriod`]; nothing is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(Coord);

impl Period {
    /// The dateless bucket.
    pub fn unique() -> Self {
        Self(Coord::Unique)
    }

    /// A calendar year.
    pub fn year(year: i32) -> BitmapistResult<Self> {
        check_date(year, 1, 1)?;
        check_date(year, 12, 31)?;
        Ok(Self(Coord::Year { year }))
    }

    /// A calendar month (1-based).
    pub fn month(year: i32, month: u32) -> BitmapistResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(BitmapistError::invalid_period(
                ErrorCode::PerInvalidMonth,
                format!("month {} is outside 1..=12", month),
            ));
        }
        check_date(year, month, 1)?;
        Ok(Self(Coord::Month { year, month }))
    }

    /// An ISO week of an ISO year.
    pub fn week(iso_year: i32, week: u32) -> BitmapistResult<Self> {
        if NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Mon).is_none()
            || NaiveDate::from_isoywd_opt(iso_year, week, Weekday::Sun).is_none()
        {
            return Err(BitmapistError::invalid_period(
                ErrorCode::PerInvalidWeek,
                format!("ISO year {} has no week {}", iso_year, week),
            ));
        }
        Ok(Self(Coord::Week { year: iso_year, week }))
    }

    /// A calendar day.
    pub fn day(year: i32, month: u32, day: u32) -> BitmapistResult<Self> {
        Self::month(year, month)?;
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(BitmapistError::invalid_period(
                ErrorCode::PerInvalidDay,
                format!("{}-{} has no day {}", year, month, day),
            ));
        }
        Ok(Self(Coord::Day { year, month, day }))
    }

    /// An hour of a calendar day (0-based).
    pub fn hour(year: i32, month: u32, day: u32, hour: u32) -> BitmapistResult<Self> {
        Self::day(year, month, day)?;
        if hour > 23 {
            return Err(BitmapistError::invalid_period(
                ErrorCode::PerInvalidHour,
                format!("hour {} is outside 0..=23", hour),
            ));
        }
        Ok(Self(Coord::Hour {
            year,
            month,
            day,
            hour,
        }))
    }

    /// The period of the given granularity that contains `instant`.
    pub fn containing(granularity: Granularity, instant: DateTime<Utc>) -> Self {
        let coord = match granularity {
            Granularity::Unique => Coord::Unique,
            Granularity::Year => Coord::Year {
                year: instant.year(),
            },
            Granularity::Month => Coord::Month {
                year: instant.year(),
                month: instant.month(),
            },
            Granularity::Week => {
                let iso = instant.iso_week();
                Coord::Week {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
            Granularity::Day => Coord::Day {
                year: instant.year(),
                month: instant.month(),
                day: instant.day(),
            },
            Granularity::Hour => Coord::Hour {
                year: instant.year(),
                month: instant.month(),
                day: instant.day(),
                hour: instant.hour(),
            },
        };
        Self(coord)
    }

    /// The granularity of this period.
    pub fn granularity(&self) -> Granularity {
        match self.0 {
            Coord::Unique => Granularity::Unique,
            Coord::Year { .. } => Granularity::Year,
            Coord::Month { .. } => Granularity::Month,
            Coord::Week { .. } => Granularity::Week,
            Coord::Day { .. } => Granularity::Day,
            Coord::Hour { .. } => Granularity::Hour,
        }
    }

    /// Calendar (or ISO, for weeks) year, if the period has one.
    pub fn year_number(&self) -> Option<i32> {
        match self.0 {
            Coord::Unique => None,
            Coord::Year { year }
            | Coord::Month { year, .. }
            | Coord::Week { year, .. }
            | Coord::Day { year, .. }
            | Coord::Hour { year, .. } => Some(year),
        }
    }

    /// The period `n` units away in its own granularity.
    ///
    /// Unique periods have no time axis and are returned unchanged.
    pub fn delta(&self, n: i64) -> BitmapistResult<Self> {
        match self.0 {
            Coord::Unique => Ok(*self),
            Coord::Year { year } => {
                let year = i32::try_from(i64::from(year) + n).map_err(|_| out_of_range(n))?;
                Self::year(year)
            }
            Coord::Month { year, month } => {
                let total = i64::from(year) * 12 + i64::from(month) - 1 + n;
                let year = i32::try_from(total.div_euclid(12)).map_err(|_| out_of_range(n))?;
                Self::month(year, total.rem_euclid(12) as u32 + 1)
            }
            Coord::Week { year, week } => {
                let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
                    .ok_or_else(|| out_of_range(n))?;
                let shifted = Duration::try_weeks(n)
                    .and_then(|d| monday.checked_add_signed(d))
                    .ok_or_else(|| out_of_range(n))?;
                let iso = shifted.iso_week();
                Self::week(iso.year(), iso.week())
            }
            Coord::Day { year, month, day } => {
                let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| out_of_range(n))?;
                let shifted = Duration::try_days(n)
                    .and_then(|d| date.checked_add_signed(d))
                    .ok_or_else(|| out_of_range(n))?;
                Self::day(shifted.year(), shifted.month(), shifted.day())
            }
            Coord::Hour {
                year,
                month,
                day,
                hour,
            } => {
                let at = NaiveDate::from_ymd_opt(year, month, day)
                    .and_then(|d| d.and_hms_opt(hour, 0, 0))
                    .ok_or_else(|| out_of_range(n))?;
                let shifted = Duration::try_hours(n)
                    .and_then(|d| at.checked_add_signed(d))
                    .ok_or_else(|| out_of_range(n))?;
                Self::hour(
                    shifted.year(),
                    shifted.month(),
                    shifted.day(),
                    shifted.hour(),
                )
            }
        }
    }

    /// The next period.
    pub fn next(&self) -> BitmapistResult<Self> {
        self.delta(1)
    }

    /// The previous period.
    pub fn prev(&self) -> BitmapistResult<Self> {
        self.delta(-1)
    }

    /// First instant of the period. `None` for unique periods.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        let naive = match self.0 {
            Coord::Unique => return None,
            Coord::Year { year } => midnight(year, 1, 1)?,
            Coord::Month { year, month } => midnight(year, month, 1)?,
            Coord::Week { year, week } => {
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?.and_hms_opt(0, 0, 0)?
            }
            Coord::Day { year, month, day } => midnight(year, month, day)?,
            Coord::Hour {
                year,
                month,
                day,
                hour,
            } => NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)?,
        };
        Some(naive.and_utc())
    }

    /// Last instant (inclusive, microsecond precision) of the period.
    /// `None` for unique periods.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        let naive = match self.0 {
            Coord::Unique => return None,
            Coord::Year { year } => last_micro(NaiveDate::from_ymd_opt(year, 12, 31)?, 23)?,
            Coord::Month { year, month } => {
                let first_of_next = if month == 12 {
                    NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                };
                last_micro(first_of_next?.pred_opt()?, 23)?
            }
            Coord::Week { year, week } => {
                last_micro(NaiveDate::from_isoywd_opt(year, week, Weekday::Sun)?, 23)?
            }
            Coord::Day { year, month, day } => {
                last_micro(NaiveDate::from_ymd_opt(year, month, day)?, 23)?
            }
            Coord::Hour {
                year,
                month,
                day,
                hour,
            } => last_micro(NaiveDate::from_ymd_opt(year, month, day)?, hour)?,
        };
        Some(naive.and_utc())
    }

    /// Whether the period closed strictly before `now`.
    ///
    /// Unique periods never finish.
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.end().is_some_and(|end| end < now)
    }

    /// Granularity-specific key suffix.
    ///
    /// Numbers are not zero padded: `2024-3`, `W2024-9`, `2024-3-7-5`.
    pub fn suffix(&self) -> String {
        match self.0 {
            Coord::Unique => "u".to_string(),
            Coord::Year { year } => year.to_string(),
            Coord::Month { year, month } => format!("{}-{}", year, month),
            Coord::Week { year, week } => format!("W{}-{}", year, week),
            Coord::Day { year, month, day } => format!("{}-{}-{}", year, month, day),
            Coord::Hour {
                year,
                month,
                day,
                hour,
            } => format!("{}-{}-{}-{}", year, month, day, hour),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.granularity(), self.suffix())
    }
}

fn check_date(year: i32, month: u32, day: u32) -> BitmapistResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        BitmapistError::invalid_period(
            ErrorCode::PerOutOfRange,
            format!("{}-{}-{} is not a representable date", year, month, day),
        )
    })
}

fn midnight(year: i32, month: u32, day: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

fn last_micro(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    date.and_hms_micro_opt(hour, 59, 59, 999_999)
}

fn out_of_range(n: i64) -> BitmapistError {
    BitmapistError::invalid_period(
        ErrorCode::PerOutOfRange,
        format!("shifting by {} leaves the representable calendar", n),
    )
}
