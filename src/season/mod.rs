//! Season identifiers and period completeness
//!
//! Seasons are normalised to a canonical four character code before they are
//! used as task keys, so `2021-2022`, `21/22` and `2122` all refer to the same
//! unit of work. [`is_period_complete`] decides whether a season has finished,
//! which the orchestrator turns into a `force_refresh` flag so unfinished
//! seasons are never served from cache.
//!
//! [`CURRENT_SEASON`] and [`season_range`] back the daily and historical run
//! modes of the binary.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Season argument standing for whichever season is running today
pub const CURRENT_SEASON: &str = "current";

/// First month of a multi-year season
const SEASON_START_MONTH: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeasonError {
    #[error("Unrecognized season code: '{0}'")]
    Unrecognized(String),

    #[error("Invalid season end month: {0}")]
    InvalidEndMonth(u32),

    #[error("Invalid season range: {0} to {1}")]
    InvalidRange(i32, i32),
}

/// How a league labels its seasons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeasonCode {
    /// Calendar-year seasons, e.g. `2021`
    SingleYear,
    /// Seasons spanning two years, e.g. `2122`
    #[default]
    MultiYear,
}

impl SeasonCode {
    /// Normalises a season string relative to today
    pub fn parse(&self, season: &str) -> Result<String, SeasonError> {
        self.resolve(season, Utc::now())
    }

    /// Normalises a season string relative to `now`, expanding [`CURRENT_SEASON`]
    pub fn resolve(&self, season: &str, now: DateTime<Utc>) -> Result<String, SeasonError> {
        if season.trim().eq_ignore_ascii_case(CURRENT_SEASON) {
            return Ok(self.current(now));
        }
        self.parse_at(season, now.year())
    }

    /// Code of the season running at `now`
    ///
    /// Multi-year seasons roll over in August: on 15 March 2025 the current
    /// season is `2425`, on 15 August 2025 it is `2526`.
    pub fn current(&self, now: DateTime<Utc>) -> String {
        match self {
            SeasonCode::SingleYear => now.year().to_string(),
            SeasonCode::MultiYear => {
                let start = if now.month() < SEASON_START_MONTH {
                    now.year() - 1
                } else {
                    now.year()
                };
                format!("{:02}{:02}", start.rem_euclid(100), (start + 1).rem_euclid(100))
            }
        }
    }

    /// Normalises a season string, resolving two-digit years against `current_year`
    ///
    /// Accepted inputs: `1994`, `9495`, `94`, `1994-1995`, `1994/1995`,
    /// `1994-95`, `94-95` and `94/95`.
    pub fn parse_at(&self, season: &str, current_year: i32) -> Result<String, SeasonError> {
        let season = season.trim();
        let unrecognized = || SeasonError::Unrecognized(season.to_string());

        let (first, second) = match season.find(['-', '/']) {
            Some(pos) => (&season[..pos], Some(&season[pos + 1..])),
            None => (season, None),
        };

        if !is_digits(first) || !second.map_or(true, is_digits) {
            return Err(unrecognized());
        }

        match (first.len(), second.map(str::len)) {
            (4, None) => Ok(self.four_digits(first, current_year)),
            (2, None) => {
                let yy = two_digits(first);
                Ok(match self {
                    SeasonCode::MultiYear => multi_year_from(yy),
                    SeasonCode::SingleYear => pivot_year(yy, current_year).to_string(),
                })
            }
            // 1994-1995, 1994/1995 and 1994-95
            (4, Some(4)) | (4, Some(2)) => {
                let second = second.ok_or_else(unrecognized)?;
                Ok(match self {
                    SeasonCode::MultiYear => format!("{}{}", &first[2..], &second[second.len() - 2..]),
                    SeasonCode::SingleYear => first.to_string(),
                })
            }
            // 94-95 and 94/95
            (2, Some(2)) => {
                let second = second.ok_or_else(unrecognized)?;
                Ok(match self {
                    SeasonCode::MultiYear => format!("{}{}", first, second),
                    SeasonCode::SingleYear => {
                        pivot_year(two_digits(first), current_year).to_string()
                    }
                })
            }
            _ => Err(unrecognized()),
        }
    }

    fn four_digits(&self, season: &str, current_year: i32) -> String {
        let head = two_digits(&season[..2]);
        let tail = two_digits(&season[2..]);

        match self {
            SeasonCode::MultiYear => {
                if (head + 1) % 100 == tail {
                    season.to_string()
                } else {
                    // A calendar year names the season starting in it
                    multi_year_from(tail)
                }
            }
            SeasonCode::SingleYear => {
                if head == 19 || head == 20 {
                    season.to_string()
                } else {
                    pivot_year(head, current_year).to_string()
                }
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn two_digits(s: &str) -> u32 {
    s.bytes().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
}

fn multi_year_from(yy: u32) -> String {
    format!("{:02}{:02}", yy, (yy + 1) % 100)
}

/// Expands a two-digit year to the latest year not after `current_year`
fn pivot_year(yy: u32, current_year: i32) -> i32 {
    // yy < 100, so the cast is lossless
    let in_2000s = 2000 + yy as i32;
    if in_2000s <= current_year {
        in_2000s
    } else {
        1900 + yy as i32
    }
}

/// Expands the final two digits of a season code the way `%y` does (00-68 -> 20xx)
fn final_year(season: &str) -> Result<i32, SeasonError> {
    let tail = season
        .get(season.len().saturating_sub(2)..)
        .filter(|t| t.len() == 2 && is_digits(t))
        .ok_or_else(|| SeasonError::Unrecognized(season.to_string()))?;
    let yy = two_digits(tail) as i32;
    Ok(if yy < 69 { 2000 + yy } else { 1900 + yy })
}

/// Seasons starting in `start_year` through `end_year`, inclusive
///
/// Each entry is a `YYYY-YYYY` label, which every [`SeasonCode`] reads as the
/// season starting in the first year: `2020-2021` is `2021` for multi-year
/// leagues and `2020` for calendar-year ones.
pub fn season_range(start_year: i32, end_year: i32) -> Result<Vec<String>, SeasonError> {
    if start_year > end_year || start_year < 1000 || end_year > 9998 {
        return Err(SeasonError::InvalidRange(start_year, end_year));
    }
    Ok((start_year..=end_year)
        .map(|year| format!("{}-{}", year, year + 1))
        .collect())
}

/// Returns the instant a season is considered finished
///
/// Without a configured end month a season ends on 1 July of its final year;
/// otherwise it ends on the first day of the month after `season_end_month`.
pub fn season_end(season: &str, season_end_month: Option<u32>) -> Result<DateTime<Utc>, SeasonError> {
    let year = final_year(season)?;

    let (year, month) = match season_end_month {
        None => (year, 7),
        Some(12) => (year + 1, 1),
        Some(m @ 1..=11) => (year, m + 1),
        Some(m) => return Err(SeasonError::InvalidEndMonth(m)),
    };

    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| SeasonError::Unrecognized(season.to_string()))
}

/// Whether `season` had finished at `now`
pub fn is_period_complete(
    season: &str,
    season_end_month: Option<u32>,
    now: DateTime<Utc>,
) -> Result<bool, SeasonError> {
    Ok(now >= season_end(season, season_end_month)?)
}
