//! Shamsi (Jalali) calendar support
//!
//! The RFM cutoff date is entered as a Shamsi `YYYY/MM/DD` string. This module
//! parses it and converts between the Jalali and Gregorian civil calendars
//! using the standard arithmetic algorithm.

use chrono::NaiveDate;

use crate::error::{Result, RfmError};

/// A Shamsi calendar date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShamsiDate {
    /// Jalali year
    pub year: i32,
    /// Jalali month, 1..=12
    pub month: u32,
    /// Jalali day of month
    pub day: u32,
}

impl ShamsiDate {
    /// Parse a `YYYY/MM/DD` Shamsi date string
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.trim().split('/').collect();
        if parts.len() != 3 {
            return Err(RfmError::InvalidDate(format!(
                "expected Shamsi date as YYYY/MM/DD, got '{input}'"
            )));
        }
        let year: i32 = parts[0]
            .parse()
            .map_err(|_| RfmError::InvalidDate(format!("invalid Shamsi year '{}'", parts[0])))?;
        let month: u32 = parts[1]
            .parse()
            .map_err(|_| RfmError::InvalidDate(format!("invalid Shamsi month '{}'", parts[1])))?;
        let day: u32 = parts[2]
            .parse()
            .map_err(|_| RfmError::InvalidDate(format!("invalid Shamsi day '{}'", parts[2])))?;

        let date = Self { year, month, day };
        date.validate()?;
        Ok(date)
    }

    fn validate(self) -> Result<()> {
        let max_day = match self.month {
            1..=6 => 31,
            7..=12 => 30,
            _ => {
                return Err(RfmError::InvalidDate(format!(
                    "Shamsi month out of range: {}",
                    self.month
                )))
            }
        };
        if self.day == 0 || self.day > max_day {
            return Err(RfmError::InvalidDate(format!(
                "Shamsi day out of range: {}/{:02}/{:02}",
                self.year, self.month, self.day
            )));
        }
        Ok(())
    }

    /// Convert to the equivalent Gregorian date
    #[must_use]
    pub fn to_gregorian(self) -> NaiveDate {
        let jy = i64::from(self.year) + 1595;
        let mut days = -355_668 + 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + i64::from(self.day);
        days += if self.month < 7 {
            i64::from(self.month - 1) * 31
        } else {
            i64::from(self.month - 7) * 30 + 186
        };

        let mut gy = 400 * (days / 146_097);
        days %= 146_097;
        if days > 36_524 {
            days -= 1;
            gy += 100 * (days / 36_524);
            days %= 36_524;
            if days >= 365 {
                days += 1;
            }
        }
        gy += 4 * (days / 1461);
        days %= 1461;
        if days > 365 {
            gy += (days - 1) / 365;
            days = (days - 1) % 365;
        }

        let mut gd = days + 1;
        let leap = i64::from((gy % 4 == 0 && gy % 100 != 0) || gy % 400 == 0);
        let month_lengths = [31, 28 + leap, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        let mut gm = 0usize;
        while gm < 12 && gd > month_lengths[gm] {
            gd -= month_lengths[gm];
            gm += 1;
        }

        #[allow(clippy::cast_possible_truncation)]
        let (year, month, day) = (gy as i32, gm as u32 + 1, gd as u32);
        NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
    }

    /// Convert a Gregorian date to its Shamsi equivalent
    #[must_use]
    pub fn from_gregorian(date: NaiveDate) -> Self {
        use chrono::Datelike;

        let gy = i64::from(date.year());
        let gm = date.month() as usize;
        let gd = i64::from(date.day());

        const G_D_M: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
        let gy2 = if gm > 2 { gy + 1 } else { gy };
        let mut days = 355_666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
            + gd
            + G_D_M[gm - 1];

        let mut jy = -1595 + 33 * (days / 12_053);
        days %= 12_053;
        jy += 4 * (days / 1461);
        days %= 1461;
        if days > 365 {
            jy += (days - 1) / 365;
            days = (days - 1) % 365;
        }

        let (jm, jd) = if days < 186 {
            (1 + days / 31, 1 + days % 31)
        } else {
            (7 + (days - 186) / 30, 1 + (days - 186) % 30)
        };

        #[allow(clippy::cast_possible_truncation)]
        let (year, month, day) = (jy as i32, jm as u32, jd as u32);
        Self { year, month, day }
    }
}

impl std::fmt::Display for ShamsiDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

/// Parse the optional cutoff input: empty or "0" means no cutoff.
pub fn parse_cutoff(input: &str) -> Result<Option<NaiveDate>> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(None);
    }
    Ok(Some(ShamsiDate::parse(trimmed)?.to_gregorian()))
}
