/*!
[`BillingPeriod`], a calendar month normalized to first-of-month UTC.
*/

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// A calendar month, always normalized to day=1, 00:00:00Z.
///
/// Constructing one always truncates to the first of the month; there is
/// no way to build a `BillingPeriod` that doesn't satisfy that invariant.
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    /// Build from a (year, month) pair. `month` must be 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, Error> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidFormat(format!("month {month}")));
        }
        Ok(BillingPeriod { year, month })
    }

    /// Truncate an arbitrary date-time to the first of its month.
    pub fn from_datetime<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        BillingPeriod {
            year: dt.year(),
            month: dt.month(),
        }
    }

    /// Parse a `YYYY-MM` string.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (year_str, month_str) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidFormat(format!("billing period '{s}'")))?;
        let year: i32 = year_str
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("billing period '{s}'")))?;
        let month: u32 = month_str
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("billing period '{s}'")))?;
        BillingPeriod::new(year, month)
    }

    /// The year component
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month component, 1..=12
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The UTC timestamp for the first instant of this month.
    pub fn as_utc(&self) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("year/month validated at construction")
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc()
    }

    /// Render as the `YYYY_MM` suffix used in table names.
    pub fn table_suffix(&self) -> String {
        format!("{:04}_{:02}", self.year, self.month)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_year_and_month() {
        let period = BillingPeriod::parse("2024-03").unwrap();
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 3);
    }

    #[test]
    fn parse_rejects_month_out_of_range() {
        assert!(BillingPeriod::parse("2024-13").is_err());
        assert!(BillingPeriod::parse("2024-00").is_err());
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(BillingPeriod::parse("2024/03").is_err());
        assert!(BillingPeriod::parse("2024").is_err());
    }

    #[test]
    fn from_datetime_truncates_to_first_of_month() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 17, 13, 45, 0).unwrap();
        let period = BillingPeriod::from_datetime(dt);
        assert_eq!(period, BillingPeriod::new(2024, 3).unwrap());
    }

    #[test]
    fn as_utc_is_midnight_on_the_first() {
        let period = BillingPeriod::new(2024, 3).unwrap();
        let utc = period.as_utc();
        assert_eq!((utc.year(), utc.month(), utc.day()), (2024, 3, 1));
        assert_eq!((utc.hour(), utc.minute(), utc.second()), (0, 0, 0));
    }

    #[test]
    fn table_suffix_is_zero_padded() {
        let period = BillingPeriod::new(2024, 3).unwrap();
        assert_eq!(period.table_suffix(), "2024_03");
    }

    #[test]
    fn display_round_trips_through_parse() {
        let period = BillingPeriod::new(2024, 3).unwrap();
        assert_eq!(BillingPeriod::parse(&period.to_string()).unwrap(), period);
    }

    #[test]
    fn ordering_is_chronological() {
        let jan = BillingPeriod::new(2024, 1).unwrap();
        let feb = BillingPeriod::new(2024, 2).unwrap();
        let next_jan = BillingPeriod::new(2025, 1).unwrap();
        assert!(jan < feb);
        assert!(feb < next_jan);
    }
}
