//! Partition keys for source extraction and lake files.
//!
//! Crimes are partitioned by calendar month, schools are written as one
//! file. A partition maps to exactly one object in the lake.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A time-bounded slice of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Partition {
    /// One calendar month.
    Month { year: i32, month: u32 },
    /// The whole dataset.
    Whole,
}

impl Partition {
    /// Create a month partition, rejecting months outside 1..=12.
    pub fn month(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidPartition(format!(
                "month {month} out of range for year {year}"
            )));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(Error::InvalidPartition(format!("year {year} out of range")));
        }
        Ok(Partition::Month { year, month })
    }

    /// All twelve month partitions of a year, in calendar order.
    pub fn months_of(year: i32) -> Vec<Partition> {
        (1..=12).map(|month| Partition::Month { year, month }).collect()
    }

    /// First and last day covered by a month partition.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            Partition::Month { year, month } => {
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                let last = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))?;
                Some((first, last))
            }
            Partition::Whole => None,
        }
    }

    /// Short label used in logs and reports (`2021-03`, `all`).
    pub fn label(&self) -> String {
        match self {
            Partition::Month { year, month } => format!("{year}-{month:02}"),
            Partition::Whole => "all".to_string(),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Number of days in a calendar month, honouring leap years.
///
/// Returns 0 for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .filter(|_| (1..=12).contains(&month))
        .map(|d| d.day())
        .unwrap_or(0)
}
