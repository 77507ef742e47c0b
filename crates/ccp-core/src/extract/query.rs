//! Socrata query URLs.

use ccp_common::{days_in_month, Partition, Result};

/// URL for one calendar month of crimes.
pub struct CrimesQuery;

impl CrimesQuery {
    /// `<base>?$limit=<limit>&$where=date between '<Y>-<MM>-01T00:00:00' and
    /// '<Y>-<MM>-<last>T23:59:59'`, percent-encoded.
    pub fn for_month(base_url: &str, limit: u32, year: i32, month: u32) -> Result<String> {
        Partition::month(year, month)?;
        let last = days_in_month(year, month);
        Ok(format!(
            "{base_url}?$limit={limit}\
             &$where=date%20between%20%27{year}-{month:02}-01T00:00:00%27\
             %20and%20%27{year}-{month:02}-{last:02}T23:59:59%27"
        ))
    }

    /// Same as [`CrimesQuery::for_month`] for a month partition.
    pub fn for_partition(base_url: &str, limit: u32, partition: Partition) -> Result<String> {
        match partition {
            Partition::Month { year, month } => Self::for_month(base_url, limit, year, month),
            Partition::Whole => Err(ccp_common::Error::InvalidPartition(
                "crimes are extracted per month".to_string(),
            )),
        }
    }
}

/// URL for the full schools dataset.
pub struct SchoolsQuery;

impl SchoolsQuery {
    pub fn url(base_url: &str, limit: u32) -> String {
        format!("{base_url}?$limit={limit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BASE: &str = "https://data.cityofchicago.org/resource/ijzp-q8t2.csv";

    #[test]
    fn february_leap_year() {
        let url = CrimesQuery::for_month(BASE, 100_000, 2020, 2).unwrap();
        assert_eq!(
            url,
            "https://data.cityofchicago.org/resource/ijzp-q8t2.csv?$limit=100000\
             &$where=date%20between%20%272020-02-01T00:00:00%27\
             %20and%20%272020-02-29T23:59:59%27"
        );
    }

    #[test]
    fn month_lengths_in_boundaries() {
        for (year, month, last) in [(2021, 2, 28), (2021, 4, 30), (2021, 12, 31)] {
            let url = CrimesQuery::for_month(BASE, 10, year, month).unwrap();
            assert!(url.contains(&format!("%27{year}-{month:02}-{last}T23:59:59%27")));
        }
    }

    #[test]
    fn invalid_month_rejected() {
        assert!(CrimesQuery::for_month(BASE, 10, 2021, 13).is_err());
        assert!(CrimesQuery::for_partition(BASE, 10, Partition::Whole).is_err());
    }

    #[test]
    fn schools_url() {
        assert_eq!(
            SchoolsQuery::url("https://x/schools.csv", 100_000),
            "https://x/schools.csv?$limit=100000"
        );
    }

    proptest! {
        #[test]
        fn boundary_covers_whole_month(year in 2001i32..2100, month in 1u32..=12) {
            let url = CrimesQuery::for_month(BASE, 100_000, year, month).unwrap();
            let (first, last) = Partition::month(year, month).unwrap().date_bounds().unwrap();
            let start = format!("%27{}T00:00:00%27", first.format("%Y-%m-%d"));
            let end = format!("%27{}T23:59:59%27", last.format("%Y-%m-%d"));
            prop_assert!(url.contains(&start));
            prop_assert!(url.ends_with(&end));
        }
    }
}
