use std::fmt;

use crate::errors::FerryError;

/// One month of one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub dataset: String,
    pub year: u16,
    pub month: u8,
}

impl Period {
    pub fn new(dataset: &str, year: u16, month: u8) -> Result<Self, FerryError> {
        if dataset.is_empty() || dataset.contains('/') {
            return Err(FerryError::Config(format!("invalid dataset name {dataset:?}")));
        }
        if !(1000..=9999).contains(&year) {
            return Err(FerryError::Config(format!("year {year} is not four digits")));
        }
        if !(1..=12).contains(&month) {
            return Err(FerryError::Config(format!("month {month} is out of range")));
        }
        Ok(Period {
            dataset: dataset.to_string(),
            year,
            month,
        })
    }

    /// January through December of `year`.
    pub fn months(dataset: &str, year: u16) -> Result<Vec<Period>, FerryError> {
        (1..=12).map(|month| Period::new(dataset, year, month)).collect()
    }

    /// `<dataset>_tripdata_<yyyy>-<mm>`
    pub fn file_stem(&self) -> String {
        format!(
            "{}_tripdata_{:04}-{:02}",
            self.dataset, self.year, self.month
        )
    }

    pub fn raw_file_name(&self) -> String {
        format!("{}.parquet", self.file_stem())
    }

    pub fn compressed_file_name(&self) -> String {
        format!("{}.parquet.gz", self.file_stem())
    }

    /// `host` may carry its own scheme; bare hosts are served over https.
    pub fn source_url(&self, host: &str) -> String {
        let host = host.trim_end_matches('/');
        if host.contains("://") {
            format!("{}/trip-data/{}", host, self.raw_file_name())
        } else {
            format!("https://{}/trip-data/{}", host, self.raw_file_name())
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:04}-{:02}", self.dataset, self.year, self.month)
    }
}
