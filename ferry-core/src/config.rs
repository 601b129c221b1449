use std::path::PathBuf;

use crate::errors::FerryError;

pub const MIB: u64 = 1024 * 1024;

/// Default host serving the monthly trip record files.
pub const DEFAULT_SOURCE_HOST: &str = "d37ci6vzurychx.cloudfront.net";
/// Default key prefix in the destination bucket.
pub const DEFAULT_PREFIX: &str = "trip-data";

/// Multipart tuning for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Files of at least this many bytes go through a multipart session.
    pub threshold: u64,
    pub chunk_size: u64,
    /// Upper bound on parts in flight at once.
    pub max_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            threshold: 5 * MIB,
            chunk_size: 5 * MIB,
            max_concurrency: 10,
        }
    }
}

/// What the driver does when a period fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the run and return the error.
    #[default]
    Halt,
    /// Record the failure and move on to the next period.
    Continue,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub source_host: String,
    pub prefix: String,
    /// Directory for the two scratch files of each period.
    pub work_dir: PathBuf,
    pub error_policy: ErrorPolicy,
    pub transfer: TransferConfig,
}

impl Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Config {
            bucket: bucket.into(),
            source_host: DEFAULT_SOURCE_HOST.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            work_dir: PathBuf::from("."),
            error_policy: ErrorPolicy::default(),
            transfer: TransferConfig::default(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// `BUCKET_NAME` is required (`AWS_S3_BUCKET` is accepted as well).
    /// `FERRY_SOURCE_HOST`, `FERRY_PREFIX` and `FERRY_WORK_DIR` override the defaults.
    pub fn from_env() -> Result<Self, FerryError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, FerryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bucket = var("BUCKET_NAME")
            .or_else(|| var("AWS_S3_BUCKET"))
            .ok_or_else(|| {
                FerryError::Config("BUCKET_NAME environment variable has to be set".to_string())
            })?;

        let mut config = Config::new(bucket);
        if let Some(host) = var("FERRY_SOURCE_HOST") {
            config.source_host = host;
        }
        if let Some(prefix) = lookup("FERRY_PREFIX") {
            config.prefix = prefix.trim_matches('/').to_string();
        }
        if let Some(dir) = var("FERRY_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        Ok(config)
    }
}
