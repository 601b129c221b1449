use std::{
    error::Error as StdError,
    path::{Path, PathBuf},
};

use ferry_store::errors::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum FerryError {
    /// The host could not be reached or the connection dropped mid-transfer.
    #[error("Network error fetching {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The input is not a readable parquet file.
    #[error("Invalid parquet data in {}: {source}", path.display())]
    Format {
        path: PathBuf,
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Upload of {} to s3://{bucket}/{key} failed: {source}", path.display())]
    Upload {
        path: PathBuf,
        bucket: String,
        key: String,
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Could not remove {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FerryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FerryError::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps a store failure met while uploading `path` to `bucket/key`.
    pub(crate) fn from_store(path: &Path, bucket: &str, key: &str, e: StoreError) -> Self {
        match e {
            StoreError::Auth { reason } => FerryError::Auth(reason),
            StoreError::NotFound { bucket } => FerryError::NotFound(format!("bucket s3://{bucket}")),
            StoreError::Transfer { source, .. } => FerryError::Upload {
                path: path.to_path_buf(),
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            },
        }
    }
}
