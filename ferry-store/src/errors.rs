use std::error::Error as StdError;

/// Failures reported by a [`crate::models::MultipartStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Credentials are missing, expired or rejected.
    #[error("Not authorized: {reason}")]
    Auth { reason: String },

    /// The bucket does not exist or cannot be seen with these credentials.
    #[error("Bucket not found: s3://{bucket}")]
    NotFound { bucket: String },

    /// Any other failure while moving bytes.
    #[error("Transfer to s3://{bucket}/{key} failed: {source}")]
    Transfer {
        bucket: String,
        key: String,
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl StoreError {
    pub fn transfer(
        bucket: &str,
        key: &str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        StoreError::Transfer {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }
}
