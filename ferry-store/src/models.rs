use async_trait::async_trait;

use crate::errors::StoreError;

/// A part that the store has accepted, as needed to finish the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedChunk {
    /// 1-based, as S3 numbers parts.
    pub part_number: i32,
    pub e_tag: String,
}

/// Object store operations needed to move one file into a bucket.
///
/// Implemented for [`aws_sdk_s3::Client`] and for [`crate::memory::MemoryStore`].
#[async_trait]
pub trait MultipartStore: Send + Sync {
    /// Single request upload, used below the multipart threshold.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Opens a multipart session and returns its upload id.
    async fn create_multipart_upload(&self, bucket: &str, key: &str)
        -> Result<String, StoreError>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<CompletedChunk, StoreError>;

    /// Assembles the parts into the final object. `parts` must be sorted by part number.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedChunk>,
    ) -> Result<(), StoreError>;

    /// Drops the session and every part uploaded under it.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError>;
}
