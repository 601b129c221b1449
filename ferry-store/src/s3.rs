use std::fmt::Debug;

use async_trait::async_trait;
use aws_sdk_s3::{
    error::{ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};

use crate::{
    errors::StoreError,
    models::{CompletedChunk, MultipartStore},
};

const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
];

const NOT_FOUND_ERROR_CODES: &[&str] = &["NoSuchBucket", "NotFound"];

#[async_trait]
impl MultipartStore for Client {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        self.put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(bucket, key, e))?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, StoreError> {
        let output = self
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(bucket, key, e))?;

        match output.upload_id() {
            Some(id) => Ok(id.to_string()),
            None => Err(StoreError::transfer(
                bucket,
                key,
                "CreateMultipartUpload returned no upload id",
            )),
        }
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<CompletedChunk, StoreError> {
        let output = self
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(bucket, key, e))?;

        let e_tag = output.e_tag().ok_or_else(|| {
            StoreError::transfer(bucket, key, format!("part {part_number} returned no ETag"))
        })?;

        Ok(CompletedChunk {
            part_number,
            e_tag: e_tag.to_string(),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedChunk>,
    ) -> Result<(), StoreError> {
        let parts = parts
            .into_iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.e_tag)
                    .build()
            })
            .collect();

        self.complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify(bucket, key, e))?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        self.abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| classify(bucket, key, e))?;
        Ok(())
    }
}

/// Sorts an SDK failure into auth, missing bucket, or plain transfer failure
/// by the service error code.
fn classify<E, R>(bucket: &str, key: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);

    match code.as_deref() {
        Some(c) if AUTH_ERROR_CODES.contains(&c) => StoreError::Auth {
            reason: format!(
                "s3://{bucket}: {}",
                err.as_service_error()
                    .and_then(|e| e.message())
                    .unwrap_or(c)
            ),
        },
        Some(c) if NOT_FOUND_ERROR_CODES.contains(&c) => StoreError::NotFound {
            bucket: bucket.to_string(),
        },
        _ => StoreError::transfer(bucket, key, err),
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::{error::ErrorMetadata, operation::put_object::PutObjectError};
    use aws_smithy_runtime_api::http::{Response, StatusCode};
    use aws_smithy_types::body::SdkBody;

    use super::*;

    fn service_error(status: u16, code: &str) -> SdkError<PutObjectError, Response> {
        let meta = ErrorMetadata::builder()
            .code(code)
            .message(format!("{code} returned by the service"))
            .build();
        let raw = Response::new(StatusCode::try_from(status).unwrap(), SdkBody::empty());
        SdkError::service_error(PutObjectError::generic(meta), raw)
    }

    #[test]
    fn test_auth_codes_classified_as_auth() {
        for code in AUTH_ERROR_CODES {
            let err = classify("trips", "k", service_error(403, code));
            match err {
                StoreError::Auth { reason } => {
                    assert!(reason.starts_with("s3://trips: "), "{reason}");
                    assert!(reason.contains(code), "{reason}");
                }
                other => panic!("{code} classified as {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_bucket_classified_as_not_found() {
        for code in NOT_FOUND_ERROR_CODES {
            let err = classify("trips", "k", service_error(404, code));
            assert!(
                matches!(&err, StoreError::NotFound { bucket } if bucket == "trips"),
                "{code} classified as {err:?}"
            );
        }
    }

    #[test]
    fn test_other_codes_classified_as_transfer() {
        let err = classify("trips", "trip-data/a.parquet", service_error(503, "SlowDown"));

        match err {
            StoreError::Transfer { bucket, key, .. } => {
                assert_eq!(bucket, "trips");
                assert_eq!(key, "trip-data/a.parquet");
            }
            other => panic!("SlowDown classified as {other:?}"),
        }
    }
}
