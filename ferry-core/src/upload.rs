use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::Arc,
};

use ferry_store::models::{CompletedChunk, MultipartStore};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
    sync::{mpsc, Semaphore},
    task,
};

use crate::{
    config::{TransferConfig, DEFAULT_PREFIX},
    errors::FerryError,
    event::{PartError, PartEvent},
    parts::{is_multipart, plan_parts, UploadPart},
    tracker::ProgressTracker,
};

/// One local file headed for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub bucket: String,
    pub key: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub key: String,
    pub bytes: u64,
    /// 1 when the file went up in a single request.
    pub parts: usize,
}

/// Joins a key prefix and a key. An empty prefix puts the key at the bucket root.
pub fn object_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let key = key.trim_start_matches('/');
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// Sends local files to a bucket, in parallel parts when they are large.
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn MultipartStore>,
    config: TransferConfig,
}

impl Uploader {
    pub fn new(store: Arc<dyn MultipartStore>, config: TransferConfig) -> Self {
        Uploader { store, config }
    }

    /// Uploads `source` to `<prefix>/<destination_key>` in `bucket`, printing
    /// progress to standard output. `prefix` defaults to `trip-data`.
    pub async fn upload(
        &self,
        bucket: &str,
        source: &Path,
        destination_key: &str,
        prefix: Option<&str>,
    ) -> Result<UploadReport, FerryError> {
        let target = TransferTarget {
            bucket: bucket.to_string(),
            key: object_key(prefix.unwrap_or(DEFAULT_PREFIX), destination_key),
            source: source.to_path_buf(),
        };
        let tracker = ProgressTracker::new(source)?;
        let report = self.transfer(&target, &tracker).await;
        println!();
        report
    }

    /// Moves the file behind `target`, reporting every finished part to `tracker`.
    ///
    /// If any part fails the multipart session is aborted, so nothing appears
    /// under the key.
    pub async fn transfer(
        &self,
        target: &TransferTarget,
        tracker: &ProgressTracker,
    ) -> Result<UploadReport, FerryError> {
        let size = tracker.total();
        log::info!(
            "Uploading {} -> s3://{}/{} ({} bytes)",
            target.source.display(),
            target.bucket,
            target.key,
            size
        );

        if !is_multipart(size, &self.config) {
            let body = tokio::fs::read(&target.source)
                .await
                .map_err(|e| FerryError::io(&target.source, e))?;
            let bytes = body.len() as u64;
            self.store
                .put_object(&target.bucket, &target.key, body)
                .await
                .map_err(|e| FerryError::from_store(&target.source, &target.bucket, &target.key, e))?;
            tracker.increment(bytes);
            log::info!("Uploaded {} in a single request", target.key);
            return Ok(UploadReport {
                key: target.key.clone(),
                bytes,
                parts: 1,
            });
        }

        let parts = plan_parts(size, &self.config);
        let total_parts = parts.len();
        let upload_id = self
            .store
            .create_multipart_upload(&target.bucket, &target.key)
            .await
            .map_err(|e| FerryError::from_store(&target.source, &target.bucket, &target.key, e))?;
        log::debug!("Multipart upload {} opened for {} parts", upload_id, total_parts);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<PartEvent>();

        let mut join_handles = Vec::with_capacity(total_parts);
        for part in parts {
            let tx = tx.clone();
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let target = target.clone();
            let upload_id = upload_id.clone();
            join_handles.push(task::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let event = send_part(&*store, &target, &upload_id, part).await;
                let _ = tx.send(event);
            }));
        }
        drop(tx);

        let mut completed: Vec<CompletedChunk> = Vec::with_capacity(total_parts);
        let mut failure: Option<FerryError> = None;
        while let Some(event) = rx.recv().await {
            match event {
                PartEvent::Completed { chunk, bytes } => {
                    log::debug!("Part {} done ({} bytes)", chunk.part_number, bytes);
                    tracker.increment(bytes);
                    completed.push(chunk);
                }
                PartEvent::Failed { part_number, error } => {
                    log::error!("Part {} of {} failed: {:?}", part_number, target.key, error);
                    failure = Some(part_failure(target, part_number, error));
                    break;
                }
            }
        }

        if failure.is_none() && completed.len() != total_parts {
            failure = Some(FerryError::Upload {
                path: target.source.clone(),
                bucket: target.bucket.clone(),
                key: target.key.clone(),
                source: format!(
                    "only {} of {} parts reported back",
                    completed.len(),
                    total_parts
                )
                .into(),
            });
        }

        if let Some(error) = failure {
            semaphore.close();
            for handle in join_handles {
                handle.abort();
            }
            self.abort(target, &upload_id).await;
            return Err(error);
        }

        completed.sort_by_key(|c| c.part_number);
        if let Err(e) = self
            .store
            .complete_multipart_upload(&target.bucket, &target.key, &upload_id, completed)
            .await
        {
            self.abort(target, &upload_id).await;
            return Err(FerryError::from_store(
                &target.source,
                &target.bucket,
                &target.key,
                e,
            ));
        }

        log::info!("Uploaded {} in {} parts", target.key, total_parts);
        Ok(UploadReport {
            key: target.key.clone(),
            bytes: size,
            parts: total_parts,
        })
    }

    async fn abort(&self, target: &TransferTarget, upload_id: &str) {
        if let Err(e) = self
            .store
            .abort_multipart_upload(&target.bucket, &target.key, upload_id)
            .await
        {
            log::warn!("Could not abort multipart upload {}: {}", upload_id, e);
        }
    }
}

async fn send_part(
    store: &dyn MultipartStore,
    target: &TransferTarget,
    upload_id: &str,
    part: UploadPart,
) -> PartEvent {
    let body = match read_range(&target.source, part.offset, part.len).await {
        Ok(body) => body,
        Err(e) => {
            return PartEvent::Failed {
                part_number: part.part_number,
                error: PartError::Read(e),
            }
        }
    };

    match store
        .upload_part(&target.bucket, &target.key, upload_id, part.part_number, body)
        .await
    {
        Ok(chunk) => PartEvent::Completed {
            chunk,
            bytes: part.len,
        },
        Err(e) => PartEvent::Failed {
            part_number: part.part_number,
            error: PartError::Store(e),
        },
    }
}

async fn read_range(path: &Path, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

fn part_failure(target: &TransferTarget, part_number: i32, error: PartError) -> FerryError {
    match error {
        PartError::Store(e) => FerryError::from_store(&target.source, &target.bucket, &target.key, e),
        PartError::Read(e) => FerryError::Upload {
            path: target.source.clone(),
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            source: format!("reading part {part_number}: {e}").into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ferry_store::memory::MemoryStore;

    use super::*;
    use crate::config::MIB;

    fn file_of(dir: &Path, name: &str, size: u64) -> PathBuf {
        let path = dir.join(name);
        let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
        std::fs::write(&path, data).unwrap();
        path
    }

    fn quiet_tracker(path: &Path) -> ProgressTracker {
        ProgressTracker::with_writer(path, Box::new(std::io::sink())).unwrap()
    }

    fn target(source: &Path, key: &str) -> TransferTarget {
        TransferTarget {
            bucket: "trips".to_string(),
            key: key.to_string(),
            source: source.to_path_buf(),
        }
    }

    #[test]
    fn test_object_key() {
        assert_eq!(
            object_key("trip-data", "green_tripdata_2019-03.parquet.gz"),
            "trip-data/green_tripdata_2019-03.parquet.gz"
        );
        assert_eq!(object_key("", "a.parquet.gz"), "a.parquet.gz");
        assert_eq!(object_key("/archive/", "/a.gz"), "archive/a.gz");
    }

    #[tokio::test]
    async fn test_twelve_mib_file_in_three_parts() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_of(dir.path(), "trip.parquet.gz", 12 * MIB);
        // First part finishes last.
        let store = Arc::new(
            MemoryStore::new(["trips"]).delaying_part(1, Duration::from_millis(50)),
        );
        let uploader = Uploader::new(store.clone(), TransferConfig::default());
        let tracker = quiet_tracker(&source);

        let report = uploader
            .transfer(&target(&source, "trip-data/trip.parquet.gz"), &tracker)
            .await
            .unwrap();

        assert_eq!(report.parts, 3);
        assert_eq!(tracker.seen(), 12 * MIB);
        assert_eq!(format!("{:.2}", tracker.percentage()), "100.00");

        let mut sizes = store.part_sizes();
        sizes.sort();
        assert_eq!(
            sizes,
            vec![
                (1, (5 * MIB) as usize),
                (2, (5 * MIB) as usize),
                (3, (2 * MIB) as usize)
            ]
        );
        assert_eq!(store.part_sizes().last().map(|(n, _)| *n), Some(1));
        assert_eq!(
            store.object("trips", "trip-data/trip.parquet.gz").unwrap(),
            std::fs::read(&source).unwrap()
        );
    }

    #[tokio::test]
    async fn test_small_file_uses_single_request() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_of(dir.path(), "small.parquet.gz", 4 * MIB);
        let store = Arc::new(MemoryStore::new(["trips"]));
        let uploader = Uploader::new(store.clone(), TransferConfig::default());
        let tracker = quiet_tracker(&source);

        let report = uploader
            .transfer(&target(&source, "small.parquet.gz"), &tracker)
            .await
            .unwrap();

        assert_eq!(report.parts, 1);
        assert_eq!(store.single_puts(), 1);
        assert!(store.part_sizes().is_empty());
        assert_eq!(tracker.seen(), 4 * MIB);
        assert_eq!(
            store.object("trips", "small.parquet.gz").unwrap().len() as u64,
            4 * MIB
        );
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_of(dir.path(), "empty", 0);
        let store = Arc::new(MemoryStore::new(["trips"]));
        let uploader = Uploader::new(store.clone(), TransferConfig::default());
        let tracker = quiet_tracker(&source);

        uploader
            .transfer(&target(&source, "empty"), &tracker)
            .await
            .unwrap();

        assert_eq!(store.object("trips", "empty").unwrap(), Vec::<u8>::new());
        assert_eq!(tracker.percentage(), 100f64);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_of(dir.path(), "many.bin", 12 * 1024);
        let mut store = MemoryStore::new(["trips"]);
        for part in 1..=12 {
            store = store.delaying_part(part, Duration::from_millis(20));
        }
        let store = Arc::new(store);
        let config = TransferConfig {
            threshold: 1024,
            chunk_size: 1024,
            max_concurrency: 3,
        };
        let uploader = Uploader::new(store.clone(), config);

        let report = uploader
            .transfer(&target(&source, "many.bin"), &quiet_tracker(&source))
            .await
            .unwrap();

        assert_eq!(report.parts, 12);
        assert!(store.max_parts_in_flight() <= 3);
        assert!(store.max_parts_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_failed_part_aborts_session() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_of(dir.path(), "trip.parquet.gz", 12 * MIB);
        let store = Arc::new(MemoryStore::new(["trips"]).failing_part(2));
        let uploader = Uploader::new(store.clone(), TransferConfig::default());

        let result = uploader
            .transfer(&target(&source, "trip.parquet.gz"), &quiet_tracker(&source))
            .await;

        assert!(matches!(result, Err(FerryError::Upload { .. })));
        assert_eq!(store.aborted_sessions(), 1);
        assert_eq!(store.open_sessions(), 0);
        assert!(store.object("trips", "trip.parquet.gz").is_none());
    }

    #[tokio::test]
    async fn test_failed_complete_aborts_session() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_of(dir.path(), "trip.parquet.gz", 12 * MIB);
        let store = Arc::new(MemoryStore::new(["trips"]).failing_complete());
        let uploader = Uploader::new(store.clone(), TransferConfig::default());

        let result = uploader
            .transfer(&target(&source, "trip.parquet.gz"), &quiet_tracker(&source))
            .await;

        assert!(matches!(result, Err(FerryError::Upload { .. })));
        assert_eq!(store.part_sizes().len(), 3);
        assert_eq!(store.aborted_sessions(), 1);
        assert_eq!(store.open_sessions(), 0);
        assert!(store.object("trips", "trip.parquet.gz").is_none());
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_auth_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(["trips"]).rejecting_credentials());
        let uploader = Uploader::new(store.clone(), TransferConfig::default());

        for size in [MIB, 6 * MIB] {
            let source = file_of(dir.path(), "f", size);
            let result = uploader
                .transfer(&target(&source, "f"), &quiet_tracker(&source))
                .await;
            assert!(
                matches!(result, Err(FerryError::Auth(_))),
                "{size} bytes: {result:?}"
            );
        }
        assert!(store.object("trips", "f").is_none());
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(["other"]));
        let uploader = Uploader::new(store, TransferConfig::default());

        for size in [MIB, 6 * MIB] {
            let source = file_of(dir.path(), "f", size);
            let result = uploader
                .transfer(&target(&source, "f"), &quiet_tracker(&source))
                .await;
            assert!(matches!(result, Err(FerryError::NotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_upload_applies_default_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let source = file_of(dir.path(), "green_tripdata_2019-03.parquet.gz", 1024);
        let store = Arc::new(MemoryStore::new(["trips"]));
        let uploader = Uploader::new(store.clone(), TransferConfig::default());

        let report = uploader
            .upload("trips", &source, "green_tripdata_2019-03.parquet.gz", None)
            .await
            .unwrap();

        assert_eq!(report.key, "trip-data/green_tripdata_2019-03.parquet.gz");
        assert!(store.object("trips", &report.key).is_some());
    }

    #[tokio::test]
    async fn test_upload_missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new(["trips"]));
        let uploader = Uploader::new(store, TransferConfig::default());

        let result = uploader
            .upload("trips", &dir.path().join("gone.gz"), "gone.gz", Some(""))
            .await;

        assert!(matches!(result, Err(FerryError::NotFound(_))));
    }
}
