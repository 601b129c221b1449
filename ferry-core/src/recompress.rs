use std::{
    fs::File,
    path::{Path, PathBuf},
};

use arrow::{error::ArrowError, record_batch::RecordBatch};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{Compression, GzipLevel},
    errors::ParquetError,
    file::properties::WriterProperties,
};

use crate::errors::FerryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecompressStats {
    pub rows: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Rewrites the parquet file at `source` to `destination` with gzip
/// column compression, on a blocking thread.
pub async fn recompress_gzip(
    source: PathBuf,
    destination: PathBuf,
) -> Result<RecompressStats, FerryError> {
    let codec = Compression::GZIP(GzipLevel::default());
    let task_source = source.clone();
    tokio::task::spawn_blocking(move || recompress(&task_source, &destination, codec))
        .await
        .map_err(|e| FerryError::io(source, std::io::Error::other(e)))?
}

/// Reads the whole file into memory and writes it back out with `codec`.
/// Schema, including its metadata, and every row are kept as read.
pub fn recompress(
    source: &Path,
    destination: &Path,
    codec: Compression,
) -> Result<RecompressStats, FerryError> {
    log::info!(
        "Recompressing {} -> {} ({:?})",
        source.display(),
        destination.display(),
        codec
    );

    let file = File::open(source).map_err(|e| FerryError::io(source, e))?;
    let bytes_in = file
        .metadata()
        .map_err(|e| FerryError::io(source, e))?
        .len();

    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| format(source, e))?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| format(source, e))?;
    let batches = reader
        .collect::<Result<Vec<RecordBatch>, ArrowError>>()
        .map_err(|e| format(source, e))?;
    let rows = batches.iter().map(RecordBatch::num_rows).sum();

    let out = File::create(destination).map_err(|e| FerryError::io(destination, e))?;
    let props = WriterProperties::builder().set_compression(codec).build();
    let mut writer =
        ArrowWriter::try_new(out, schema, Some(props)).map_err(|e| write_error(destination, e))?;
    for batch in &batches {
        writer
            .write(batch)
            .map_err(|e| write_error(destination, e))?;
    }
    writer.close().map_err(|e| write_error(destination, e))?;

    let bytes_out = std::fs::metadata(destination)
        .map_err(|e| FerryError::io(destination, e))?
        .len();

    log::info!(
        "Recompressed {} rows ({} -> {} bytes)",
        rows,
        bytes_in,
        bytes_out
    );

    Ok(RecompressStats {
        rows,
        bytes_in,
        bytes_out,
    })
}

fn format(path: &Path, e: impl std::error::Error + Send + Sync + 'static) -> FerryError {
    FerryError::Format {
        path: path.to_path_buf(),
        source: Box::new(e),
    }
}

fn write_error(path: &Path, e: ParquetError) -> FerryError {
    FerryError::io(path, std::io::Error::other(e))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray},
        compute::concat_batches,
        datatypes::{DataType, Field, Schema, TimeUnit},
    };

    use super::*;

    pub(crate) fn trip_batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("VendorID", DataType::Int64, true),
            Field::new(
                "lpep_pickup_datetime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
            Field::new("trip_distance", DataType::Float64, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![Some(2), None, Some(1), Some(2)])),
            Arc::new(TimestampMicrosecondArray::from(vec![
                Some(1_551_398_400_000_000),
                Some(1_551_398_460_000_000),
                None,
                Some(1_551_398_520_000_000),
            ])),
            Arc::new(StringArray::from(vec![Some("N"), Some("Y"), None, Some("N")])),
            Arc::new(Float64Array::from(vec![0.5, 12.25, 3.0, 0.0])),
        ];
        RecordBatch::try_new(Arc::new(schema), columns).unwrap()
    }

    /// Writes `batch` as an uncompressed parquet file.
    pub(crate) fn write_parquet(path: &Path, batch: &RecordBatch) {
        let props = WriterProperties::builder()
            .set_compression(Compression::UNCOMPRESSED)
            .build();
        let mut writer =
            ArrowWriter::try_new(File::create(path).unwrap(), batch.schema(), Some(props)).unwrap();
        writer.write(batch).unwrap();
        writer.close().unwrap();
    }

    fn read_parquet(path: &Path) -> (RecordBatch, Compression) {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap()).unwrap();
        let codec = builder.metadata().row_group(0).column(0).compression();
        let schema = builder.schema().clone();
        let batches: Vec<RecordBatch> = builder.build().unwrap().map(Result::unwrap).collect();
        (concat_batches(&schema, &batches).unwrap(), codec)
    }

    #[test]
    fn test_recompress_keeps_rows_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("green_tripdata_2019-03.parquet");
        let destination = dir.path().join("green_tripdata_2019-03.parquet.gz");
        write_parquet(&source, &trip_batch());

        let stats =
            recompress(&source, &destination, Compression::GZIP(GzipLevel::default())).unwrap();

        let (original, original_codec) = read_parquet(&source);
        let (rewritten, codec) = read_parquet(&destination);
        assert_eq!(stats.rows, 4);
        assert_eq!(original_codec, Compression::UNCOMPRESSED);
        assert!(matches!(codec, Compression::GZIP(_)));
        assert_eq!(rewritten.schema(), original.schema());
        assert_eq!(rewritten, original);
    }

    #[test]
    fn test_recompress_rejects_non_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("not.parquet");
        std::fs::write(&source, b"<html>Access Denied</html>").unwrap();

        let result = recompress(
            &source,
            &dir.path().join("out.parquet.gz"),
            Compression::GZIP(GzipLevel::default()),
        );

        assert!(matches!(result, Err(FerryError::Format { .. })));
    }

    #[test]
    fn test_recompress_unwritable_destination_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.parquet");
        write_parquet(&source, &trip_batch());

        let result = recompress(
            &source,
            &dir.path().join("no-such-dir").join("out.parquet.gz"),
            Compression::GZIP(GzipLevel::default()),
        );

        assert!(matches!(result, Err(FerryError::Io { .. })));
    }

    #[tokio::test]
    async fn test_recompress_gzip_on_blocking_thread() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.parquet");
        let destination = dir.path().join("out.parquet.gz");
        write_parquet(&source, &trip_batch());

        let stats = recompress_gzip(source, destination.clone()).await.unwrap();

        assert_eq!(stats.rows, 4);
        assert_eq!(stats.bytes_out, std::fs::metadata(&destination).unwrap().len());
    }
}
