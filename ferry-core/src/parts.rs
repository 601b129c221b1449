use crate::config::TransferConfig;

/// A contiguous byte range of the source file, sent as one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPart {
    /// 1-based.
    pub part_number: i32,
    pub offset: u64,
    pub len: u64,
}

/// Splits a file of `file_size` bytes into upload parts.
///
/// Below the threshold the whole file is a single part. Otherwise every part
/// is `chunk_size` long except the last, which takes the remainder.
pub fn plan_parts(file_size: u64, config: &TransferConfig) -> Vec<UploadPart> {
    if file_size < config.threshold || config.chunk_size == 0 {
        return vec![UploadPart {
            part_number: 1,
            offset: 0,
            len: file_size,
        }];
    }

    let mut parts = Vec::new();
    let mut offset = 0;
    let mut part_number = 1;
    while offset < file_size {
        let len = config.chunk_size.min(file_size - offset);
        parts.push(UploadPart {
            part_number,
            offset,
            len,
        });
        offset += len;
        part_number += 1;
    }
    parts
}

/// Whether a file of this size goes through a multipart session.
pub fn is_multipart(file_size: u64, config: &TransferConfig) -> bool {
    file_size >= config.threshold
}
