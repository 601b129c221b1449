use ferry_store::{errors::StoreError, models::CompletedChunk};

/// What a part task reports back to the upload aggregator.
#[derive(Debug)]
pub enum PartEvent {
    Completed { chunk: CompletedChunk, bytes: u64 },
    Failed { part_number: i32, error: PartError },
}

#[derive(Debug)]
pub enum PartError {
    Read(std::io::Error),
    Store(StoreError),
}
