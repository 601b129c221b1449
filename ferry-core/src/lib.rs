//! Moves monthly trip record files from a public web host into an object
//! store bucket, re-encoding them with gzip parquet compression on the way.

pub mod config;
pub mod errors;
pub mod event;
pub mod fetch;
pub mod parts;
pub mod period;
pub mod pipeline;
pub mod recompress;
pub mod scratch;
pub mod tracker;
pub mod upload;
