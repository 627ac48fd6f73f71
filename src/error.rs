use std::io;

use thiserror::Error;

/// Fatal failures only. Recoverable anomalies (conflicts, refused
/// reorders, overwrites) are curation-log events, not errors.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("usage: {0}")]
    Usage(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("endpoint failure: {0}")]
    Endpoint(String),
    #[error("malformed dump: {0}")]
    Dump(String),
}
