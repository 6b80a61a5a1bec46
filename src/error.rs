use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the store.
pub type ChainDbResult<T> = Result<T, ChainDbError>;

/// Error type for all store operations.
///
/// Absent keys are not errors: `fetch` reports them as `None` and
/// `remove` treats them as a no-op.
#[derive(Error, Debug)]
pub enum ChainDbError {
    /// IO failure on one of the artifacts.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A header structure failed to serialize.
    #[error(transparent)]
    EncodeError(#[from] bincode::error::EncodeError),
    /// A header structure failed to deserialize.
    #[error(transparent)]
    DecodeError(#[from] bincode::error::DecodeError),
    /// Payload compression or decompression failed.
    #[error(transparent)]
    SnapError(#[from] snap::Error),
    /// `create` found store artifacts already on disk.
    #[error("Store already exists: {0}")]
    StoreExists(PathBuf),
    /// `open` found no store artifacts on disk.
    #[error("Store not found: {0}")]
    StoreNotFound(PathBuf),
    /// An artifact holds bytes that do not form a well-formed record.
    #[error("Corrupted artifact: {0}")]
    Corruption(String),
}
