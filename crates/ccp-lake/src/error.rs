//! Lake and storage errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from an object storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("object store error: {0}")]
    Backend(#[source] object_store::Error),

    #[error("cannot start storage runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::Backend(other),
        }
    }
}

/// Errors raised while encoding or writing lake files.
#[derive(Debug, Error)]
pub enum LakeError {
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("partition {partition} does not apply to {dataset}")]
    PartitionMismatch { dataset: String, partition: String },

    #[error("batch has {actual} columns, schema expects {expected}")]
    ColumnCount { expected: usize, actual: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<StorageError> for ccp_common::Error {
    fn from(err: StorageError) -> Self {
        ccp_common::Error::Storage(err.to_string())
    }
}

impl From<LakeError> for ccp_common::Error {
    fn from(err: LakeError) -> Self {
        match err {
            LakeError::Storage(inner) => inner.into(),
            LakeError::PartitionMismatch { .. } => {
                ccp_common::Error::InvalidPartition(err.to_string())
            }
            other => ccp_common::Error::Encoding(other.to_string()),
        }
    }
}
