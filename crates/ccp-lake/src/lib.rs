//! Chicago crimes pipeline data lake.
//!
//! This crate provides:
//! - Arrow schema definitions for the source datasets
//! - In-memory Parquet encoding with configurable compression
//! - Deterministic object paths per dataset and partition
//! - Object storage over `object_store` (local directory, GCS, in-memory)
//! - OAuth token sources for Google Cloud APIs

pub mod auth;
pub mod encode;
pub mod error;
pub mod layout;
mod runtime;
pub mod schema;
pub mod storage;
pub mod writer;

pub use auth::{default_token_source, GcpTokens, StaticToken, TokenSource, ACCESS_TOKEN_ENV};
pub use encode::{to_record_batch, ParquetEncoder};
pub use error::{LakeError, StorageError};
pub use layout::{DatasetLocation, LakeLayout};
pub use schema::{arrow_schema, arrow_type};
pub use storage::LakeStore;
pub use writer::{LakeWriter, WrittenObject};

/// Content type used for uploaded Parquet objects.
pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";
