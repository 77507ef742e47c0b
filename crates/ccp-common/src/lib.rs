//! Chicago crimes pipeline common types, IDs, schemas, and errors.
//!
//! This crate provides foundational types shared across the pipeline crates:
//! - Table schemas and semantic column types for the source datasets
//! - Raw and typed batches
//! - Partition keys for lake files
//! - Run identifiers
//! - Common error types with stable codes
//! - Output format specifications
//! - Atomic file replacement

pub mod batch;
pub mod error;
pub mod fs;
pub mod id;
pub mod output;
pub mod partition;
pub mod schema;

pub use batch::{CleanBatch, ColumnData, RawBatch};
pub use error::{Error, Result};
pub use id::RunId;
pub use output::OutputFormat;
pub use partition::{days_in_month, Partition};
pub use schema::{ColumnDef, ColumnType, Dataset, TableSchema};
