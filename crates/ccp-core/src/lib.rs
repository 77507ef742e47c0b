//! Chicago crimes pipeline flows.
//!
//! Each stage sits behind an injected capability so flows can run against
//! the real services or in-memory fakes:
//! - [`extract::DataSource`] for the open-data CSV endpoints
//! - [`ccp_lake::LakeStore`] for lake files and deployment manifests
//! - [`load::Warehouse`] for DDL statements
//! - [`transform::Transformer`] (and [`transform::CommandRunner`]) for dbt
//!
//! [`pipeline::Pipeline`] composes them into the extract, load, transform
//! and full-run flows.

pub mod clean;
pub mod deploy;
pub mod exit_codes;
pub mod extract;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod provision;
pub mod transform;

pub use clean::{clean, CleanError};
pub use exit_codes::ExitCode;
pub use pipeline::{PartitionOutcome, Pipeline, RunReport};
