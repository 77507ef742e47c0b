//! Error types for the Chicago crimes pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the pipeline.
///
/// Component crates keep their own precise error enums and convert into this
/// one at the flow boundary, where only the category and message matter.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    // Extraction errors (20-29)
    #[error("source unavailable at {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },

    #[error("malformed source data: {0}")]
    MalformedSource(String),

    // Cleaning errors (30-39)
    #[error("column '{column}' missing from {dataset} batch")]
    MissingColumn { dataset: String, column: String },

    #[error("cannot coerce '{value}' in column '{column}' (row {row}) to {expected}")]
    Coercion {
        column: String,
        row: usize,
        value: String,
        expected: String,
    },

    // Lake errors (40-49)
    #[error("object storage error: {0}")]
    Storage(String),

    #[error("parquet encoding failed: {0}")]
    Encoding(String),

    // Warehouse errors (50-59)
    #[error("warehouse statement failed: {message}\n{statement}")]
    Warehouse { statement: String, message: String },

    // Transform errors (60-69)
    #[error("transformation failed: {0}")]
    Transform(String),

    // Provisioning / deployment errors (70-79)
    #[error("provisioning failed: {0}")]
    Provision(String),

    #[error("deployment failed: {0}")]
    Deploy(String),

    // I/O errors (80-89)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::InvalidPartition(_) => 12,
            Error::SourceUnavailable { .. } => 20,
            Error::MalformedSource(_) => 21,
            Error::MissingColumn { .. } => 30,
            Error::Coercion { .. } => 31,
            Error::Storage(_) => 40,
            Error::Encoding(_) => 41,
            Error::Warehouse { .. } => 50,
            Error::Transform(_) => 60,
            Error::Provision(_) => 70,
            Error::Deploy(_) => 71,
            Error::Io(_) => 80,
            Error::Json(_) => 81,
        }
    }

    /// Short category name, stable across releases.
    pub fn category(&self) -> &'static str {
        match self.code() {
            10..=19 => "config",
            20..=29 => "extract",
            30..=39 => "clean",
            40..=49 => "lake",
            50..=59 => "warehouse",
            60..=69 => "transform",
            70..=79 => "deploy",
            _ => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_fall_in_category_ranges() {
        let err = Error::Coercion {
            column: "id".to_string(),
            row: 3,
            value: "abc".to_string(),
            expected: "integer".to_string(),
        };
        assert_eq!(err.code(), 31);
        assert_eq!(err.category(), "clean");

        let err = Error::Warehouse {
            statement: "SELECT 1".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.category(), "warehouse");
        assert!(err.to_string().contains("SELECT 1"));
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.code(), 80);
        assert_eq!(err.category(), "io");
    }
}
