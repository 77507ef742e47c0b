//! Exit codes for the `ccp` CLI.
//!
//! Exit codes communicate which stage failed without requiring output
//! parsing. They are stable.

use ccp_common::Error;

/// Exit codes for ccp operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Flow completed
    Clean = 0,

    /// Configuration error
    ConfigError = 10,

    /// Source extraction error
    ExtractError = 11,

    /// Cleaning/typing error
    CleanError = 12,

    /// Lake encoding or object storage error
    LakeError = 13,

    /// Warehouse statement error
    WarehouseError = 14,

    /// Transformation toolchain error
    TransformError = 15,

    /// Provisioning or deployment registration error
    DeployError = 16,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Exit code for a pipeline error, by category.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            "config" => ExitCode::ConfigError,
            "extract" => ExitCode::ExtractError,
            "clean" => ExitCode::CleanError,
            "lake" => ExitCode::LakeError,
            "warehouse" => ExitCode::WarehouseError,
            "transform" => ExitCode::TransformError,
            "deploy" => ExitCode::DeployError,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_i32() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_codes() {
        assert_eq!(
            ExitCode::for_error(&Error::InvalidConfig("x".into())),
            ExitCode::ConfigError
        );
        assert_eq!(
            ExitCode::for_error(&Error::SourceUnavailable {
                url: "u".into(),
                reason: "r".into()
            }),
            ExitCode::ExtractError
        );
        assert_eq!(
            ExitCode::for_error(&Error::MissingColumn {
                dataset: "crimes".into(),
                column: "id".into()
            }),
            ExitCode::CleanError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Storage("s".into())),
            ExitCode::LakeError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Warehouse {
                statement: "s".into(),
                message: "m".into()
            }),
            ExitCode::WarehouseError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Transform("t".into())),
            ExitCode::TransformError
        );
        assert_eq!(
            ExitCode::for_error(&Error::Provision("p".into())),
            ExitCode::DeployError
        );
        let io: Error = std::io::Error::other("disk").into();
        assert_eq!(ExitCode::for_error(&io), ExitCode::InternalError);
    }

    #[test]
    fn values_are_stable() {
        assert_eq!(ExitCode::Clean.as_i32(), 0);
        assert_eq!(ExitCode::DeployError.as_i32(), 16);
        assert_eq!(i32::from(ExitCode::InternalError), 99);
        assert!(ExitCode::Clean.is_success());
        assert!(!ExitCode::LakeError.is_success());
    }
}
