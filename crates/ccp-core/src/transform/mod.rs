//! Transformation runs through dbt.
//!
//! [`DbtCli`] shells out to a local `dbt` through a [`CommandRunner`];
//! [`DbtCloud`] triggers a hosted job and polls it to completion.

mod cli;
mod cloud;

pub use cli::{DbtCli, DbtProfile, DEFAULT_STAGES};
pub use cloud::{DbtCloud, DbtCloudApi, HttpDbtCloudApi, RunStatus};

use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Errors raised by transformation runs.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to write dbt profile {path}: {reason}")]
    Profile { path: PathBuf, reason: String },

    #[error("dbt Cloud request to {url} failed: {reason}")]
    Cloud { url: String, reason: String },

    #[error("dbt Cloud run {run_id} ended with status {status}")]
    RunFailed { run_id: u64, status: RunStatus },

    #[error("dbt Cloud run {run_id} still running after {waited_secs}s")]
    Timeout { run_id: u64, waited_secs: u64 },

    #[error("missing setting: {0}")]
    MissingSetting(String),
}

impl From<TransformError> for ccp_common::Error {
    fn from(err: TransformError) -> Self {
        ccp_common::Error::Transform(err.to_string())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs in the current working directory.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, TransformError>;
}

/// Runs programs with `std::process::Command`.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, TransformError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| TransformError::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })?;
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Records invocations and answers with a fixed status.
///
/// A command whose rendered form contains `fail_on` exits with status 1.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(pattern: impl Into<String>) -> Self {
        Self {
            calls: Mutex::default(),
            fail_on: Some(pattern.into()),
        }
    }

    /// Rendered command lines, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, TransformError> {
        let line = render_command(program, args);
        debug!(command = %line, "recorded command");
        let failed = self
            .fail_on
            .as_deref()
            .is_some_and(|pattern| line.contains(pattern));
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
        Ok(CommandOutput {
            status: i32::from(failed),
            stdout: String::new(),
            stderr: if failed { "forced failure".into() } else { String::new() },
        })
    }
}

/// `program arg1 arg2 ...`
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One dbt stage: the model selected by `dbt build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub model: String,
    pub commands: Vec<String>,
    pub elapsed_ms: u64,
}

/// Outcome of a transformation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransformReport {
    Cli {
        profile: PathBuf,
        stages: Vec<StageOutcome>,
    },
    Cloud {
        job_id: String,
        run_id: u64,
        status: RunStatus,
        polls: u32,
    },
}

/// Runs the transformation toolchain.
pub trait Transformer {
    fn run(&self) -> Result<TransformReport, TransformError>;
}
