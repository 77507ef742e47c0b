//! Tracing subscriber setup.
//!
//! The filter comes from `CCP_LOG`, then `RUST_LOG`, then defaults to `info`.
//! Logs go to stderr so stdout stays reserved for command output.

use clap::ValueEnum;
use std::io::IsTerminal;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Primary log filter variable.
pub const LOG_ENV_VAR: &str = "CCP_LOG";

const DEFAULT_FILTER: &str = "info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter directive from the environment, with its source variable.
fn filter_directive() -> (String, &'static str) {
    for var in [LOG_ENV_VAR, "RUST_LOG"] {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return (value, var);
            }
        }
    }
    (DEFAULT_FILTER.to_string(), "default")
}

/// Initialize logging. Safe to call more than once; only the first call
/// installs a subscriber.
pub fn init(format: LogFormat) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (directive, origin) = filter_directive();
        let filter = EnvFilter::try_new(&directive)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        let installed = match format {
            LogFormat::Text => builder
                .with_ansi(std::io::stderr().is_terminal())
                .try_init(),
            LogFormat::Json => builder.json().with_current_span(true).try_init(),
        };

        if installed.is_ok() {
            tracing::debug!(filter = %directive, origin, "logging initialized");
        }
    });
}
