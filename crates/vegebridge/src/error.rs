//! CLI error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use vegebridge_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid configuration value for '{field}': {reason}")]
    #[diagnostic(
        code(vegebridge::validation),
        help("Fix the value in the config file, the VEGEBRIDGE_ environment, or on the command line.")
    )]
    Validation { field: String, reason: String },

    #[error("Config file not found at {path}")]
    #[diagnostic(
        code(vegebridge::no_config),
        help("Check the --config path, or run `vegebridge config path` for the default location.")
    )]
    NoConfig { path: String },

    #[error("{0}")]
    #[diagnostic(code(vegebridge::config))]
    Config(String),

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Cannot listen for hubs")]
    #[diagnostic(
        code(vegebridge::listen),
        help("Another process may hold the port, or ports below 1024 need privileges.")
    )]
    Listen {
        #[source]
        source: vegebridge_api::Error,
    },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::NoConfig { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Listen { .. } => exit_code::CONNECTION,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Missing { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<vegebridge_api::Error> for CliError {
    fn from(source: vegebridge_api::Error) -> Self {
        Self::Listen { source }
    }
}
