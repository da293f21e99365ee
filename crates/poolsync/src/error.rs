//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use poolsync_config::ConfigError;
use poolsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const UNAVAILABLE: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Availability ─────────────────────────────────────────────────
    #[error("Pool '{pool}' is unavailable")]
    #[diagnostic(
        code(poolsync::unavailable),
        help("The pool went away before the snapshots could be read. Retry, or check the capture file.")
    )]
    Unavailable { pool: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{kind} '{name}' not found")]
    #[diagnostic(code(poolsync::not_found), help("Run: poolsync show {kind} to see what the pool holds"))]
    NotFound { kind: String, name: String },

    // ── Decoding ─────────────────────────────────────────────────────
    #[error("{failed} of {total} {kind} lines could not be decoded")]
    #[diagnostic(
        code(poolsync::decode),
        help("First failure: {first}\nRun with -o json to see every failure.")
    )]
    DecodeFailed {
        kind: String,
        failed: usize,
        total: usize,
        first: String,
    },

    // ── Pool commands ────────────────────────────────────────────────
    #[error("Pool error: {message}")]
    #[diagnostic(code(poolsync::pool))]
    Pool { message: String },

    #[error("Command {command} timed out after {millis} ms")]
    #[diagnostic(
        code(poolsync::timeout),
        help("Raise command_timeout in your profile or check the pool's responsiveness.")
    )]
    Timeout { command: String, millis: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(poolsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(poolsync::profile_not_found),
        help("Available profiles: {available}\nList them with: poolsync config profiles")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No pool configured")]
    #[diagnostic(
        code(poolsync::no_config),
        help("Pass --capture <FILE>, or add a profile to {path}")
    )]
    NoConfig { path: String },

    #[error("Profile '{profile}' names no capture file")]
    #[diagnostic(
        code(poolsync::no_capture),
        help("Set `capture` in the profile or pass --capture <FILE>.")
    )]
    NoCapture { profile: String },

    #[error("Could not read capture file {path}: {reason}")]
    #[diagnostic(code(poolsync::capture))]
    Capture { path: String, reason: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(poolsync::config))]
    Config { message: String },

    // ── Internal / IO / Serialization ────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(poolsync::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(poolsync::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not render YAML: {0}")]
    #[diagnostic(code(poolsync::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unavailable { .. } => exit_code::UNAVAILABLE,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::DecodeFailed { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. } | Self::NoConfig { .. } | Self::NoCapture { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Unavailable { pool } | CoreError::BootstrapInterrupted { pool } => {
                CliError::Unavailable { pool }
            }

            CoreError::NotFound { kind, name } => CliError::NotFound {
                kind: kind.to_string(),
                name,
            },

            CoreError::Decode(e) => CliError::Validation {
                field: "line".into(),
                reason: e.to_string(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Timeout { command, timeout_ms } => CliError::Timeout {
                command,
                millis: timeout_ms,
            },

            CoreError::Source(e) => CliError::Pool { message: e.to_string() },

            CoreError::EngineStopped => CliError::Internal("synchronization engine stopped".into()),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound { name, available },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_exit_codes() {
        let unavailable: CliError = CoreError::BootstrapInterrupted { pool: "p".into() }.into();
        assert_eq!(unavailable.exit_code(), exit_code::UNAVAILABLE);

        let timeout: CliError = CoreError::Timeout {
            command: "CreateMotor".into(),
            timeout_ms: 500,
        }
        .into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);
        assert_eq!(timeout.to_string(), "Command CreateMotor timed out after 500 ms");

        let invalid: CliError = CoreError::ValidationFailed { message: "bad".into() }.into();
        assert_eq!(invalid.exit_code(), exit_code::USAGE);
    }
}
