// ── Core error types ──
//
// User-facing errors from poolsync-core. Transport failures arrive as
// `SourceError` and are wrapped; line-level decode failures are usually
// recovered locally and only surface through `decode_line`.

use thiserror::Error;

use crate::model::EntityKind;
use crate::source::SourceError;

/// A single snapshot line did not match its kind's grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed {kind} line: {reason}")]
    Malformed { kind: EntityKind, reason: String },
}

impl DecodeError {
    pub(crate) fn malformed(kind: EntityKind, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Availability errors ──────────────────────────────────────────
    #[error("Pool '{pool}' is unavailable")]
    Unavailable { pool: String },

    #[error("Pool '{pool}' became unavailable during bootstrap")]
    BootstrapInterrupted { pool: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("{kind} entry not found: {name}")]
    NotFound { kind: EntityKind, name: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Command {command} timed out after {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u64 },

    // ── Source errors (wrapped, not exposed raw) ─────────────────────
    #[error("Remote source error: {0}")]
    Source(#[from] SourceError),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Synchronization engine has stopped")]
    EngineStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}
