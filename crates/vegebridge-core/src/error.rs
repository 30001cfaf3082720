// ── Core error types ──
//
// Errors surfaced by the bridge core. Only `MalformedRequest` ever reaches
// a hub as a client error; everything else is recovered where it happens
// and logged by the caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::patch::PatchError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Request errors ───────────────────────────────────────────────
    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: String },

    // ── Settings errors ──────────────────────────────────────────────
    #[error("Settings path not found: {path}")]
    PathNotFound { path: String },

    #[error("Unknown device: {mac}")]
    UnknownDevice { mac: String },

    // ── Store errors ─────────────────────────────────────────────────
    #[error("Cannot load settings store {}: {reason}", path.display())]
    StoreLoad { path: PathBuf, reason: String },

    #[error("Cannot write settings store {}: {reason}", path.display())]
    StoreWrite { path: PathBuf, reason: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<PatchError> for CoreError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::UnknownDevice { mac } => CoreError::UnknownDevice { mac },
            other => CoreError::PathNotFound {
                path: other.path().join("/"),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::MalformedRequest {
            reason: err.to_string(),
        }
    }
}
