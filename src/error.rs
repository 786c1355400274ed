//! Error taxonomy for the import tracker.

use std::fmt;
use thiserror::Error;

/// Message used when the server rejects a request without saying why.
pub const GENERIC_FAILURE: &str = "the import service did not return an error message";

/// The Import API call an error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    CreateImport,
    ListJobs,
    GetJob,
    CancelJob,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateImport => "create import",
            Self::ListJobs => "list jobs",
            Self::GetJob => "get job",
            Self::CancelJob => "cancel job",
        })
    }
}

/// Reportable, never fatal: the tracker stays usable after any of these.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    // ── Client-side ───────────────────────────────────────────────────────────
    #[error("{file_name} is not a supported import file (expected {expected})")]
    Validation { file_name: String, expected: String },

    #[error("could not read {path}: {message}")]
    FileRead { path: String, message: String },

    // ── Import API ────────────────────────────────────────────────────────────
    #[error("{operation} failed: {message}")]
    Api { operation: Operation, message: String },

    #[error("{operation} failed: connection error: {message}")]
    Transport { operation: Operation, message: String },

    #[error("{operation} failed: unexpected response: {message}")]
    Decode { operation: Operation, message: String },

    // ── Lifecycle ─────────────────────────────────────────────────────────────
    #[error("import tracker has shut down")]
    Closed,
}

impl TrackerError {
    /// Server-side rejection, falling back to the generic message when the
    /// server sent none.
    pub fn api(operation: Operation, message: Option<String>) -> Self {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        Self::Api { operation, message }
    }

    /// Maps a reqwest failure onto transport or decode errors.
    pub fn from_reqwest(operation: Operation, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                operation,
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                operation,
                message: err.to_string(),
            }
        }
    }

    /// True for errors raised before any network call.
    pub fn is_client_side(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::FileRead { .. })
    }

    /// The operation that failed, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Api { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Decode { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_uses_server_message() {
        let err = TrackerError::api(Operation::CancelJob, Some("job already finished".into()));
        assert_eq!(err.to_string(), "cancel job failed: job already finished");
        assert_eq!(err.operation(), Some(Operation::CancelJob));
    }

    #[test]
    fn test_api_error_falls_back_to_generic_message() {
        let blank = TrackerError::api(Operation::CreateImport, Some("   ".into()));
        let missing = TrackerError::api(Operation::CreateImport, None);
        assert_eq!(blank, missing);
        assert!(missing.to_string().ends_with(GENERIC_FAILURE));
    }

    #[test]
    fn test_validation_error_names_file() {
        let err = TrackerError::Validation {
            file_name: "notes.txt".into(),
            expected: ".csv".into(),
        };
        assert!(err.is_client_side());
        assert!(err.to_string().contains("notes.txt"));
        assert_eq!(err.operation(), None);
    }
}
