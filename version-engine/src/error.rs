//! Error types for the version engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for version engine operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Transport failed for {target}: {details}")]
    Transport { target: String, details: String },

    #[error("Index {index} out of range ({len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid version token: {reason}")]
    InvalidToken { reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Candidate source unavailable: {reason}")]
    CandidateSource { reason: String },

    #[error("Dispatch task failed: {details}")]
    TaskFailed { details: String },
}

impl EngineError {
    /// Create a transport error for the given target URL
    pub fn transport(target: &str, details: impl fmt::Display) -> Self {
        Self::Transport {
            target: target.to_string(),
            details: details.to_string(),
        }
    }

    /// Create an index error
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    /// Create an invalid token error
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable (the same operation may succeed later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Transport { .. } => true,
            EngineError::TaskFailed { .. } => true,
            EngineError::CandidateSource { .. } => true,

            EngineError::IndexOutOfRange { .. } => false,
            EngineError::InvalidToken { .. } => false,
            EngineError::InvalidRequest { .. } => false,
        }
    }

    /// Get error category for grouping and filtering
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Transport { .. } => ErrorCategory::Transport,
            EngineError::TaskFailed { .. } => ErrorCategory::Runtime,
            EngineError::IndexOutOfRange { .. } => ErrorCategory::Lookup,
            EngineError::InvalidToken { .. } => ErrorCategory::Configuration,
            EngineError::InvalidRequest { .. } => ErrorCategory::Configuration,
            EngineError::CandidateSource { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Transport,
    Configuration,
    Lookup,
    Runtime,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Transport => write!(f, "TRANSPORT"),
            ErrorCategory::Configuration => write!(f, "CONFIGURATION"),
            ErrorCategory::Lookup => write!(f, "LOOKUP"),
            ErrorCategory::Runtime => write!(f, "RUNTIME"),
        }
    }
}

/// Why a dispatch run was skipped.
///
/// These are not failures: they describe traffic that was not eligible for
/// version probing, and the run that produced them had no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// The request carries the marker header, so the engine generated it.
    SelfLoopDetected,
    /// Scope checking was requested and the URL is out of scope.
    OutOfScope,
    /// The candidate snapshot was empty.
    ConfigurationEmpty,
    /// No candidate appears as a path segment.
    NoVersionMatch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SelfLoopDetected => "self-loop",
            SkipReason::OutOfScope => "out-of-scope",
            SkipReason::ConfigurationEmpty => "no-candidates",
            SkipReason::NoVersionMatch => "no-version-match",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
