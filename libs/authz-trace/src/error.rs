//! Error types for trace emission and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`crate::TraceEmitter`].
///
/// Emission is observational: callers on the decision path log and drop
/// these errors rather than propagating them.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace destination cannot be empty")]
    EmptyDestination,

    #[error("failed to open trace file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("trace writer is closed")]
    Closed,

    #[error("failed to serialize trace event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write trace event: {0}")]
    Io(#[from] io::Error),
}

/// A single event violates the trace schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("missing schema_version")]
    MissingSchemaVersion,

    #[error("unsupported schema_version: {0}")]
    UnsupportedSchemaVersion(String),

    #[error("missing event_type")]
    MissingEventType,

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("unknown event_type: {0}")]
    UnknownEventType(String),

    /// A required field of the event type is absent or blank. Holds the
    /// dotted field path, e.g. `actor.principal`.
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid decision.outcome: {0}")]
    InvalidOutcome(String),
}

/// Why one line of a trace stream was rejected.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] EventError),
}

/// Failure of [`crate::TraceValidator::validate_file`].
///
/// IO failures are reported separately from schema violations.
#[derive(Debug, Error)]
pub enum FileValidationError {
    #[error("failed to open trace file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or decompressing the stream failed after `line` lines.
    #[error("failed to read trace stream after line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },

    /// Line numbers are 1-based.
    #[error("trace validation error at line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: LineError,
    },
}

impl FileValidationError {
    /// Line of the failing event, for schema violations.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Line { line, .. } => Some(*line),
            Self::Open { .. } | Self::Read { .. } => None,
        }
    }
}
