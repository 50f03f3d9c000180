//! Error types shared by every stage of the pipeline.

use compact_str::CompactString;
use std::path::PathBuf;

/// Errors surfaced to callers building or querying a [`crate::Table`].
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Neither a binary capture nor a text rendering could be found (or the
    /// capture could not be turned into a rendering).
    #[error("No usable trace in \"{}\": {source}", dir.display())]
    MissingTrace {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A line carrying the subsystem marker did not match its grammar.
    #[error(transparent)]
    MalformedLine(#[from] MalformedLineError),
    /// A parsed record does not have the shape its grammar declares.
    #[error("Record for {subsystem} does not match its grammar: {reason}")]
    InvalidRecord {
        subsystem: CompactString,
        reason: String,
    },
    /// A view asked for a column the table does not have.
    #[error("No such column: {0}")]
    NoSuchColumn(CompactString),
    /// No grammar is registered under this subsystem name.
    #[error("Unknown subsystem: {0}")]
    UnknownSubsystem(CompactString),
    /// Reading or writing a file in the trace directory failed.
    #[error("I/O error on \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TraceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn missing(dir: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::MissingTrace {
            dir: dir.into(),
            source,
        }
    }
}

/// A matched event line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed {subsystem} event on line {line}: {kind}")]
pub struct MalformedLineError {
    pub subsystem: CompactString,
    /// 1-based line number in the text rendering.
    pub line: usize,
    pub kind: MalformedKind,
}

/// What exactly was wrong with a malformed line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedKind {
    #[error("no timestamp found")]
    MissingTimestamp,
    #[error("missing field `{0}`")]
    MissingField(CompactString),
    #[error("field `{key}` has unparsable value `{value}`")]
    BadValue {
        key: CompactString,
        value: CompactString,
    },
}
