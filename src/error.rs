use std::fmt::Display;

use thiserror::Error;

// ---------------------------------------------------------------------------
// StatementError
// ---------------------------------------------------------------------------

/// Failures of the engine while compiling or running a statement.
///
/// All of these are treated as unrecoverable by the caller: a compile error
/// is a defect in the query text, and a step or reset error leaves the
/// statement unusable.
#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Failed to compile `{sql}`: {source}")]
    Compile {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("`{sql}` declares {expected} parameter(s) but {actual} were supplied")]
    ParameterCount {
        sql: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to step `{sql}`: {source}")]
    Step {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to reset `{sql}`: {source}")]
    Reset {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl StatementError {
    fn engine(&self) -> Option<&rusqlite::Error> {
        match self {
            StatementError::Compile { source, .. }
            | StatementError::Step { source, .. }
            | StatementError::Reset { source, .. } => Some(source),
            StatementError::ParameterCount { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Failures of the value codec or of the record walk over a row.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A record field names a column the compiled statement does not have.
    #[error("'{key}' is not a column of `{query}`")]
    SchemaMismatch { key: String, query: String },

    /// A stored value cannot be coerced into the requested type.
    #[error("Decode failed: {0}")]
    DecodeShape(String),

    #[error("Encode failed: {0}")]
    Encode(String),
}

// ---------------------------------------------------------------------------
// Error (top-level rollup)
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Engine failures outside statement execution (open, close, pragmas).
    #[error(transparent)]
    Engine(#[from] rusqlite::Error),
}

/// Convenience alias; the default error type is [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Error::Codec(CodecError::DecodeShape(message.into()))
    }

    pub(crate) fn encode(message: impl Into<String>) -> Self {
        Error::Codec(CodecError::Encode(message.into()))
    }

    /// The engine's native result code, when the failure came from SQLite.
    pub fn sqlite_code(&self) -> Option<rusqlite::ErrorCode> {
        let engine = match self {
            Error::Statement(e) => e.engine()?,
            Error::Engine(e) => e,
            Error::Codec(_) => return None,
        };
        match engine {
            // Compile errors from a bundled engine carry the offset of the
            // offending token and keep their code here.
            rusqlite::Error::SqlInputError { error, .. } => Some(error.code),
            other => other.sqlite_error_code(),
        }
    }

    /// Whether this failure means the row no longer fits the requested shape.
    ///
    /// Live subscriptions end gracefully on these instead of reporting them.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Error::Codec(CodecError::DecodeShape(_) | CodecError::SchemaMismatch { .. })
        )
    }

    /// Lock contention that outlasted the configured busy timeout.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.sqlite_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }

    /// Attach the query text to a schema mismatch raised without it.
    pub(crate) fn with_query(self, sql: &str) -> Self {
        match self {
            Error::Codec(CodecError::SchemaMismatch { key, query }) if query.is_empty() => {
                Error::Codec(CodecError::SchemaMismatch {
                    key,
                    query: sql.to_string(),
                })
            }
            other => other,
        }
    }

    /// Prefix a decode failure with the column it was read from.
    pub(crate) fn in_column(self, column: &str) -> Self {
        match self {
            Error::Codec(CodecError::DecodeShape(message)) => {
                Error::decode(format!("column '{column}': {message}"))
            }
            other => other,
        }
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::decode(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        Error::Codec(CodecError::SchemaMismatch {
            key: field.to_string(),
            query: String::new(),
        })
    }
}

impl serde::ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::encode(msg.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
