use std::fmt::{Display, Formatter};

/// The result type used throughout the crate.
pub type CResult<T> = std::result::Result<T, Error>;

/// Crate-wide error type. Every variant renders as a plain human-readable
/// string; callers that need to act on a specific failure (currently only
/// `WriteConflict`) match on the variant, everything else is surfaced
/// verbatim to the session/CLI layer.
#[derive(Debug)]
pub enum Error {
    /// Malformed SQL text: lexer or parser failure.
    Parse(String),
    /// Missing table/column, default-value/type mismatches, duplicate
    /// column names, missing or multiple primary keys.
    Schema(String),
    /// Primary-key duplicate, non-null violation.
    Constraint(String),
    /// Incomparable types, unknown column, unsupported aggregate.
    Evaluation(String),
    /// A concurrent transaction committed a conflicting write.
    WriteConflict(String),
    /// A value failed to convert or compare.
    Value(String),
    /// Row/schema/index (de)serialization failure.
    Encoding(String),
    /// Any other internal invariant violation.
    Internal(String),
    /// Wrapped I/O failure from the storage layer.
    Io(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::Schema(msg) => write!(f, "schema error: {}", msg),
            Error::Constraint(msg) => write!(f, "constraint violation: {}", msg),
            Error::Evaluation(msg) => write!(f, "evaluation error: {}", msg),
            Error::WriteConflict(msg) => write!(f, "write conflict: {}", msg),
            Error::Value(msg) => write!(f, "value error: {}", msg),
            Error::Encoding(msg) => write!(f, "encoding error: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}
