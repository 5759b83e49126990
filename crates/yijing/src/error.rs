//! Error types for line parsing, code construction and table loading.
//!
//! Resolution itself is infallible. Everything here is raised at a boundary:
//! reading wire tokens, building codes from untrusted strings, or loading
//! lookup tables from disk.

use std::path::PathBuf;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors the `yijing` crate can produce.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A line token was outside the closed four-token vocabulary.
    #[error(transparent)]
    ParseLine(#[from] ParseLineError),

    /// A reading was built from the wrong number of lines.
    #[error(transparent)]
    ReadingLength(#[from] ReadingLengthError),

    /// A trigram or hexagram code had the wrong length or alphabet.
    #[error(transparent)]
    Code(#[from] CodeError),

    /// A lookup table file could not be read or parsed.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Returned when a token is not one of `yang`, `yin`, `old-yang`, `old-yin`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized line token `{token}`")]
pub struct ParseLineError {
    pub token: String,
}

/// Returned when a reading is built from anything but six lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("a reading has exactly 6 lines, got {actual}")]
pub struct ReadingLengthError {
    pub actual: usize,
}

/// Returned when a code string is malformed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("code `{code}` must be {expected} characters long")]
    Length { code: String, expected: usize },

    #[error("code `{code}` may only contain `0` and `1`")]
    Alphabet { code: String },
}

/// Returned when a table file cannot be turned into a lookup table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse table {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid key in table {path}: {source}")]
    Key {
        path: PathBuf,
        #[source]
        source: CodeError,
    },
}
