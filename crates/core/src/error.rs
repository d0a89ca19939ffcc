//! Error types for fimdb
//!
//! Only fatal conditions are errors. Advisory and recoverable conditions
//! (unknown schema fields, short record lines) are reported as diagnostics
//! by the reader and never abort a stream.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::attribute::AttrKind;
use std::io;
use thiserror::Error;

/// Result type alias for fimdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors: the stream that produced one is unusable
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural corruption (nested or misplaced table markers, garbled trailer)
    #[error("Corrupt database at line {line}: {detail}")]
    Corruption {
        /// Line the scanner was on
        line: u64,
        /// What was wrong
        detail: String,
    },

    /// The `@@db_spec` declaration is malformed or repeated
    #[error("Malformed schema declaration at line {line}: {detail}")]
    MalformedSchema {
        /// Line the scanner was on
        line: u64,
        /// What was wrong
        detail: String,
    },

    /// The stream has no `@@db_spec` declaration
    #[error("Database must have one @@db_spec declaration")]
    MissingSchema,

    /// A checksum is mandatory but the stream does not carry one
    #[error("Database does not have a checksum: {0}")]
    MissingChecksum(String),

    /// The trailer carries a digest but no key was configured to verify it
    #[error("Database trailer carries a digest but no database key is configured")]
    UnexpectedChecksum,

    /// The trailer digest does not match the computed digest
    #[error("Database checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Digest stored in the trailer
        expected: String,
        /// Digest computed over the stream
        actual: String,
    },

    /// The stream ended in the middle of a record
    #[error("Database truncated at line {line}")]
    Truncated {
        /// Line the scanner was on
        line: u64,
    },

    /// Compression stream failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// API misuse (e.g. feeding a finalized digest)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Create a corruption error
    pub fn corruption(line: u64, detail: impl Into<String>) -> Self {
        Error::Corruption {
            line,
            detail: detail.into(),
        }
    }

    /// Create a malformed schema error
    pub fn malformed_schema(line: u64, detail: impl Into<String>) -> Self {
        Error::MalformedSchema {
            line,
            detail: detail.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(detail: impl Into<String>) -> Self {
        Error::InvalidOperation(detail.into())
    }

    /// Create a compression error
    pub fn compression(detail: impl Into<String>) -> Self {
        Error::Compression(detail.into())
    }
}

/// A single field value could not be parsed.
///
/// Field errors are recoverable: the reader drops the record holding the
/// field and resumes at the next line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Invalid base64 payload
    #[error("invalid base64: {0}")]
    Base64(String),

    /// Invalid decimal or octal number
    #[error("invalid number '{0}'")]
    Number(String),

    /// Broken `%XX` escape sequence
    #[error("invalid escape sequence in '{0}'")]
    Escape(String),

    /// Decoded text is not UTF-8
    #[error("text is not valid UTF-8")]
    Utf8,

    /// Structured field (ACL, xattrs) does not have the expected shape
    #[error("malformed {kind:?} field: {detail}")]
    Shape {
        /// Kind being decoded
        kind: AttrKind,
        /// What was wrong
        detail: String,
    },
}

impl FieldError {
    /// Create a shape error
    pub fn shape(kind: AttrKind, detail: impl Into<String>) -> Self {
        FieldError::Shape {
            kind,
            detail: detail.into(),
        }
    }
}
