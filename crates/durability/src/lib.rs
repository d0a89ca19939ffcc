//! On-disk database codec for fimdb
//!
//! This crate handles everything that touches the database file:
//!
//! - Scanner: tokens with line numbers and the raw bytes behind them
//! - Schema negotiation for the `@@db_spec` line
//! - Record decoding with line-level error recovery
//! - Record encoding in catalog order
//! - Keyed HMAC over the record region, verified against the `@@end_db` trailer
//! - Plain or zstd-compressed transports
//! - Reader and writer sessions tying it all together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config; // DbConfig, ConfigError
pub mod decoder; // Record decoding and error recovery
pub mod diagnostic; // Advisory and recoverable conditions
pub mod encoder; // Record line formatting
pub mod field; // Per-kind field text codec
pub mod integrity; // HMAC accumulator and change digest
pub mod reader; // DbReader session
pub mod scanner; // Lexical scanner and TokenSource seam
pub mod schema; // @@db_spec negotiation
pub mod sink; // Plain/zstd transports
pub mod writer; // DbWriter session

// === Re-exports ===
pub use config::{default_output_mask, ConfigError, DbConfig};
pub use decoder::{Decoded, RecordDecoder};
pub use diagnostic::{
    Diagnostic, DiagnosticKind, Diagnostics, Severity, DEFAULT_DIAGNOSTIC_LIMIT,
};
pub use encoder::{encode_record, format_record};
pub use integrity::{ChangeDigest, DigestAccumulator, DigestState, HmacAlgorithm};
pub use reader::{open_file, DbReader};
pub use scanner::{Scanner, Token, TokenKind, TokenSource, BEGIN_DB, DB_SPEC, END_DB};
pub use schema::{parse_schema, Schema, Slot};
pub use sink::{Compression, SinkAdapter, SourceAdapter, DEFAULT_ZSTD_LEVEL, ZSTD_MAGIC};
pub use writer::{create_file, write_database, DbWriter, WriteSummary};
