//! fimdb - record codec for file-integrity-monitoring databases
//!
//! A database is a line-oriented text table of file metadata records
//! (names, ownership, timestamps, hash digests, ACL/xattr/SELinux/capability
//! payloads), optionally zstd-compressed and protected by an HMAC trailer.
//!
//! # Quick Start
//!
//! ```no_run
//! use fimdb::{AttributeId, DbConfig, DbReader, DbWriter, FieldValue, Record};
//!
//! # fn main() -> fimdb::Result<()> {
//! let config = DbConfig::new().with_key(b"database key".to_vec());
//!
//! let mut writer = DbWriter::create(Vec::new(), &config)?;
//! let record = Record::new()
//!     .with(AttributeId::Filename, FieldValue::Text("/etc/passwd".into()))?
//!     .with(AttributeId::Uid, FieldValue::Integer(0))?;
//! writer.write_record(&record)?;
//! let (bytes, _summary) = writer.finish_into_inner()?;
//!
//! for record in DbReader::open(&bytes[..], &config)? {
//!     println!("{:?}", record?.text(AttributeId::Filename));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `fimdb-core`: attribute catalog, record model, error type
//! - `fimdb-durability`: scanner, schema, decoder/encoder, integrity, transports

pub use fimdb_core::*;
pub use fimdb_durability::*;
