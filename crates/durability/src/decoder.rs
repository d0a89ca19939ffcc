//! Record decoding.
//!
//! [`RecordDecoder`] reads the stream prologue once (`@@begin_db`, comments,
//! `@@db_spec`) and then one record line per call. Recovery rules:
//!
//! - a line with too few fields is dropped with a diagnostic
//! - a line holding an unparseable value or a malformed word is dropped with
//!   a diagnostic
//! - extra words after a full record are skipped with a diagnostic, and the
//!   record is kept
//!
//! Anything touching table structure is fatal: a nested `@@begin_db`, a
//! second `@@db_spec`, an `@@end_db` inside a record, a garbled trailer, a
//! digest mismatch, or input ending inside a record.
//!
//! While the keyed digest is active every byte the scanner consumes is fed to
//! it, up to the first byte of the `@@end_db` keyword.

use crate::config::DbConfig;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::field::decode_field;
use crate::integrity::DigestAccumulator;
use crate::scanner::{Token, TokenKind, TokenSource};
use crate::schema::{parse_schema, Schema, Slot};
use fimdb_core::{AttrMask, AttributeId, Error, Record, Result};
use tracing::{debug, info, warn};

/// Outcome of one [`RecordDecoder::decode_record`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete record
    Record(Record),
    /// The table is over; every later call returns this again
    EndOfTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Records,
    Ended,
    Failed,
}

/// Pull decoder over one database stream.
pub struct RecordDecoder<S> {
    source: S,
    schema: Schema,
    digest: DigestAccumulator,
    diagnostics: Diagnostics,
    force_checksum: bool,
    state: DecoderState,
    verified: Option<String>,
    records: u64,
}

impl<S: TokenSource> RecordDecoder<S> {
    /// Read the prologue and schema of `source`.
    ///
    /// Fails if there is no `@@db_spec`, if table markers are misplaced, or
    /// if checksums are mandatory and the stream has no `@@begin_db`.
    pub fn open(mut source: S, config: &DbConfig) -> Result<Self> {
        let mut diagnostics = Diagnostics::default();
        let mut begin_seen = false;
        loop {
            let token = source.next_token()?;
            match token.kind {
                TokenKind::Newline => {}
                TokenKind::BeginDb if !begin_seen => begin_seen = true,
                TokenKind::BeginDb => {
                    return Err(Error::corruption(token.line, "found a second @@begin_db"))
                }
                TokenKind::DbSpec => break,
                TokenKind::Eof => return Err(Error::MissingSchema),
                _ => {
                    return Err(Error::corruption(
                        token.line,
                        format!("expected @@db_spec, found '{}'", token.text),
                    ))
                }
            }
        }

        if config.force_checksum && !begin_seen {
            return Err(Error::MissingChecksum(
                "database does not start with @@begin_db".to_string(),
            ));
        }

        let schema = parse_schema(&mut source, &mut diagnostics)?;
        if schema.is_empty() {
            return Err(Error::malformed_schema(
                source.line(),
                "@@db_spec declares no fields",
            ));
        }

        let mut digest = DigestAccumulator::new(config.hmac);
        if let Some(key) = &config.key {
            digest.activate(key)?;
        }

        debug!(
            target: "fimdb::db",
            slots = schema.len(),
            keyed = digest.is_active(),
            begin_seen,
            "Opened database stream"
        );

        Ok(RecordDecoder {
            source,
            schema,
            digest,
            diagnostics,
            force_checksum: config.force_checksum,
            state: DecoderState::Records,
            verified: None,
            records: 0,
        })
    }

    /// Schema declared by the stream.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Diagnostics reported so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Take the retained diagnostics so a long read does not accumulate them.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain()
    }

    /// Current line of the underlying scanner.
    pub fn line(&self) -> u64 {
        self.source.line()
    }

    /// Records returned so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// The trailer digest, once it has been verified.
    pub fn verified_digest(&self) -> Option<&str> {
        self.verified.as_deref()
    }

    /// Whether the end of the table has been reached.
    pub fn is_finished(&self) -> bool {
        self.state == DecoderState::Ended
    }

    /// Attribute mask that applies to `record`.
    ///
    /// Streams without an `attr` field use the mask derived from the schema.
    pub fn attr_mask(&self, record: &Record) -> AttrMask {
        self.schema
            .derived_mask()
            .unwrap_or_else(|| record.attr_mask())
    }

    /// Give back the token source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Decode the next record.
    ///
    /// After a fatal error the decoder refuses further calls.
    pub fn decode_record(&mut self) -> Result<Decoded> {
        match self.state {
            DecoderState::Ended => return Ok(Decoded::EndOfTable),
            DecoderState::Failed => {
                return Err(Error::invalid_operation(
                    "decoder used after a fatal error",
                ))
            }
            DecoderState::Records => {}
        }
        let result = self.decode_next();
        match &result {
            Ok(Decoded::Record(_)) => self.records += 1,
            Ok(Decoded::EndOfTable) => self.state = DecoderState::Ended,
            Err(_) => self.state = DecoderState::Failed,
        }
        result
    }

    fn next(&mut self) -> Result<Token> {
        let token = self.source.next_token()?;
        match token.kind {
            TokenKind::EndDb | TokenKind::EndDbNoDigest => self.digest.update(token.leading())?,
            _ => self.digest.update(token.raw())?,
        }
        Ok(token)
    }

    fn decode_next(&mut self) -> Result<Decoded> {
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Newline => continue,
                TokenKind::Eof => return self.end_without_trailer(token.line),
                TokenKind::EndDb => return self.end_with_digest(token.line),
                TokenKind::EndDbNoDigest => return self.end_without_digest(token.line),
                TokenKind::BeginDb | TokenKind::DbSpec => return Err(structural_error(&token)),
                TokenKind::Malformed => {
                    self.diagnostics
                        .report(token.line, DiagnosticKind::MalformedToken(token.text));
                    self.skip_to_newline()?;
                }
                TokenKind::Identifier | TokenKind::String => {
                    if let Some(record) = self.read_line(token)? {
                        return Ok(Decoded::Record(record));
                    }
                }
            }
        }
    }

    /// Collect the rest of a record line whose first word is `first`.
    fn read_line(&mut self, first: Token) -> Result<Option<Record>> {
        let line = first.line;
        let expected = self.schema.len();
        let mut values = Vec::with_capacity(expected);
        self.collect(0, first.text, &mut values);

        for position in 1..expected {
            let token = self.next()?;
            match token.kind {
                TokenKind::Identifier | TokenKind::String => {
                    self.collect(position, token.text, &mut values)
                }
                TokenKind::Newline => {
                    self.diagnostics.report(
                        line,
                        DiagnosticKind::NotEnoughFields {
                            expected,
                            found: position,
                        },
                    );
                    return Ok(None);
                }
                TokenKind::Malformed => {
                    self.diagnostics
                        .report(token.line, DiagnosticKind::MalformedToken(token.text));
                    self.skip_to_newline()?;
                    return Ok(None);
                }
                TokenKind::Eof => return Err(Error::Truncated { line: token.line }),
                _ => return Err(structural_error(&token)),
            }
        }

        let token = self.next()?;
        match token.kind {
            TokenKind::Newline | TokenKind::Eof => {}
            TokenKind::Identifier | TokenKind::String | TokenKind::Malformed => {
                let skipped = 1 + self.skip_to_newline()?;
                self.diagnostics
                    .report(line, DiagnosticKind::ExpectedNewline { skipped });
            }
            _ => return Err(structural_error(&token)),
        }

        self.build(line, values)
    }

    fn collect(&self, position: usize, text: String, values: &mut Vec<(AttributeId, String)>) {
        if let Slot::Known(id) = self.schema.slots()[position] {
            values.push((id, text));
        }
    }

    fn build(&mut self, line: u64, values: Vec<(AttributeId, String)>) -> Result<Option<Record>> {
        let mut record = Record::new();
        for (id, text) in values {
            match decode_field(id, &text) {
                Ok(Some(value)) => record.insert(id, value)?,
                Ok(None) => {}
                Err(e) => {
                    self.diagnostics.report(
                        line,
                        DiagnosticKind::InvalidValue {
                            field: id,
                            detail: e.to_string(),
                        },
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some(record))
    }

    /// Skip words up to the next line terminator, returning how many.
    fn skip_to_newline(&mut self) -> Result<usize> {
        let mut skipped = 0;
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Newline | TokenKind::Eof => return Ok(skipped),
                TokenKind::Identifier | TokenKind::String | TokenKind::Malformed => {
                    debug!(target: "fimdb::db", line = token.line, value = %token.text, "Skipped value");
                    skipped += 1;
                }
                _ => return Err(structural_error(&token)),
            }
        }
    }

    /// The trailer line must end right after the marker or digest.
    fn expect_trailer_newline(&mut self) -> Result<()> {
        let token = self.source.next_token()?;
        if token.kind == TokenKind::Newline {
            Ok(())
        } else {
            Err(Error::corruption(
                token.line,
                "checksum line garbled: newline expected after @@end_db",
            ))
        }
    }

    fn end_with_digest(&mut self, line: u64) -> Result<Decoded> {
        let token = self.source.next_token()?;
        if token.kind != TokenKind::String {
            return Err(Error::corruption(
                token.line,
                "checksum line garbled: digest expected after @@end_db",
            ));
        }
        self.expect_trailer_newline()?;
        let digest = self.digest.verify(&token.text)?;
        info!(
            target: "fimdb::db",
            line,
            records = self.records,
            bytes = self.digest.bytes_fed(),
            "Database checksum verified"
        );
        self.verified = Some(digest);
        Ok(Decoded::EndOfTable)
    }

    fn end_without_digest(&mut self, line: u64) -> Result<Decoded> {
        self.expect_trailer_newline()?;
        if self.force_checksum {
            return Err(Error::MissingChecksum(format!(
                "@@end_db at line {} carries no digest",
                line
            )));
        }
        if self.digest.finalize()?.is_some() {
            warn!(target: "fimdb::db", line, "Database has no checksum, contents not verified");
        }
        debug!(target: "fimdb::db", line, records = self.records, "Reached @@end_db");
        Ok(Decoded::EndOfTable)
    }

    fn end_without_trailer(&mut self, line: u64) -> Result<Decoded> {
        if self.force_checksum {
            return Err(Error::MissingChecksum(
                "database ends without @@end_db".to_string(),
            ));
        }
        self.diagnostics.report(line, DiagnosticKind::MissingTrailer);
        Ok(Decoded::EndOfTable)
    }
}

fn structural_error(token: &Token) -> Error {
    match token.kind {
        TokenKind::DbSpec => Error::malformed_schema(token.line, "only one @@db_spec allowed"),
        TokenKind::BeginDb => Error::corruption(token.line, "found @@begin_db inside database"),
        TokenKind::EndDb | TokenKind::EndDbNoDigest => {
            Error::corruption(token.line, "found @@end_db inside a record")
        }
        _ => Error::corruption(
            token.line,
            format!("unexpected {:?} '{}'", token.kind, token.text),
        ),
    }
}
