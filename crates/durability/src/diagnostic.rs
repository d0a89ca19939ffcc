//! Non-fatal diagnostics.
//!
//! Advisory and recoverable conditions are logged through `tracing` and kept
//! on the reader so callers can inspect what was skipped.

use fimdb_core::AttributeId;
use std::fmt;
use tracing::warn;

/// How much a diagnostic affected the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Nothing was lost
    Advisory,
    /// A record or line was discarded
    Recoverable,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A field name appears twice in `@@db_spec`; the later slot is ignored
    DuplicateField(String),
    /// A field name is not in the catalog; its slot is ignored
    UnknownField(String),
    /// `@@db_spec` has no `attr` field; the attribute mask is derived
    MissingAttrField,
    /// A record line ended early and was discarded
    NotEnoughFields {
        /// Slots in the schema
        expected: usize,
        /// Tokens on the line
        found: usize,
    },
    /// Extra tokens after a full record were skipped
    ExpectedNewline {
        /// Number of tokens skipped
        skipped: usize,
    },
    /// A field could not be parsed; the record was discarded
    InvalidValue {
        /// Field being parsed
        field: AttributeId,
        /// Parse failure
        detail: String,
    },
    /// The scanner could not classify a word; the record was discarded
    MalformedToken(String),
    /// The stream ended without `@@end_db`
    MissingTrailer,
}

/// One diagnostic with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Line the condition was detected on
    pub line: u64,
    /// What happened
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    /// Severity of this diagnostic.
    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::DuplicateField(_)
            | DiagnosticKind::UnknownField(_)
            | DiagnosticKind::MissingAttrField
            | DiagnosticKind::MissingTrailer => Severity::Advisory,
            DiagnosticKind::NotEnoughFields { .. }
            | DiagnosticKind::ExpectedNewline { .. }
            | DiagnosticKind::InvalidValue { .. }
            | DiagnosticKind::MalformedToken(_) => Severity::Recoverable,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::DuplicateField(name) => {
                write!(f, "line {}: field {} redefined in @@db_spec", self.line, name)
            }
            DiagnosticKind::UnknownField(name) => {
                write!(f, "line {}: unknown field {} in database", self.line, name)
            }
            DiagnosticKind::MissingAttrField => write!(
                f,
                "line {}: database does not have attr field, generating it from @@db_spec; comparison may be incorrect",
                self.line
            ),
            DiagnosticKind::NotEnoughFields { expected, found } => write!(
                f,
                "line {}: not enough fields ({} of {}), record skipped",
                self.line, found, expected
            ),
            DiagnosticKind::ExpectedNewline { skipped } => write!(
                f,
                "line {}: newline expected, skipped {} trailing value(s)",
                self.line, skipped
            ),
            DiagnosticKind::InvalidValue { field, detail } => write!(
                f,
                "line {}: invalid value for {}: {}, record skipped",
                self.line, field, detail
            ),
            DiagnosticKind::MalformedToken(text) => write!(
                f,
                "line {}: malformed token '{}', record skipped",
                self.line, text
            ),
            DiagnosticKind::MissingTrailer => {
                write!(f, "line {}: database ends without @@end_db", self.line)
            }
        }
    }
}

/// Diagnostics kept in memory before further ones are only logged and counted.
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 1024;

/// Collected diagnostics of one stream.
///
/// At most `limit` entries are retained; later ones are still logged and
/// show up in [`Diagnostics::dropped`]. [`Diagnostics::drain`] frees room.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    limit: usize,
    dropped: u64,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::with_limit(DEFAULT_DIAGNOSTIC_LIMIT)
    }
}

impl Diagnostics {
    /// Collector retaining at most `limit` entries.
    pub fn with_limit(limit: usize) -> Self {
        Diagnostics {
            entries: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Log and keep a diagnostic.
    pub fn report(&mut self, line: u64, kind: DiagnosticKind) {
        let diagnostic = Diagnostic { line, kind };
        warn!(
            target: "fimdb::db",
            line,
            severity = ?diagnostic.severity(),
            "{}",
            diagnostic
        );
        if self.entries.len() < self.limit {
            self.entries.push(diagnostic);
        } else {
            self.dropped += 1;
        }
    }

    /// Take the retained diagnostics, leaving the collector empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }

    /// Diagnostics logged but not retained because the limit was reached.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// All diagnostics so far.
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
