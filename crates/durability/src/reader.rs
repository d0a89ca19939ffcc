//! Database reader session
//!
//! Wraps the source in a [`SourceAdapter`] (zstd input is detected by its
//! frame magic), scans it, and decodes one record per call.

use crate::config::DbConfig;
use crate::decoder::{Decoded, RecordDecoder};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::scanner::Scanner;
use crate::schema::Schema;
use crate::sink::SourceAdapter;
use fimdb_core::{AttrMask, Error, Record, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reader for one database table.
pub struct DbReader<R: Read> {
    decoder: RecordDecoder<Scanner<SourceAdapter<R>>>,
    compressed: bool,
    stopped: bool,
}

impl<R: Read> DbReader<R> {
    /// Open a table: reads the header and the schema.
    pub fn open(source: R, config: &DbConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_operation(format!("invalid database config: {}", e)))?;
        let source = SourceAdapter::open(source)?;
        let compressed = source.is_compressed();
        let decoder = RecordDecoder::open(Scanner::new(source), config)?;
        Ok(DbReader {
            decoder,
            compressed,
            stopped: false,
        })
    }

    /// Next record, or `None` once the table is over.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        match self.decoder.decode_record()? {
            Decoded::Record(record) => Ok(Some(record)),
            Decoded::EndOfTable => Ok(None),
        }
    }

    /// Schema declared by the table.
    pub fn schema(&self) -> &Schema {
        self.decoder.schema()
    }

    /// Advisory and recoverable conditions met so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        self.decoder.diagnostics()
    }

    /// Take the diagnostics retained so far.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.decoder.take_diagnostics()
    }

    /// Current line.
    pub fn line(&self) -> u64 {
        self.decoder.line()
    }

    /// Trailer digest, once verified.
    pub fn verified_digest(&self) -> Option<&str> {
        self.decoder.verified_digest()
    }

    /// Whether the input is zstd-compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Attribute mask that applies to `record`.
    pub fn attr_mask(&self, record: &Record) -> AttrMask {
        self.decoder.attr_mask(record)
    }
}

impl<R: Read> Iterator for DbReader<R> {
    type Item = Result<Record>;

    /// Stops after the end of the table or the first fatal error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.stopped = true;
                None
            }
            Err(e) => {
                self.stopped = true;
                Some(Err(e))
            }
        }
    }
}

/// Open a database file.
pub fn open_file(path: impl AsRef<Path>, config: &DbConfig) -> Result<DbReader<File>> {
    let file = File::open(path.as_ref())?;
    DbReader::open(file, config)
}
