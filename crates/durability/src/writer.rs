//! Database writer session
//!
//! Writes one table:
//!
//! ```text
//! @@begin_db
//! # This file was generated by fimdb, version 0.1.0
//! # Time of generation was 2024-01-01 12:00:00
//! @@db_spec filename perm ...
//! <record line>
//! ...
//! @@end_db <base64 HMAC>
//! ```
//!
//! The HMAC covers everything after the `@@db_spec` line up to, not
//! including, the `@@end_db` keyword. When compressing, the trailer is part
//! of the compressed stream and the zstd frame is finished after it.

use crate::config::DbConfig;
use crate::encoder::encode_record;
use crate::integrity::{ChangeDigest, DigestAccumulator};
use crate::scanner::{BEGIN_DB, END_DB};
use crate::schema::Schema;
use crate::sink::SinkAdapter;
use fimdb_core::{AttrMask, Error, Record, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Result of a finished write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Records written
    pub records: u64,
    /// Uncompressed bytes written, header and trailer included
    pub bytes: u64,
    /// Base64 HMAC written to the trailer, if keyed
    pub digest: Option<String>,
    /// Hex change-detection digest over the record lines, if enabled
    pub change_digest: Option<String>,
}

/// Writer for one database table.
pub struct DbWriter<W: Write> {
    sink: SinkAdapter<W>,
    output_mask: AttrMask,
    digest: DigestAccumulator,
    change: Option<ChangeDigest>,
    records: u64,
    bytes: u64,
}

impl<W: Write> DbWriter<W> {
    /// Start a table on `sink`: writes the header and the schema line.
    pub fn create(sink: W, config: &DbConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_operation(format!("invalid database config: {}", e)))?;

        let mut writer = DbWriter {
            sink: SinkAdapter::new(sink, config.compression)?,
            output_mask: config.output_mask & AttrMask::all(),
            digest: DigestAccumulator::new(config.hmac),
            change: config.change_digest.then(ChangeDigest::new),
            records: 0,
            bytes: 0,
        };

        let mut header = format!("{}\n", BEGIN_DB);
        if config.add_metadata {
            header.push_str(&format!(
                "# This file was generated by fimdb, version {}\n# Time of generation was {}\n",
                env!("CARGO_PKG_VERSION"),
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            ));
        }
        if let Some(version) = &config.config_version {
            header.push_str(&format!(
                "# The config version used to generate this file was:\n# {}\n",
                version
            ));
        }
        header.push_str(&Schema::from_mask(writer.output_mask).declaration());
        writer.write_raw(header.as_bytes())?;

        if let Some(key) = &config.key {
            writer.digest.activate(key)?;
        }
        debug!(
            target: "fimdb::db",
            fields = writer.output_mask.iter().count(),
            keyed = writer.digest.is_active(),
            compressed = writer.sink.is_compressing(),
            "Started database table"
        );
        Ok(writer)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes += self.sink.write(bytes)? as u64;
        Ok(())
    }

    /// Attributes written per record.
    pub fn output_mask(&self) -> AttrMask {
        self.output_mask
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Append one record, returning the bytes written.
    pub fn write_record(&mut self, record: &Record) -> Result<usize> {
        let written = encode_record(
            record,
            self.output_mask,
            &mut self.sink,
            &mut self.digest,
            self.change.as_mut(),
        )?;
        self.records += 1;
        self.bytes += written as u64;
        Ok(written)
    }

    /// Write the trailer and close the transport.
    pub fn finish(self) -> Result<WriteSummary> {
        self.finish_into_inner().map(|(_, summary)| summary)
    }

    /// Like [`DbWriter::finish`], also handing back the underlying writer.
    pub fn finish_into_inner(mut self) -> Result<(W, WriteSummary)> {
        let digest = self.digest.finalize()?;
        let trailer = match &digest {
            Some(d) => format!("{} {}\n", END_DB, d),
            None => format!("{}\n", END_DB),
        };
        self.write_raw(trailer.as_bytes())?;
        let inner = self.sink.close()?;

        let summary = WriteSummary {
            records: self.records,
            bytes: self.bytes,
            digest,
            change_digest: self.change.as_ref().map(ChangeDigest::hex),
        };
        info!(
            target: "fimdb::db",
            records = summary.records,
            bytes = summary.bytes,
            keyed = summary.digest.is_some(),
            "Finished database table"
        );
        Ok((inner, summary))
    }
}

/// Create (or truncate) a database file and start a table in it.
pub fn create_file(path: impl AsRef<Path>, config: &DbConfig) -> Result<DbWriter<File>> {
    let file = File::create(path.as_ref())?;
    DbWriter::create(file, config)
}

/// Write `records` to `path` as one table.
///
/// The table is written to a temporary file which is renamed over `path`
/// only once complete, so a failed write leaves no partial database behind.
pub fn write_database<'a, I>(path: impl AsRef<Path>, records: I, config: &DbConfig) -> Result<WriteSummary>
where
    I: IntoIterator<Item = &'a Record>,
{
    let path = path.as_ref();
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let result = (|| -> Result<WriteSummary> {
        let mut writer = create_file(&temp_path, config)?;
        for record in records {
            writer.write_record(record)?;
        }
        let (file, summary) = writer.finish_into_inner()?;
        file.sync_all()?;
        Ok(summary)
    })();

    match result {
        Ok(summary) => {
            fs::rename(&temp_path, path)?;
            Ok(summary)
        }
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Compression, ZSTD_MAGIC};
    use fimdb_core::{AttributeId, FieldValue};

    fn config() -> DbConfig {
        DbConfig::for_testing()
            .with_output_mask(AttrMask::of(&[AttributeId::Filename, AttributeId::Uid]))
    }

    fn record(name: &str, uid: i64) -> Record {
        Record::new()
            .with(AttributeId::Filename, FieldValue::Text(name.into()))
            .unwrap()
            .with(AttributeId::Uid, FieldValue::Integer(uid))
            .unwrap()
    }

    fn write(config: &DbConfig, records: &[Record]) -> (Vec<u8>, WriteSummary) {
        let mut writer = DbWriter::create(Vec::new(), config).unwrap();
        for r in records {
            writer.write_record(r).unwrap();
        }
        writer.finish_into_inner().unwrap()
    }

    #[test]
    fn test_plain_layout() {
        let (bytes, summary) = write(&config(), &[record("/a", 1), record("/b", 2)]);
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            "@@begin_db\n@@db_spec filename uid \n/a 1\n/b 2\n@@end_db\n"
        );
        assert_eq!(summary.records, 2);
        assert_eq!(summary.bytes, bytes.len() as u64);
        assert_eq!(summary.digest, None);
        assert_eq!(summary.change_digest, None);
    }

    #[test]
    fn test_metadata_and_config_version() {
        let config = config().with_metadata(true).with_config_version("cfg-7");
        let (bytes, _) = write(&config, &[]);
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "@@begin_db");
        assert!(lines[1].starts_with("# This file was generated by fimdb"));
        assert!(lines[2].starts_with("# Time of generation was "));
        assert_eq!(lines[3], "# The config version used to generate this file was:");
        assert_eq!(lines[4], "# cfg-7");
        assert_eq!(lines[5], "@@db_spec filename uid ");
    }

    #[test]
    fn test_keyed_trailer_covers_records_only() {
        let config = config().with_key(b"k".to_vec());
        let (bytes, summary) = write(&config, &[record("/a", 1)]);
        let digest = summary.digest.clone().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with(&format!("@@end_db {}\n", digest)));

        let mut acc = DigestAccumulator::new(config.hmac);
        acc.activate(b"k").unwrap();
        acc.update(b"/a 1\n").unwrap();
        assert_eq!(acc.finalize().unwrap(), Some(digest));
    }

    #[test]
    fn test_change_digest_ignores_header() {
        let a = config().with_change_digest(true);
        let b = a.clone().with_metadata(true).with_config_version("other");
        let (_, sa) = write(&a, &[record("/a", 1)]);
        let (_, sb) = write(&b, &[record("/a", 1)]);
        assert!(sa.change_digest.is_some());
        assert_eq!(sa.change_digest, sb.change_digest);
        let (_, sc) = write(&a, &[record("/a", 2)]);
        assert_ne!(sa.change_digest, sc.change_digest);
    }

    #[test]
    fn test_compressed_output() {
        let config = config().with_compression(Compression::zstd());
        let (bytes, summary) = write(&config, &[record("/a", 1)]);
        assert!(bytes.starts_with(&ZSTD_MAGIC));
        let plain = zstd::decode_all(&bytes[..]).unwrap();
        assert_eq!(plain.len() as u64, summary.bytes);
        assert!(plain.ends_with(b"@@end_db\n"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = config().with_force_checksum(true);
        assert!(matches!(
            DbWriter::create(Vec::new(), &config),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_write_database_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("aide.db");
        let records = vec![record("/a", 1)];
        let summary = write_database(&path, &records, &config()).unwrap();
        assert_eq!(summary.records, 1);
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
