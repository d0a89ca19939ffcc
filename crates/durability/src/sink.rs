//! Byte transports below the codec.
//!
//! [`SinkAdapter`] gives the writer one contract (`write`, `flush`, `close`)
//! over either a plain buffered stream or a zstd compressor. [`SourceAdapter`]
//! does the same for reading and detects compressed input by its frame magic.
//!
//! Flushing is a no-op on the compressing sink: forcing a flush after every
//! record ends a zstd block early and degrades the ratio.

use fimdb_core::{Error, Result};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

/// Magic bytes opening a zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default zstd level for database output.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Output compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain text
    #[default]
    None,
    /// zstd stream at the given level
    Zstd {
        /// Compression level
        level: i32,
    },
}

impl Compression {
    /// zstd at the default level.
    pub fn zstd() -> Self {
        Compression::Zstd {
            level: DEFAULT_ZSTD_LEVEL,
        }
    }
}

/// Writer contract over a plain or compressing transport.
pub enum SinkAdapter<W: Write> {
    /// Buffered plain output
    Plain(BufWriter<W>),
    /// zstd-compressed output
    Zstd(zstd::Encoder<'static, BufWriter<W>>),
}

impl<W: Write> SinkAdapter<W> {
    /// Wrap `inner` according to `compression`.
    pub fn new(inner: W, compression: Compression) -> Result<Self> {
        let buffered = BufWriter::new(inner);
        match compression {
            Compression::None => Ok(SinkAdapter::Plain(buffered)),
            Compression::Zstd { level } => zstd::Encoder::new(buffered, level)
                .map(SinkAdapter::Zstd)
                .map_err(|e| Error::compression(format!("zstd encoder: {}", e))),
        }
    }

    /// Whether output is compressed.
    pub fn is_compressing(&self) -> bool {
        matches!(self, SinkAdapter::Zstd(_))
    }

    /// Write all of `bytes`, returning the count.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        match self {
            SinkAdapter::Plain(w) => w.write_all(bytes)?,
            SinkAdapter::Zstd(w) => w.write_all(bytes)?,
        }
        Ok(bytes.len())
    }

    /// Flush buffered output. No-op when compressing.
    pub fn flush(&mut self) -> Result<()> {
        match self {
            SinkAdapter::Plain(w) => Ok(w.flush()?),
            SinkAdapter::Zstd(_) => Ok(()),
        }
    }

    /// Finish the transport and give back the inner writer.
    ///
    /// For the compressing variant this writes the zstd frame epilogue.
    pub fn close(self) -> Result<W> {
        let buffered = match self {
            SinkAdapter::Plain(w) => w,
            SinkAdapter::Zstd(encoder) => encoder
                .finish()
                .map_err(|e| Error::compression(format!("zstd finish: {}", e)))?,
        };
        buffered.into_inner().map_err(|e| Error::Io(e.into_error()))
    }
}

/// Input with the bytes consumed by magic detection put back in front.
type Prefixed<R> = io::Chain<io::Cursor<Vec<u8>>, R>;

/// Reader over a plain or zstd-compressed transport.
pub enum SourceAdapter<R: Read> {
    /// Plain input
    Plain(BufReader<Prefixed<R>>),
    /// zstd-compressed input
    Zstd(BufReader<zstd::Decoder<'static, BufReader<Prefixed<R>>>>),
}

/// Read until `ZSTD_MAGIC.len()` bytes are in hand or the input ends.
fn read_head<R: Read>(inner: &mut R) -> io::Result<Vec<u8>> {
    let mut head = vec![0u8; ZSTD_MAGIC.len()];
    let mut filled = 0;
    while filled < head.len() {
        match inner.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    head.truncate(filled);
    Ok(head)
}

impl<R: Read> SourceAdapter<R> {
    /// Wrap `inner`, decompressing if it starts with a zstd frame.
    ///
    /// Short reads are retried so the magic is seen even on pipes.
    pub fn open(mut inner: R) -> Result<Self> {
        let head = read_head(&mut inner)?;
        let compressed = head == ZSTD_MAGIC;
        let reader = BufReader::new(io::Cursor::new(head).chain(inner));
        if compressed {
            let decoder = zstd::Decoder::with_buffer(reader)
                .map_err(|e| Error::compression(format!("zstd decoder: {}", e)))?;
            Ok(SourceAdapter::Zstd(BufReader::new(decoder)))
        } else {
            Ok(SourceAdapter::Plain(reader))
        }
    }

    /// Whether input is being decompressed.
    pub fn is_compressed(&self) -> bool {
        matches!(self, SourceAdapter::Zstd(_))
    }

    /// Whether no more bytes are available.
    pub fn at_eof(&mut self) -> Result<bool> {
        Ok(self.fill_buf()?.is_empty())
    }
}

impl<R: Read> Read for SourceAdapter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            SourceAdapter::Plain(r) => r.read(buf),
            SourceAdapter::Zstd(r) => r.read(buf),
        }
    }
}

impl<R: Read> BufRead for SourceAdapter<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            SourceAdapter::Plain(r) => r.fill_buf(),
            SourceAdapter::Zstd(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            SourceAdapter::Plain(r) => r.consume(amt),
            SourceAdapter::Zstd(r) => r.consume(amt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_roundtrip() {
        let mut sink = SinkAdapter::new(Vec::new(), Compression::None).unwrap();
        assert!(!sink.is_compressing());
        assert_eq!(sink.write(b"hello\n").unwrap(), 6);
        sink.flush().unwrap();
        let bytes = sink.close().unwrap();
        assert_eq!(bytes, b"hello\n");

        let mut source = SourceAdapter::open(&bytes[..]).unwrap();
        assert!(!source.is_compressed());
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n");
        assert!(source.at_eof().unwrap());
    }

    #[test]
    fn test_zstd_roundtrip() {
        let mut sink = SinkAdapter::new(Vec::new(), Compression::zstd()).unwrap();
        assert!(sink.is_compressing());
        for _ in 0..100 {
            sink.write(b"/usr/bin/env 0 0 0\n").unwrap();
            sink.flush().unwrap();
        }
        let bytes = sink.close().unwrap();
        assert!(bytes.starts_with(&ZSTD_MAGIC));
        assert!(bytes.len() < 100 * 19);

        let mut source = SourceAdapter::open(&bytes[..]).unwrap();
        assert!(source.is_compressed());
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out.lines().count(), 100);
    }

    /// Hands out at most one byte per read.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.0.len().min(buf.len()).min(1);
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_detects_magic_across_short_reads() {
        let mut sink = SinkAdapter::new(Vec::new(), Compression::zstd()).unwrap();
        sink.write(b"/etc/hosts 0\n").unwrap();
        let bytes = sink.close().unwrap();

        let mut source = SourceAdapter::open(Trickle(&bytes)).unwrap();
        assert!(source.is_compressed());
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out, "/etc/hosts 0\n");

        let mut plain = SourceAdapter::open(Trickle(b"ab")).unwrap();
        assert!(!plain.is_compressed());
        let mut out = String::new();
        plain.read_to_string(&mut out).unwrap();
        assert_eq!(out, "ab");
    }

    #[test]
    fn test_empty_source() {
        let mut source = SourceAdapter::open(&b""[..]).unwrap();
        assert!(!source.is_compressed());
        assert!(source.at_eof().unwrap());
    }
}
