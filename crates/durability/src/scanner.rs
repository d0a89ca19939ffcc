//! Lexical scanner for database text.
//!
//! Turns the byte stream into tokens. Every token carries the raw bytes
//! consumed to produce it (separators and comments before the token text, the
//! text itself, and for `@@end_db` the blanks after it) so that a reader can
//! feed exactly the bytes it consumed into the integrity digest.
//!
//! # Lexical rules
//!
//! - space, tab and carriage return separate tokens
//! - `\n` is a [`TokenKind::Newline`] token
//! - `#` as the first token of a line starts a comment running through the
//!   newline; comments produce no token
//! - `@@begin_db`, `@@db_spec`, `@@end_db` are keywords; `@@end_db` followed by
//!   more text on the same line announces a digest, and the next word is a
//!   [`TokenKind::String`]
//! - any other word is an [`TokenKind::Identifier`], unless it contains bytes
//!   outside printable ASCII or is an unknown `@@` keyword, in which case it is
//!   [`TokenKind::Malformed`]

use fimdb_core::Result;
use std::io::BufRead;

/// Keyword opening a table.
pub const BEGIN_DB: &str = "@@begin_db";
/// Keyword declaring the schema.
pub const DB_SPEC: &str = "@@db_spec";
/// Keyword closing a table.
pub const END_DB: &str = "@@end_db";

/// Kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A bare word
    Identifier,
    /// The digest word following `@@end_db`
    String,
    /// `@@begin_db`
    BeginDb,
    /// `@@end_db` with a digest on the same line
    EndDb,
    /// `@@end_db` alone on its line
    EndDbNoDigest,
    /// `@@db_spec`
    DbSpec,
    /// Line terminator
    Newline,
    /// End of input
    Eof,
    /// A word the scanner cannot classify
    Malformed,
}

impl TokenKind {
    /// Whether this token delimits a table or declares a schema.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            TokenKind::BeginDb | TokenKind::EndDb | TokenKind::EndDbNoDigest | TokenKind::DbSpec
        )
    }
}

/// One scanned token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Token text (empty for `Newline` and `Eof`)
    pub text: String,
    /// Line the token starts on (1-based)
    pub line: u64,
    raw: Vec<u8>,
    leading: usize,
}

impl Token {
    /// Every byte consumed to produce this token.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Bytes consumed before the token text (separators and comments).
    pub fn leading(&self) -> &[u8] {
        &self.raw[..self.leading]
    }
}

/// Pull-based token stream.
///
/// The reader session depends on this trait rather than on [`Scanner`] so a
/// different lexer can be plugged in below it.
pub trait TokenSource {
    /// Next token. After `Eof`, keeps returning `Eof`.
    fn next_token(&mut self) -> Result<Token>;

    /// Current line number (1-based).
    fn line(&self) -> u64;
}

/// Byte-level scanner over a buffered reader.
pub struct Scanner<R> {
    reader: R,
    line: u64,
    at_line_start: bool,
    expect_digest: bool,
}

impl<R: BufRead> Scanner<R> {
    /// Create a scanner positioned at line 1.
    pub fn new(reader: R) -> Self {
        Scanner {
            reader,
            line: 1,
            at_line_start: true,
            expect_digest: false,
        }
    }

    /// Whether the underlying reader has no more bytes.
    pub fn at_eof(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self.reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self, raw: &mut Vec<u8>, byte: u8) {
        raw.push(byte);
        self.reader.consume(1);
    }

    fn token(&self, kind: TokenKind, line: u64, raw: Vec<u8>, leading: usize) -> Token {
        let text = String::from_utf8_lossy(&raw[leading..]).into_owned();
        Token {
            kind,
            text,
            line,
            raw,
            leading,
        }
    }

    fn classify(&mut self, word: &[u8], raw: &mut Vec<u8>) -> Result<TokenKind> {
        if self.expect_digest {
            self.expect_digest = false;
            return Ok(if is_printable(word) {
                TokenKind::String
            } else {
                TokenKind::Malformed
            });
        }
        if !is_printable(word) {
            return Ok(TokenKind::Malformed);
        }
        if !word.starts_with(b"@@") {
            return Ok(TokenKind::Identifier);
        }
        match word {
            w if w == BEGIN_DB.as_bytes() => Ok(TokenKind::BeginDb),
            w if w == DB_SPEC.as_bytes() => Ok(TokenKind::DbSpec),
            w if w == END_DB.as_bytes() => {
                while let Some(b @ (b' ' | b'\t' | b'\r')) = self.peek()? {
                    self.bump(raw, b);
                }
                match self.peek()? {
                    Some(b) if b != b'\n' => {
                        self.expect_digest = true;
                        Ok(TokenKind::EndDb)
                    }
                    _ => Ok(TokenKind::EndDbNoDigest),
                }
            }
            _ => Ok(TokenKind::Malformed),
        }
    }
}

impl<R: BufRead> TokenSource for Scanner<R> {
    fn next_token(&mut self) -> Result<Token> {
        let mut raw = Vec::new();
        loop {
            match self.peek()? {
                None => {
                    let leading = raw.len();
                    return Ok(self.token(TokenKind::Eof, self.line, raw, leading));
                }
                Some(b @ (b' ' | b'\t' | b'\r')) => self.bump(&mut raw, b),
                Some(b'\n') => {
                    let leading = raw.len();
                    self.bump(&mut raw, b'\n');
                    let line = self.line;
                    self.line += 1;
                    self.at_line_start = true;
                    let mut token = self.token(TokenKind::Newline, line, raw, leading);
                    token.text.clear();
                    return Ok(token);
                }
                Some(b'#') if self.at_line_start => {
                    while let Some(b) = self.peek()? {
                        self.bump(&mut raw, b);
                        if b == b'\n' {
                            self.line += 1;
                            break;
                        }
                    }
                }
                Some(_) => break,
            }
        }

        let line = self.line;
        let leading = raw.len();
        while let Some(b) = self.peek()? {
            if matches!(b, b' ' | b'\t' | b'\r' | b'\n') {
                break;
            }
            self.bump(&mut raw, b);
        }
        self.at_line_start = false;

        let word = raw[leading..].to_vec();
        let kind = self.classify(&word, &mut raw)?;
        let mut token = self.token(kind, line, raw, leading);
        token.text = String::from_utf8_lossy(&word).into_owned();
        Ok(token)
    }

    fn line(&self) -> u64 {
        self.line
    }
}

fn is_printable(word: &[u8]) -> bool {
    word.iter().all(|b| (0x21..=0x7e).contains(b))
}
