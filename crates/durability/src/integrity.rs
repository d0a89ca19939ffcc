//! Stream integrity digests.
//!
//! [`DigestAccumulator`] is the keyed digest (HMAC) protecting a whole table.
//! It moves through three states:
//!
//! ```text
//! Uninitialized --activate(key)--> Active --finalize()--> Finalized
//! ```
//!
//! Without a key the accumulator stays `Uninitialized` forever: updates are
//! ignored and finalizing yields no digest. Feeding or finalizing after
//! `Finalized` is API misuse and returns `Error::InvalidOperation`.
//!
//! [`ChangeDigest`] is an unkeyed xxh3 over the record lines, used only to
//! tell whether two runs produced the same records. It is never written to
//! the database.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use fimdb_core::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Hash function underlying the database HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HmacAlgorithm {
    /// HMAC-SHA-256
    #[default]
    Sha256,
    /// HMAC-SHA-512
    Sha512,
}

impl HmacAlgorithm {
    /// Length of the raw digest in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            HmacAlgorithm::Sha256 => 32,
            HmacAlgorithm::Sha512 => 64,
        }
    }

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            HmacAlgorithm::Sha256 => "sha256",
            HmacAlgorithm::Sha512 => "sha512",
        }
    }

    /// Parse a configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(HmacAlgorithm::Sha256),
            "sha512" => Some(HmacAlgorithm::Sha512),
            _ => None,
        }
    }
}

enum KeyedMac {
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
}

impl KeyedMac {
    fn new(algorithm: HmacAlgorithm, key: &[u8]) -> Result<Self> {
        let mac = match algorithm {
            HmacAlgorithm::Sha256 => Hmac::<Sha256>::new_from_slice(key).map(KeyedMac::Sha256),
            HmacAlgorithm::Sha512 => Hmac::<Sha512>::new_from_slice(key).map(KeyedMac::Sha512),
        };
        mac.map_err(|e| Error::invalid_operation(format!("HMAC init failed: {}", e)))
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            KeyedMac::Sha256(m) => m.update(bytes),
            KeyedMac::Sha512(m) => m.update(bytes),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            KeyedMac::Sha256(m) => m.finalize().into_bytes().to_vec(),
            KeyedMac::Sha512(m) => m.finalize().into_bytes().to_vec(),
        }
    }
}

enum State {
    Uninitialized,
    Active(KeyedMac),
    Finalized(String),
}

/// Observable state of a [`DigestAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestState {
    /// No key; nothing is digested
    Uninitialized,
    /// Digesting every byte fed
    Active,
    /// Digest computed; no more input accepted
    Finalized,
}

/// Keyed digest over one table.
pub struct DigestAccumulator {
    algorithm: HmacAlgorithm,
    state: State,
    bytes_fed: u64,
}

impl fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAccumulator")
            .field("algorithm", &self.algorithm)
            .field("state", &self.state())
            .field("bytes_fed", &self.bytes_fed)
            .finish()
    }
}

impl DigestAccumulator {
    /// New accumulator in the `Uninitialized` state.
    pub fn new(algorithm: HmacAlgorithm) -> Self {
        DigestAccumulator {
            algorithm,
            state: State::Uninitialized,
            bytes_fed: 0,
        }
    }

    /// Start digesting with `key`.
    pub fn activate(&mut self, key: &[u8]) -> Result<()> {
        match self.state {
            State::Uninitialized => {
                self.state = State::Active(KeyedMac::new(self.algorithm, key)?);
                Ok(())
            }
            _ => Err(Error::invalid_operation(
                "digest accumulator already activated",
            )),
        }
    }

    /// Current state.
    pub fn state(&self) -> DigestState {
        match self.state {
            State::Uninitialized => DigestState::Uninitialized,
            State::Active(_) => DigestState::Active,
            State::Finalized(_) => DigestState::Finalized,
        }
    }

    /// Whether bytes fed are being digested.
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Algorithm in use.
    pub fn algorithm(&self) -> HmacAlgorithm {
        self.algorithm
    }

    /// Number of bytes digested so far.
    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }

    /// Feed bytes. Ignored while `Uninitialized`.
    pub fn update(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Uninitialized => Ok(()),
            State::Active(mac) => {
                mac.update(bytes);
                self.bytes_fed += bytes.len() as u64;
                Ok(())
            }
            State::Finalized(_) => Err(Error::invalid_operation(
                "bytes fed to a finalized digest",
            )),
        }
    }

    /// Compute the base64 digest. `None` when no key was ever activated.
    pub fn finalize(&mut self) -> Result<Option<String>> {
        match std::mem::replace(&mut self.state, State::Uninitialized) {
            State::Uninitialized => Ok(None),
            State::Active(mac) => {
                let digest = BASE64.encode(mac.finalize());
                self.state = State::Finalized(digest.clone());
                Ok(Some(digest))
            }
            State::Finalized(digest) => {
                self.state = State::Finalized(digest);
                Err(Error::invalid_operation("digest finalized twice"))
            }
        }
    }

    /// Finalize and compare against the digest stored in a trailer.
    pub fn verify(&mut self, expected: &str) -> Result<String> {
        match self.finalize()? {
            None => Err(Error::UnexpectedChecksum),
            Some(actual) if actual.as_bytes() == expected.as_bytes() => Ok(actual),
            Some(actual) => Err(Error::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            }),
        }
    }

    /// The final digest, once computed.
    pub fn digest(&self) -> Option<&str> {
        match &self.state {
            State::Finalized(d) => Some(d),
            _ => None,
        }
    }
}

/// Unkeyed digest over record lines, for change detection between runs.
pub struct ChangeDigest {
    hasher: Xxh3,
}

impl Default for ChangeDigest {
    fn default() -> Self {
        ChangeDigest { hasher: Xxh3::new() }
    }
}

impl ChangeDigest {
    /// Fresh digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Hex digest of everything fed so far.
    pub fn hex(&self) -> String {
        format!("{:016x}", self.hasher.digest())
    }
}
