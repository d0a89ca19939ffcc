//! Database stream configuration
//!
//! Controls integrity protection, compression and what the writer emits.

use crate::integrity::HmacAlgorithm;
use crate::sink::Compression;
use fimdb_core::{AttrMask, AttributeId};
use std::fmt;

/// Default attributes written by [`crate::DbWriter`].
pub fn default_output_mask() -> AttrMask {
    AttrMask::of(&[
        AttributeId::Filename,
        AttributeId::Linkname,
        AttributeId::Perm,
        AttributeId::Uid,
        AttributeId::Gid,
        AttributeId::Size,
        AttributeId::Mtime,
        AttributeId::Ctime,
        AttributeId::Inode,
        AttributeId::Linkcount,
        AttributeId::Sha256,
        AttributeId::Sha512,
        AttributeId::Attr,
        AttributeId::Acl,
        AttributeId::Xattrs,
        AttributeId::Selinux,
        AttributeId::Capabilities,
    ])
}

/// Database stream configuration
#[derive(Clone)]
pub struct DbConfig {
    /// HMAC key; `None` disables integrity protection
    pub key: Option<Vec<u8>>,
    /// HMAC hash function
    pub hmac: HmacAlgorithm,
    /// Output compression (input compression is detected)
    pub compression: Compression,
    /// Require `@@begin_db` and a digest trailer on input, and a key on output
    pub force_checksum: bool,
    /// Emit generator and time comments in the header
    pub add_metadata: bool,
    /// Configuration version recorded as a header comment
    pub config_version: Option<String>,
    /// Attributes written on every record line
    pub output_mask: AttrMask,
    /// Maintain the unkeyed change-detection digest
    pub change_digest: bool,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("hmac", &self.hmac)
            .field("compression", &self.compression)
            .field("force_checksum", &self.force_checksum)
            .field("add_metadata", &self.add_metadata)
            .field("config_version", &self.config_version)
            .field("output_mask", &self.output_mask)
            .field("change_digest", &self.change_digest)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            key: None,
            hmac: HmacAlgorithm::default(),
            compression: Compression::None,
            force_checksum: false,
            add_metadata: true,
            config_version: None,
            output_mask: default_output_mask(),
            change_digest: false,
        }
    }
}

impl DbConfig {
    /// Create config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config for testing
    ///
    /// No metadata comments, so output is byte-for-byte reproducible.
    pub fn for_testing() -> Self {
        DbConfig {
            add_metadata: false,
            ..Default::default()
        }
    }

    /// Set the HMAC key
    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the HMAC hash function
    pub fn with_hmac(mut self, algorithm: HmacAlgorithm) -> Self {
        self.hmac = algorithm;
        self
    }

    /// Set output compression
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Require checksums
    pub fn with_force_checksum(mut self, force: bool) -> Self {
        self.force_checksum = force;
        self
    }

    /// Emit metadata comments
    pub fn with_metadata(mut self, add: bool) -> Self {
        self.add_metadata = add;
        self
    }

    /// Record a configuration version in the header
    pub fn with_config_version(mut self, version: impl Into<String>) -> Self {
        self.config_version = Some(version.into());
        self
    }

    /// Set the attributes written per record
    pub fn with_output_mask(mut self, mask: AttrMask) -> Self {
        self.output_mask = mask;
        self
    }

    /// Maintain the change-detection digest
    pub fn with_change_digest(mut self, enabled: bool) -> Self {
        self.change_digest = enabled;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = &self.key {
            if key.is_empty() {
                return Err(ConfigError::EmptyKey);
            }
        } else if self.force_checksum {
            return Err(ConfigError::ChecksumWithoutKey);
        }
        if let Compression::Zstd { level } = self.compression {
            if !zstd::compression_level_range().contains(&level) {
                return Err(ConfigError::InvalidCompressionLevel(level));
            }
        }
        if (self.output_mask & AttrMask::all()).is_empty() {
            return Err(ConfigError::EmptyOutputMask);
        }
        if let Some(version) = &self.config_version {
            if version.contains('\n') {
                return Err(ConfigError::MultilineConfigVersion);
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The HMAC key is empty
    #[error("Database key must not be empty")]
    EmptyKey,

    /// Checksums are mandatory but there is no key
    #[error("Mandatory checksums require a database key")]
    ChecksumWithoutKey,

    /// zstd level out of range
    #[error("Invalid zstd compression level {0}")]
    InvalidCompressionLevel(i32),

    /// No attribute would be written
    #[error("Output mask selects no attribute")]
    EmptyOutputMask,

    /// Header comments are single-line
    #[error("Config version must be a single line")]
    MultilineConfigVersion,
}
