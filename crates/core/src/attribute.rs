//! Attribute catalog
//!
//! The fixed set of field kinds a database record can carry. The catalog is
//! the single source of truth for three things:
//!
//! - the on-disk name of each attribute (used in `@@db_spec` lines)
//! - the semantic kind that decides how a value is encoded
//! - the canonical output order (records are always written in catalog order)
//!
//! Attribute ids are small integers; each id owns the bit `1 << id` in an
//! [`AttrMask`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Semantic type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrKind {
    /// Escaped text (file names, link targets)
    String,
    /// Signed decimal integer
    Integer,
    /// Signed decimal integer that may exceed 32 bits
    LongInteger,
    /// Seconds since the epoch
    Time,
    /// Permission bits, written in octal
    Octal,
    /// Raw digest bytes of a content hash
    HashDigest,
    /// Opaque access/default ACL blob
    Acl,
    /// Extended attribute key/value list
    XattrSet,
    /// Opaque file capability blob
    Capabilities,
    /// Opaque security (SELinux) context
    SecurityContext,
}

impl AttrKind {
    /// Whether the value is carried as base64-encoded bytes.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            AttrKind::HashDigest | AttrKind::Capabilities | AttrKind::SecurityContext
        )
    }
}

/// Identifier of a catalog attribute, in catalog order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum AttributeId {
    /// File name
    Filename = 0,
    /// Symlink target
    Linkname,
    /// Permission bits
    Perm,
    /// Owner uid
    Uid,
    /// Owner gid
    Gid,
    /// Size in bytes
    Size,
    /// Access time
    Atime,
    /// Inode change time
    Ctime,
    /// Modification time
    Mtime,
    /// Inode number
    Inode,
    /// Allocated block count
    Bcount,
    /// Hard link count
    Linkcount,
    /// MD5 digest
    Md5,
    /// SHA-1 digest
    Sha1,
    /// RIPEMD-160 digest
    Rmd160,
    /// Tiger digest
    Tiger,
    /// CRC32 checksum
    Crc32,
    /// CRC32 (bzip2 variant) checksum
    Crc32b,
    /// HAVAL digest
    Haval,
    /// GOST R 34.11-94 digest
    Gost,
    /// SHA-256 digest
    Sha256,
    /// SHA-512 digest
    Sha512,
    /// Whirlpool digest
    Whirlpool,
    /// Per-record attribute mask
    Attr,
    /// POSIX ACL
    Acl,
    /// Extended attributes
    Xattrs,
    /// SELinux context
    Selinux,
    /// ext2 file attributes
    E2fsattrs,
    /// File capabilities
    Capabilities,
}

/// Static description of one catalog attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDescriptor {
    /// Attribute id
    pub id: AttributeId,
    /// Name used in `@@db_spec` declarations
    pub name: &'static str,
    /// Value kind
    pub kind: AttrKind,
}

impl AttributeDescriptor {
    /// Mask bit owned by this attribute.
    pub fn bit(&self) -> AttrMask {
        self.id.bit()
    }
}

const fn desc(id: AttributeId, name: &'static str, kind: AttrKind) -> AttributeDescriptor {
    AttributeDescriptor { id, name, kind }
}

/// The attribute catalog, indexed by `AttributeId as usize`.
pub static CATALOG: [AttributeDescriptor; AttributeId::COUNT] = [
    desc(AttributeId::Filename, "filename", AttrKind::String),
    desc(AttributeId::Linkname, "lname", AttrKind::String),
    desc(AttributeId::Perm, "perm", AttrKind::Octal),
    desc(AttributeId::Uid, "uid", AttrKind::Integer),
    desc(AttributeId::Gid, "gid", AttrKind::Integer),
    desc(AttributeId::Size, "size", AttrKind::LongInteger),
    desc(AttributeId::Atime, "atime", AttrKind::Time),
    desc(AttributeId::Ctime, "ctime", AttrKind::Time),
    desc(AttributeId::Mtime, "mtime", AttrKind::Time),
    desc(AttributeId::Inode, "inode", AttrKind::LongInteger),
    desc(AttributeId::Bcount, "bcount", AttrKind::LongInteger),
    desc(AttributeId::Linkcount, "lcount", AttrKind::Integer),
    desc(AttributeId::Md5, "md5", AttrKind::HashDigest),
    desc(AttributeId::Sha1, "sha1", AttrKind::HashDigest),
    desc(AttributeId::Rmd160, "rmd160", AttrKind::HashDigest),
    desc(AttributeId::Tiger, "tiger", AttrKind::HashDigest),
    desc(AttributeId::Crc32, "crc32", AttrKind::HashDigest),
    desc(AttributeId::Crc32b, "crc32b", AttrKind::HashDigest),
    desc(AttributeId::Haval, "haval", AttrKind::HashDigest),
    desc(AttributeId::Gost, "gost", AttrKind::HashDigest),
    desc(AttributeId::Sha256, "sha256", AttrKind::HashDigest),
    desc(AttributeId::Sha512, "sha512", AttrKind::HashDigest),
    desc(AttributeId::Whirlpool, "whirlpool", AttrKind::HashDigest),
    desc(AttributeId::Attr, "attr", AttrKind::LongInteger),
    desc(AttributeId::Acl, "acl", AttrKind::Acl),
    desc(AttributeId::Xattrs, "xattrs", AttrKind::XattrSet),
    desc(AttributeId::Selinux, "selinux", AttrKind::SecurityContext),
    desc(AttributeId::E2fsattrs, "e2fsattrs", AttrKind::Integer),
    desc(AttributeId::Capabilities, "caps", AttrKind::Capabilities),
];

impl AttributeId {
    /// Number of catalog attributes.
    pub const COUNT: usize = 29;

    /// All attribute ids in catalog order.
    pub const ALL: [AttributeId; AttributeId::COUNT] = [
        AttributeId::Filename,
        AttributeId::Linkname,
        AttributeId::Perm,
        AttributeId::Uid,
        AttributeId::Gid,
        AttributeId::Size,
        AttributeId::Atime,
        AttributeId::Ctime,
        AttributeId::Mtime,
        AttributeId::Inode,
        AttributeId::Bcount,
        AttributeId::Linkcount,
        AttributeId::Md5,
        AttributeId::Sha1,
        AttributeId::Rmd160,
        AttributeId::Tiger,
        AttributeId::Crc32,
        AttributeId::Crc32b,
        AttributeId::Haval,
        AttributeId::Gost,
        AttributeId::Sha256,
        AttributeId::Sha512,
        AttributeId::Whirlpool,
        AttributeId::Attr,
        AttributeId::Acl,
        AttributeId::Xattrs,
        AttributeId::Selinux,
        AttributeId::E2fsattrs,
        AttributeId::Capabilities,
    ];

    /// Catalog index of this attribute.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Catalog entry for this attribute.
    pub fn descriptor(self) -> &'static AttributeDescriptor {
        &CATALOG[self.index()]
    }

    /// On-disk name.
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Value kind.
    pub fn kind(self) -> AttrKind {
        self.descriptor().kind
    }

    /// Mask bit owned by this attribute.
    pub fn bit(self) -> AttrMask {
        AttrMask(1u64 << self.index())
    }

    /// Look up an attribute by its on-disk name (case-sensitive, exact).
    pub fn from_name(name: &str) -> Option<AttributeId> {
        CATALOG.iter().find(|d| d.name == name).map(|d| d.id)
    }

    /// Attribute owning catalog index `index`.
    pub fn from_index(index: usize) -> Option<AttributeId> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of catalog attributes, one bit per attribute id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttrMask(pub u64);

impl AttrMask {
    /// The empty set.
    pub const EMPTY: AttrMask = AttrMask(0);

    /// Every catalog attribute.
    pub fn all() -> Self {
        AttrMask((1u64 << AttributeId::COUNT) - 1)
    }

    /// Build a mask from a list of attributes.
    pub fn of(ids: &[AttributeId]) -> Self {
        ids.iter().fold(AttrMask::EMPTY, |m, id| m | id.bit())
    }

    /// Raw bits.
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Whether `id` is a member.
    pub fn contains(self, id: AttributeId) -> bool {
        self.0 & id.bit().0 != 0
    }

    /// Add `id`.
    pub fn insert(&mut self, id: AttributeId) {
        self.0 |= id.bit().0;
    }

    /// Whether no attribute is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in catalog order. Bits outside the catalog are ignored.
    pub fn iter(self) -> impl Iterator<Item = AttributeId> {
        AttributeId::ALL.into_iter().filter(move |id| self.contains(*id))
    }
}

impl BitOr for AttrMask {
    type Output = AttrMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        AttrMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for AttrMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AttrMask {
    type Output = AttrMask;

    fn bitand(self, rhs: Self) -> Self::Output {
        AttrMask(self.0 & rhs.0)
    }
}

impl Not for AttrMask {
    type Output = AttrMask;

    fn not(self) -> Self::Output {
        AttrMask(!self.0 & AttrMask::all().0)
    }
}

impl FromIterator<AttributeId> for AttrMask {
    fn from_iter<T: IntoIterator<Item = AttributeId>>(iter: T) -> Self {
        iter.into_iter().fold(AttrMask::EMPTY, |m, id| m | id.bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_indexed_by_id() {
        for (i, d) in CATALOG.iter().enumerate() {
            assert_eq!(d.id.index(), i, "catalog entry {} out of place", d.name);
            assert_eq!(AttributeId::ALL[i], d.id);
        }
    }

    #[test]
    fn test_names_are_unique() {
        for a in CATALOG.iter() {
            let count = CATALOG.iter().filter(|b| b.name == a.name).count();
            assert_eq!(count, 1, "duplicate name {}", a.name);
        }
    }

    #[test]
    fn test_lookup_is_exact_and_case_sensitive() {
        assert_eq!(AttributeId::from_name("md5"), Some(AttributeId::Md5));
        assert_eq!(AttributeId::from_name("caps"), Some(AttributeId::Capabilities));
        assert_eq!(AttributeId::from_name("MD5"), None);
        assert_eq!(AttributeId::from_name("md"), None);
        assert_eq!(AttributeId::from_name(""), None);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(AttributeId::Filename.kind(), AttrKind::String);
        assert_eq!(AttributeId::Perm.kind(), AttrKind::Octal);
        assert_eq!(AttributeId::Mtime.kind(), AttrKind::Time);
        assert_eq!(AttributeId::Sha512.kind(), AttrKind::HashDigest);
        assert_eq!(AttributeId::Attr.kind(), AttrKind::LongInteger);
        assert!(AttrKind::SecurityContext.is_binary());
        assert!(!AttrKind::Acl.is_binary());
    }

    #[test]
    fn test_mask_ops() {
        let mask = AttrMask::of(&[AttributeId::Filename, AttributeId::Md5]);
        assert!(mask.contains(AttributeId::Filename));
        assert!(mask.contains(AttributeId::Md5));
        assert!(!mask.contains(AttributeId::Sha1));
        assert_eq!(mask.bits(), 1 | (1 << 12));

        let ids: Vec<_> = mask.iter().collect();
        assert_eq!(ids, vec![AttributeId::Filename, AttributeId::Md5]);

        let inverted = !mask;
        assert!(!inverted.contains(AttributeId::Md5));
        assert!(inverted.contains(AttributeId::Sha1));
        assert_eq!((inverted | mask), AttrMask::all());
    }

    #[test]
    fn test_iter_ignores_foreign_bits() {
        let mask = AttrMask(u64::MAX);
        assert_eq!(mask.iter().count(), AttributeId::COUNT);
    }
}
