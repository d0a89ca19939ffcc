//! File metadata records
//!
//! A [`Record`] is a sparse map from [`AttributeId`] to a typed [`FieldValue`].
//! Each field is in one of three states:
//!
//! - absent: the attribute is not in the map
//! - present but empty: e.g. `Text("")`, distinct from absent for strings
//! - present with a value
//!
//! Binary payloads own their buffers. Empty binary payloads, empty xattr
//! lists and ACLs with neither portion carry no information on disk, so
//! [`Record::insert`] stores them as absent.

use crate::attribute::{AttrKind, AttrMask, AttributeId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Representation tag of an ACL blob.
///
/// ACL payloads are opaque and not normalized across platforms; the tag
/// records which representation produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclFormat {
    /// POSIX.1e text form
    Posix,
}

impl AclFormat {
    /// Tag written on disk.
    pub fn tag(self) -> &'static str {
        match self {
            AclFormat::Posix => "POSIX",
        }
    }

    /// Parse an on-disk tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "POSIX" => Some(AclFormat::Posix),
            _ => None,
        }
    }
}

/// Opaque ACL with access and default portions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// Representation tag
    pub format: AclFormat,
    /// Access ACL bytes
    pub access: Option<Vec<u8>>,
    /// Default ACL bytes (directories only)
    pub default: Option<Vec<u8>>,
}

impl Acl {
    /// POSIX ACL from its two portions.
    pub fn posix(access: Option<Vec<u8>>, default: Option<Vec<u8>>) -> Self {
        Acl {
            format: AclFormat::Posix,
            access,
            default,
        }
    }

    fn normalized(mut self) -> Option<Self> {
        self.access = self.access.filter(|a| !a.is_empty());
        self.default = self.default.filter(|d| !d.is_empty());
        if self.access.is_none() && self.default.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

/// One extended attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xattr {
    /// Attribute name, e.g. `user.comment`
    pub key: String,
    /// Raw value
    pub value: Vec<u8>,
}

impl Xattr {
    /// Create an xattr entry.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Xattr {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Typed value of one record field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// `String` attributes
    Text(String),
    /// `Integer` and `LongInteger` attributes
    Integer(i64),
    /// `Time` attributes, seconds since the epoch
    Time(i64),
    /// `Octal` attributes
    Mode(u32),
    /// `HashDigest`, `SecurityContext` and `Capabilities` attributes
    Bytes(Vec<u8>),
    /// `Acl` attributes
    Acl(Acl),
    /// `XattrSet` attributes
    Xattrs(Vec<Xattr>),
}

impl FieldValue {
    /// Whether this value may be stored under an attribute of `kind`.
    pub fn fits(&self, kind: AttrKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Text(_), AttrKind::String)
                | (FieldValue::Integer(_), AttrKind::Integer | AttrKind::LongInteger)
                | (FieldValue::Time(_), AttrKind::Time)
                | (FieldValue::Mode(_), AttrKind::Octal)
                | (
                    FieldValue::Bytes(_),
                    AttrKind::HashDigest | AttrKind::SecurityContext | AttrKind::Capabilities
                )
                | (FieldValue::Acl(_), AttrKind::Acl)
                | (FieldValue::Xattrs(_), AttrKind::XattrSet)
        )
    }

    /// `None` for values that are indistinguishable from absence on disk.
    fn normalized(self) -> Option<Self> {
        match self {
            FieldValue::Bytes(b) if b.is_empty() => None,
            FieldValue::Xattrs(x) if x.is_empty() => None,
            FieldValue::Acl(acl) => acl.normalized().map(FieldValue::Acl),
            other => Some(other),
        }
    }
}

/// One file entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    fields: BTreeMap<AttributeId, FieldValue>,
}

impl Record {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `id`.
    ///
    /// Fails if the value variant does not fit the attribute's kind.
    pub fn insert(&mut self, id: AttributeId, value: FieldValue) -> Result<()> {
        if !value.fits(id.kind()) {
            return Err(Error::invalid_operation(format!(
                "value {:?} does not fit attribute {} of kind {:?}",
                value,
                id,
                id.kind()
            )));
        }
        match value.normalized() {
            Some(v) => {
                self.fields.insert(id, v);
            }
            None => {
                self.fields.remove(&id);
            }
        }
        Ok(())
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, id: AttributeId, value: FieldValue) -> Result<Self> {
        self.insert(id, value)?;
        Ok(self)
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, id: AttributeId) -> Option<FieldValue> {
        self.fields.remove(&id)
    }

    /// Value stored under `id`.
    pub fn get(&self, id: AttributeId) -> Option<&FieldValue> {
        self.fields.get(&id)
    }

    /// Whether `id` is present.
    pub fn contains(&self, id: AttributeId) -> bool {
        self.fields.contains_key(&id)
    }

    /// Text of a `String` attribute.
    pub fn text(&self, id: AttributeId) -> Option<&str> {
        match self.fields.get(&id) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Value of an `Integer`/`LongInteger` attribute.
    pub fn integer(&self, id: AttributeId) -> Option<i64> {
        match self.fields.get(&id) {
            Some(FieldValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    /// Value of a `Time` attribute.
    pub fn time(&self, id: AttributeId) -> Option<i64> {
        match self.fields.get(&id) {
            Some(FieldValue::Time(v)) => Some(*v),
            _ => None,
        }
    }

    /// Bytes of a binary attribute.
    pub fn bytes(&self, id: AttributeId) -> Option<&[u8]> {
        match self.fields.get(&id) {
            Some(FieldValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    /// Fields in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (AttributeId, &FieldValue)> {
        self.fields.iter().map(|(id, v)| (*id, v))
    }

    /// Number of present fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Mask of present fields.
    pub fn present_mask(&self) -> AttrMask {
        self.fields.keys().copied().collect()
    }

    /// The record's own attribute mask.
    ///
    /// This is the explicit `attr` field when set, otherwise the mask of
    /// present fields.
    pub fn attr_mask(&self) -> AttrMask {
        match self.fields.get(&AttributeId::Attr) {
            Some(FieldValue::Integer(bits)) => AttrMask(*bits as u64),
            _ => self.present_mask(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_checks_kind() {
        let mut record = Record::new();
        assert!(record
            .insert(AttributeId::Filename, FieldValue::Text("/etc".into()))
            .is_ok());
        let err = record
            .insert(AttributeId::Filename, FieldValue::Integer(3))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert!(record
            .insert(AttributeId::Mtime, FieldValue::Integer(3))
            .is_err());
        assert!(record.insert(AttributeId::Size, FieldValue::Integer(3)).is_ok());
    }

    #[test]
    fn test_three_states_for_text() {
        let mut record = Record::new();
        assert_eq!(record.text(AttributeId::Linkname), None);
        record
            .insert(AttributeId::Linkname, FieldValue::Text(String::new()))
            .unwrap();
        assert_eq!(record.text(AttributeId::Linkname), Some(""));
        assert!(record.contains(AttributeId::Linkname));
    }

    #[test]
    fn test_empty_binary_is_absent() {
        let mut record = Record::new();
        record
            .insert(AttributeId::Md5, FieldValue::Bytes(vec![1, 2]))
            .unwrap();
        record.insert(AttributeId::Md5, FieldValue::Bytes(vec![])).unwrap();
        assert!(!record.contains(AttributeId::Md5));

        record
            .insert(AttributeId::Xattrs, FieldValue::Xattrs(vec![]))
            .unwrap();
        assert!(!record.contains(AttributeId::Xattrs));

        record
            .insert(AttributeId::Acl, FieldValue::Acl(Acl::posix(Some(vec![]), None)))
            .unwrap();
        assert!(!record.contains(AttributeId::Acl));
    }

    #[test]
    fn test_attr_mask_prefers_explicit_field() {
        let record = Record::new()
            .with(AttributeId::Filename, FieldValue::Text("/bin".into()))
            .unwrap()
            .with(AttributeId::Md5, FieldValue::Bytes(vec![0xaa]))
            .unwrap();
        assert_eq!(
            record.attr_mask(),
            AttrMask::of(&[AttributeId::Filename, AttributeId::Md5])
        );

        let explicit = record
            .with(
                AttributeId::Attr,
                FieldValue::Integer(AttributeId::Filename.bit().bits() as i64),
            )
            .unwrap();
        assert_eq!(explicit.attr_mask(), AttributeId::Filename.bit());
    }

    #[test]
    fn test_iter_is_catalog_ordered() {
        let record = Record::new()
            .with(AttributeId::Sha256, FieldValue::Bytes(vec![1]))
            .unwrap()
            .with(AttributeId::Filename, FieldValue::Text("/a".into()))
            .unwrap()
            .with(AttributeId::Perm, FieldValue::Mode(0o755))
            .unwrap();
        let ids: Vec<_> = record.iter().map(|(id, _)| id).collect();
        assert_eq!(
            ids,
            vec![AttributeId::Filename, AttributeId::Perm, AttributeId::Sha256]
        );
    }

    #[test]
    fn test_record_serde_json() {
        let record = Record::new()
            .with(AttributeId::Filename, FieldValue::Text("/etc/hosts".into()))
            .unwrap()
            .with(
                AttributeId::Xattrs,
                FieldValue::Xattrs(vec![Xattr::new("user.a", b"1".to_vec())]),
            )
            .unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
