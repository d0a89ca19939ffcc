//! Schema negotiation.
//!
//! A `@@db_spec` line fixes the position of every field on the record lines
//! that follow:
//!
//! ```text
//! @@db_spec filename perm mtime md5
//! ```
//!
//! Names are looked up in the attribute catalog. Unknown names and repeated
//! names still occupy a slot (so positions stay aligned) but their values are
//! discarded. When no `attr` field is declared, the record attribute mask is
//! derived from the declared fields.

use crate::diagnostic::{DiagnosticKind, Diagnostics};
use crate::scanner::{TokenKind, TokenSource, DB_SPEC};
use fimdb_core::{AttrMask, AttributeId, Error, Result};
use tracing::debug;

/// One field position of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A catalog attribute
    Known(AttributeId),
    /// Unknown or duplicate name; value is read and dropped
    Unknown,
}

impl Slot {
    /// The attribute for a known slot.
    pub fn attribute(self) -> Option<AttributeId> {
        match self {
            Slot::Known(id) => Some(id),
            Slot::Unknown => None,
        }
    }
}

/// Ordered field layout of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    slots: Vec<Slot>,
    seen_mask: AttrMask,
    derived_mask: Option<AttrMask>,
}

impl Schema {
    /// Schema listing every attribute of `mask` in catalog order.
    pub fn from_mask(mask: AttrMask) -> Self {
        let mut builder = SchemaBuilder::default();
        for id in mask.iter() {
            builder.assign(id);
        }
        builder.build()
    }

    /// Slots in file order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of tokens expected on every record line.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Attributes assigned to a slot.
    pub fn seen_mask(&self) -> AttrMask {
        self.seen_mask
    }

    /// Whether an explicit `attr` field is declared.
    pub fn has_attr_field(&self) -> bool {
        self.seen_mask.contains(AttributeId::Attr)
    }

    /// Attribute mask to use for records when no `attr` field is declared.
    ///
    /// `None` when the per-record `attr` value is authoritative.
    pub fn derived_mask(&self) -> Option<AttrMask> {
        self.derived_mask
    }

    /// The declaration line, including its terminator.
    pub fn declaration(&self) -> String {
        let mut line = format!("{} ", DB_SPEC);
        for id in self.slots.iter().filter_map(|s| s.attribute()) {
            line.push_str(id.name());
            line.push(' ');
        }
        line.push('\n');
        line
    }
}

#[derive(Default)]
struct SchemaBuilder {
    slots: Vec<Slot>,
    seen_mask: AttrMask,
}

impl SchemaBuilder {
    fn assign(&mut self, id: AttributeId) -> bool {
        if self.seen_mask.contains(id) {
            self.slots.push(Slot::Unknown);
            false
        } else {
            self.seen_mask.insert(id);
            self.slots.push(Slot::Known(id));
            true
        }
    }

    fn push_name(&mut self, name: &str, line: u64, diagnostics: &mut Diagnostics) {
        match AttributeId::from_name(name) {
            Some(id) => {
                if !self.assign(id) {
                    diagnostics.report(line, DiagnosticKind::DuplicateField(name.to_string()));
                }
            }
            None => {
                self.slots.push(Slot::Unknown);
                diagnostics.report(line, DiagnosticKind::UnknownField(name.to_string()));
            }
        }
    }

    fn build(self) -> Schema {
        let derived_mask = if self.seen_mask.contains(AttributeId::Attr) {
            None
        } else {
            Some(self.seen_mask)
        };
        Schema {
            slots: self.slots,
            seen_mask: self.seen_mask,
            derived_mask,
        }
    }
}

/// Read the field names of a `@@db_spec` line.
///
/// The `@@db_spec` keyword itself has already been consumed; this reads up
/// to and including the line terminator.
pub fn parse_schema<S: TokenSource>(source: &mut S, diagnostics: &mut Diagnostics) -> Result<Schema> {
    let mut builder = SchemaBuilder::default();
    loop {
        let token = source.next_token()?;
        match token.kind {
            TokenKind::Newline => break,
            TokenKind::Identifier => builder.push_name(&token.text, token.line, diagnostics),
            TokenKind::DbSpec => {
                return Err(Error::malformed_schema(
                    token.line,
                    "only one @@db_spec allowed",
                ))
            }
            TokenKind::Eof => {
                return Err(Error::malformed_schema(
                    token.line,
                    "stream ends inside @@db_spec",
                ))
            }
            other => {
                return Err(Error::malformed_schema(
                    token.line,
                    format!("unexpected {:?} '{}' in @@db_spec", other, token.text),
                ))
            }
        }
    }

    let schema = builder.build();
    if schema.derived_mask.is_some() {
        diagnostics.report(source.line(), DiagnosticKind::MissingAttrField);
    }
    debug!(target: "fimdb::db", slots = schema.len(), "Parsed @@db_spec");
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn parse(line: &str) -> (Result<Schema>, Diagnostics) {
        let mut scanner = Scanner::new(line.as_bytes());
        let mut diags = Diagnostics::default();
        let result = parse_schema(&mut scanner, &mut diags);
        (result, diags)
    }

    #[test]
    fn test_simple_schema() {
        let (schema, diags) = parse("filename mtime md5 attr\n");
        let schema = schema.unwrap();
        assert_eq!(
            schema.slots(),
            &[
                Slot::Known(AttributeId::Filename),
                Slot::Known(AttributeId::Mtime),
                Slot::Known(AttributeId::Md5),
                Slot::Known(AttributeId::Attr),
            ]
        );
        assert!(schema.has_attr_field());
        assert_eq!(schema.derived_mask(), None);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unknown_field_keeps_position() {
        let (schema, diags) = parse("filename bogus md5 attr\n");
        let schema = schema.unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.slots()[1], Slot::Unknown);
        assert_eq!(
            diags.as_slice()[0].kind,
            DiagnosticKind::UnknownField("bogus".into())
        );
    }

    #[test]
    fn test_duplicate_field_is_demoted() {
        let (schema, diags) = parse("filename md5 md5 attr\n");
        let schema = schema.unwrap();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.slots()[1], Slot::Known(AttributeId::Md5));
        assert_eq!(schema.slots()[2], Slot::Unknown);
        assert_eq!(
            diags.as_slice()[0].kind,
            DiagnosticKind::DuplicateField("md5".into())
        );
    }

    #[test]
    fn test_missing_attr_derives_mask() {
        let (schema, diags) = parse("filename mtime md5\n");
        let schema = schema.unwrap();
        assert_eq!(
            schema.derived_mask(),
            Some(AttrMask::of(&[
                AttributeId::Filename,
                AttributeId::Mtime,
                AttributeId::Md5
            ]))
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.as_slice()[0].kind, DiagnosticKind::MissingAttrField);
    }

    #[test]
    fn test_second_db_spec_is_fatal() {
        let (result, _) = parse("filename @@db_spec md5\n");
        assert!(matches!(result, Err(Error::MalformedSchema { .. })));
    }

    #[test]
    fn test_unexpected_tokens_are_fatal() {
        let (result, _) = parse("filename @@begin_db\n");
        assert!(matches!(result, Err(Error::MalformedSchema { .. })));
        let (result, _) = parse("filename md5");
        assert!(matches!(result, Err(Error::MalformedSchema { .. })));
        let (result, _) = parse("filename @@weird\n");
        assert!(matches!(result, Err(Error::MalformedSchema { .. })));
    }

    #[test]
    fn test_from_mask_is_catalog_ordered() {
        let schema = Schema::from_mask(AttrMask::of(&[
            AttributeId::Md5,
            AttributeId::Filename,
            AttributeId::Mtime,
        ]));
        assert_eq!(schema.declaration(), "@@db_spec filename mtime md5 \n");
        assert_eq!(schema.len(), 3);
    }
}
