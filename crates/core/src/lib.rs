//! Core types for fimdb
//!
//! This crate defines the data model shared by the database codec:
//! - AttributeId / AttrKind / AttrMask: the attribute catalog
//! - Record / FieldValue: typed, sparse file metadata records
//! - Error / FieldError: fatal and field-level error types

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute;
pub mod error;
pub mod record;

pub use attribute::{AttrKind, AttrMask, AttributeDescriptor, AttributeId, CATALOG};
pub use error::{Error, FieldError, Result};
pub use record::{Acl, AclFormat, FieldValue, Record, Xattr};
