//! Per-kind field text codec.
//!
//! Each record field is one space-free token. The rules per [`AttrKind`]:
//!
//! | kind                     | absent | value                                   |
//! |--------------------------|--------|-----------------------------------------|
//! | String                   | `0`    | `0-` if empty, `0<escaped>` if it starts with `0`, else `<escaped>` |
//! | Integer / LongInteger    | `0`    | signed decimal                          |
//! | Octal                    | `0`    | unsigned octal                          |
//! | Time                     | `0`    | base64 of the decimal seconds           |
//! | HashDigest               | `0`    | base64, only if the record's mask has the bit |
//! | SecurityContext / Capabilities | `0` | base64                              |
//! | XattrSet                 | `0`    | `<n>` then `,<key>,<base64 value>` per entry |
//! | Acl                      | `0`    | `POSIX,<access>,<default>` (each base64 or `0`) |
//!
//! String escaping is `%XX` for bytes outside printable ASCII and for `%` and
//! `,`. A `#` opening the first field of a line is escaped too, since the
//! scanner would read the line as a comment, and so is a leading `@`, which
//! would read as a table keyword.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use fimdb_core::{
    Acl, AclFormat, AttrKind, AttrMask, AttributeId, Error, FieldError, FieldValue, Result, Xattr,
};

/// Token written for an absent field.
pub const ABSENT: &str = "0";
/// Token written for an empty string.
pub const EMPTY_STRING: &str = "0-";

fn needs_escape(b: u8) -> bool {
    !(0x21..=0x7e).contains(&b) || b == b'%' || b == b','
}

/// Escape text so it contains no separators.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        if needs_escape(b) {
            out.push_str(&format!("%{:02X}", b));
        } else {
            out.push(b as char);
        }
    }
    out
}

/// Reverse [`escape`].
pub fn unescape(text: &str) -> std::result::Result<String, FieldError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| FieldError::Escape(text.to_string()))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| FieldError::Utf8)
}

/// Encode an optional string field.
pub fn encode_text(value: Option<&str>, first: bool) -> String {
    match value {
        None => ABSENT.to_string(),
        Some("") => EMPTY_STRING.to_string(),
        Some(s) if s.starts_with('0') => format!("0{}", escape(s)),
        Some(s) => {
            let mut out = escape(s);
            match out.as_bytes().first() {
                Some(b'@') => out.replace_range(0..1, "%40"),
                Some(b'#') if first => out.replace_range(0..1, "%23"),
                _ => {}
            }
            out
        }
    }
}

/// Decode a string field token.
pub fn decode_text(token: &str) -> std::result::Result<Option<String>, FieldError> {
    match token {
        ABSENT => Ok(None),
        EMPTY_STRING => Ok(Some(String::new())),
        t if t.starts_with('0') => unescape(&t[1..]).map(Some),
        t => unescape(t).map(Some),
    }
}

fn encode_bytes(bytes: Option<&[u8]>) -> String {
    match bytes {
        Some(b) if !b.is_empty() => BASE64.encode(b),
        _ => ABSENT.to_string(),
    }
}

fn decode_bytes(token: &str) -> std::result::Result<Option<Vec<u8>>, FieldError> {
    if token == ABSENT {
        return Ok(None);
    }
    let bytes = BASE64
        .decode(token)
        .map_err(|e| FieldError::Base64(e.to_string()))?;
    Ok(Some(bytes).filter(|b| !b.is_empty()))
}

fn mismatch(id: AttributeId, value: &FieldValue) -> Error {
    Error::invalid_operation(format!(
        "cannot encode {:?} as {} ({:?})",
        value,
        id,
        id.kind()
    ))
}

/// Encode one field.
///
/// `record_mask` is the record's own attribute mask; hash digests are only
/// written when it contains the digest's bit. `first` marks the first field
/// of the line.
pub fn encode_field(
    id: AttributeId,
    value: Option<&FieldValue>,
    record_mask: AttrMask,
    first: bool,
) -> Result<String> {
    let text = match (id.kind(), value) {
        (_, None) => ABSENT.to_string(),
        (AttrKind::String, Some(FieldValue::Text(s))) => encode_text(Some(s), first),
        (AttrKind::Integer | AttrKind::LongInteger, Some(FieldValue::Integer(v))) => v.to_string(),
        (AttrKind::Octal, Some(FieldValue::Mode(m))) => format!("{:o}", m),
        (AttrKind::Time, Some(FieldValue::Time(0))) => ABSENT.to_string(),
        (AttrKind::Time, Some(FieldValue::Time(t))) => BASE64.encode(t.to_string()),
        (AttrKind::HashDigest, Some(FieldValue::Bytes(b))) => {
            if record_mask.contains(id) {
                encode_bytes(Some(b))
            } else {
                ABSENT.to_string()
            }
        }
        (AttrKind::SecurityContext | AttrKind::Capabilities, Some(FieldValue::Bytes(b))) => {
            encode_bytes(Some(b))
        }
        (AttrKind::XattrSet, Some(FieldValue::Xattrs(entries))) => {
            let mut out = entries.len().to_string();
            for entry in entries {
                out.push(',');
                out.push_str(&encode_text(Some(&entry.key), false));
                out.push(',');
                out.push_str(&encode_bytes(Some(&entry.value)));
            }
            out
        }
        // ACL blobs are opaque and not portable between implementations.
        (AttrKind::Acl, Some(FieldValue::Acl(acl))) => format!(
            "{},{},{}",
            acl.format.tag(),
            encode_bytes(acl.access.as_deref()),
            encode_bytes(acl.default.as_deref())
        ),
        (_, Some(other)) => return Err(mismatch(id, other)),
    };
    Ok(text)
}

/// Decode one field token. `Ok(None)` means the field is absent.
pub fn decode_field(
    id: AttributeId,
    token: &str,
) -> std::result::Result<Option<FieldValue>, FieldError> {
    let kind = id.kind();
    match kind {
        AttrKind::String => Ok(decode_text(token)?.map(FieldValue::Text)),
        AttrKind::Integer | AttrKind::LongInteger => canonical_number(token)
            .and_then(|t| t.parse::<i64>().ok())
            .map(|v| Some(FieldValue::Integer(v)))
            .ok_or_else(|| FieldError::Number(token.to_string())),
        AttrKind::Octal => canonical_number(token)
            .and_then(|t| u32::from_str_radix(t, 8).ok())
            .map(|m| Some(FieldValue::Mode(m)))
            .ok_or_else(|| FieldError::Number(token.to_string())),
        AttrKind::Time => {
            if token == ABSENT {
                return Ok(Some(FieldValue::Time(0)));
            }
            let decoded = BASE64
                .decode(token)
                .map_err(|e| FieldError::Base64(e.to_string()))?;
            let text = String::from_utf8(decoded).map_err(|_| FieldError::Utf8)?;
            canonical_number(&text)
                .and_then(|t| t.parse::<i64>().ok())
                .map(|t| Some(FieldValue::Time(t)))
                .ok_or(FieldError::Number(text))
        }
        AttrKind::HashDigest | AttrKind::SecurityContext | AttrKind::Capabilities => {
            Ok(decode_bytes(token)?.map(FieldValue::Bytes))
        }
        AttrKind::XattrSet => decode_xattrs(token),
        AttrKind::Acl => decode_acl(token),
    }
}

/// Accept only what the encoder writes: digits with an optional leading `-`.
fn canonical_number(token: &str) -> Option<&str> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(token)
    } else {
        None
    }
}

fn decode_xattrs(token: &str) -> std::result::Result<Option<FieldValue>, FieldError> {
    let mut parts = token.split(',');
    let count_text = parts.next().unwrap_or_default();
    let count = canonical_number(count_text)
        .and_then(|t| t.parse::<usize>().ok())
        .ok_or_else(|| FieldError::Number(count_text.to_string()))?;
    let rest: Vec<&str> = parts.collect();
    if count.checked_mul(2) != Some(rest.len()) {
        return Err(FieldError::shape(
            AttrKind::XattrSet,
            format!("{} entries declared, {} values present", count, rest.len()),
        ));
    }
    let mut entries = Vec::with_capacity(count);
    for pair in rest.chunks(2) {
        let key = decode_text(pair[0])?
            .ok_or_else(|| FieldError::shape(AttrKind::XattrSet, "entry without key"))?;
        let value = decode_bytes(pair[1])?.unwrap_or_default();
        entries.push(Xattr { key, value });
    }
    if entries.is_empty() {
        Ok(None)
    } else {
        Ok(Some(FieldValue::Xattrs(entries)))
    }
}

fn decode_acl(token: &str) -> std::result::Result<Option<FieldValue>, FieldError> {
    if token == ABSENT {
        return Ok(None);
    }
    let parts: Vec<&str> = token.split(',').collect();
    let [tag, access, default] = parts.as_slice() else {
        return Err(FieldError::shape(
            AttrKind::Acl,
            format!("expected 3 comma-separated parts, got {}", parts.len()),
        ));
    };
    let format = AclFormat::from_tag(tag)
        .ok_or_else(|| FieldError::shape(AttrKind::Acl, format!("unknown tag '{}'", tag)))?;
    let acl = Acl {
        format,
        access: decode_bytes(access)?,
        default: decode_bytes(default)?,
    };
    if acl.access.is_none() && acl.default.is_none() {
        Ok(None)
    } else {
        Ok(Some(FieldValue::Acl(acl)))
    }
}
