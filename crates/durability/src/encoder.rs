//! Record encoding.
//!
//! A record line lists the attributes of the output mask in catalog order,
//! separated by single spaces. Attributes outside the mask are not written at
//! all. The `attr` field always carries the record's effective attribute mask
//! so that readers know which digests were computed.

use crate::field::encode_field;
use crate::integrity::{ChangeDigest, DigestAccumulator};
use crate::sink::SinkAdapter;
use fimdb_core::{AttrMask, AttributeId, FieldValue, Record, Result};
use std::io::Write;

/// Format one record line, including its terminator.
pub fn format_record(record: &Record, output_mask: AttrMask) -> Result<String> {
    let record_mask = record.attr_mask();
    let attr_value = FieldValue::Integer(record_mask.bits() as i64);
    let mut line = String::new();
    for (position, id) in output_mask.iter().enumerate() {
        let value = match id {
            AttributeId::Attr => Some(&attr_value),
            _ => record.get(id),
        };
        if position > 0 {
            line.push(' ');
        }
        line.push_str(&encode_field(id, value, record_mask, position == 0)?);
    }
    line.push('\n');
    Ok(line)
}

/// Encode `record` to `sink`, feeding the written bytes to the digests.
///
/// Returns the number of bytes written.
pub fn encode_record<W: Write>(
    record: &Record,
    output_mask: AttrMask,
    sink: &mut SinkAdapter<W>,
    digest: &mut DigestAccumulator,
    change: Option<&mut ChangeDigest>,
) -> Result<usize> {
    let line = format_record(record, output_mask)?;
    digest.update(line.as_bytes())?;
    if let Some(change) = change {
        change.update(line.as_bytes());
    }
    let written = sink.write(line.as_bytes())?;
    sink.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::HmacAlgorithm;
    use crate::sink::Compression;
    use fimdb_core::Xattr;

    fn sample() -> Record {
        Record::new()
            .with(AttributeId::Filename, FieldValue::Text("/etc/passwd".into()))
            .unwrap()
            .with(AttributeId::Mtime, FieldValue::Time(1_600_000_000))
            .unwrap()
            .with(AttributeId::Md5, FieldValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]))
            .unwrap()
    }

    #[test]
    fn test_catalog_order_regardless_of_insert_order() {
        let mask = AttrMask::of(&[AttributeId::Md5, AttributeId::Mtime, AttributeId::Filename]);
        let line = format_record(&sample(), mask).unwrap();
        assert_eq!(line, "/etc/passwd MTYwMDAwMDAwMA== 3q2+7w==\n");
    }

    #[test]
    fn test_unmasked_attributes_are_skipped() {
        let mask = AttrMask::of(&[AttributeId::Filename, AttributeId::Uid]);
        let line = format_record(&sample(), mask).unwrap();
        assert_eq!(line, "/etc/passwd 0\n");
    }

    #[test]
    fn test_attr_field_carries_effective_mask() {
        let record = sample();
        let mask = AttrMask::of(&[AttributeId::Filename, AttributeId::Md5, AttributeId::Attr]);
        let line = format_record(&record, mask).unwrap();
        let expected_attr = record.present_mask().bits();
        assert_eq!(line, format!("/etc/passwd 3q2+7w== {}\n", expected_attr));
    }

    #[test]
    fn test_digest_gated_by_explicit_attr() {
        let record = sample()
            .with(
                AttributeId::Attr,
                FieldValue::Integer(AttributeId::Filename.bit().bits() as i64),
            )
            .unwrap();
        let mask = AttrMask::of(&[AttributeId::Filename, AttributeId::Md5]);
        assert_eq!(format_record(&record, mask).unwrap(), "/etc/passwd 0\n");
    }

    #[test]
    fn test_first_field_hash_is_escaped() {
        let record = Record::new()
            .with(AttributeId::Filename, FieldValue::Text("#tmp".into()))
            .unwrap()
            .with(AttributeId::Linkname, FieldValue::Text("#tmp".into()))
            .unwrap();
        let mask = AttrMask::of(&[AttributeId::Filename, AttributeId::Linkname]);
        assert_eq!(format_record(&record, mask).unwrap(), "%23tmp #tmp\n");
    }

    #[test]
    fn test_xattr_field() {
        let record = Record::new()
            .with(
                AttributeId::Xattrs,
                FieldValue::Xattrs(vec![Xattr::new("user.a", b"x".to_vec())]),
            )
            .unwrap();
        let mask = AttrMask::of(&[AttributeId::Filename, AttributeId::Xattrs]);
        assert_eq!(format_record(&record, mask).unwrap(), "0 1,user.a,eA==\n");
    }

    #[test]
    fn test_encode_feeds_digests() {
        let mut sink = SinkAdapter::new(Vec::new(), Compression::None).unwrap();
        let mut digest = DigestAccumulator::new(HmacAlgorithm::Sha256);
        digest.activate(b"k").unwrap();
        let mut change = ChangeDigest::new();
        let mask = AttrMask::of(&[AttributeId::Filename, AttributeId::Mtime, AttributeId::Md5]);

        let written =
            encode_record(&sample(), mask, &mut sink, &mut digest, Some(&mut change)).unwrap();
        let bytes = sink.close().unwrap();
        assert_eq!(written, bytes.len());
        assert_eq!(digest.bytes_fed(), bytes.len() as u64);

        let mut expected = ChangeDigest::new();
        expected.update(&bytes);
        assert_eq!(change.hex(), expected.hex());
    }
}
