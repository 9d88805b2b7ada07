//! AMQP 0-9-1 field values, field tables and the two string forms.
//!
//! Encoding appends to a `Vec<u8>`. Decoding pulls from any [`Read`], so the
//! same functions work on a frame payload cursor and on the bounded
//! sub-readers used for field arrays.

use crate::constants::MAX_FIELD_NESTING;
use crate::error::{AmqpError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::{self, Read};

/// Field tables are keyed by short strings; the wire order carries no meaning.
pub type FieldTable = BTreeMap<String, FieldValue>;

/// Scale is the number of decimal digits: `scale = 2, value = 12345` is 123.45.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub scale: u8,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Octet(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    LongString(Vec<u8>),
    /// Seconds since the Unix epoch. Any `i64` is a valid timestamp on the wire.
    Timestamp(i64),
    ByteArray(Vec<u8>),
    Array(Vec<FieldValue>),
    Table(FieldTable),
    Void,
}

mod tags {
    pub const BOOL: u8 = b't';
    pub const OCTET: u8 = b'b';
    pub const I16: u8 = b's';
    pub const I32: u8 = b'I';
    pub const I64: u8 = b'l';
    pub const F32: u8 = b'f';
    pub const F64: u8 = b'd';
    pub const DECIMAL: u8 = b'D';
    pub const LONG_STRING: u8 = b'S';
    pub const TIMESTAMP: u8 = b'T';
    pub const BYTE_ARRAY: u8 = b'x';
    pub const ARRAY: u8 = b'A';
    pub const TABLE: u8 = b'F';
    pub const VOID: u8 = b'V';
}

impl FieldValue {
    pub fn tag(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => tags::BOOL,
            FieldValue::Octet(_) => tags::OCTET,
            FieldValue::I16(_) => tags::I16,
            FieldValue::I32(_) => tags::I32,
            FieldValue::I64(_) => tags::I64,
            FieldValue::F32(_) => tags::F32,
            FieldValue::F64(_) => tags::F64,
            FieldValue::Decimal(_) => tags::DECIMAL,
            FieldValue::LongString(_) => tags::LONG_STRING,
            FieldValue::Timestamp(_) => tags::TIMESTAMP,
            FieldValue::ByteArray(_) => tags::BYTE_ARRAY,
            FieldValue::Array(_) => tags::ARRAY,
            FieldValue::Table(_) => tags::TABLE,
            FieldValue::Void => tags::VOID,
        }
    }

    /// `None` for non-timestamps and for seconds outside chrono's range.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(seconds) => DateTime::from_timestamp(*seconds, 0),
            _ => None,
        }
    }
}

/// Sub-second precision is dropped; the wire carries whole seconds.
impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value.timestamp())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(value.as_bytes().to_vec())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(value.into_bytes())
    }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self {
        FieldValue::Table(value)
    }
}

// === READ PRIMITIVES ===

pub(crate) fn read_array<const N: usize>(reader: &mut dyn Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn truncated(what: &str) -> AmqpError {
    AmqpError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("truncated {what}"),
    ))
}

/// Reads `len` bytes without trusting `len` for the allocation size.
fn read_bytes(reader: &mut dyn Read, len: u32, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    Read::take(&mut *reader, u64::from(len)).read_to_end(&mut buf)?;
    if buf.len() != len as usize {
        return Err(truncated(what));
    }
    Ok(buf)
}

/// 32-bit length prefix shared by long strings, byte arrays and field arrays.
/// Lengths with the top bit set are rejected before anything is allocated.
fn read_length(reader: &mut dyn Read, what: &str) -> Result<u32> {
    let len = u32::from_be_bytes(read_array(reader)?);
    if len > i32::MAX as u32 {
        return Err(AmqpError::Decode(format!(
            "{what} length {len} exceeds {}",
            i32::MAX
        )));
    }
    Ok(len)
}

fn write_length(buf: &mut Vec<u8>, len: usize, what: &str) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| AmqpError::Encode(format!("{what} of {len} bytes is too long")))?;
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    Ok(())
}

// === STRINGS ===

pub fn decode_short_string(reader: &mut dyn Read) -> Result<String> {
    let [len] = read_array::<1>(reader)?;
    let bytes = read_bytes(reader, u32::from(len), "short string")?;
    String::from_utf8(bytes)
        .map_err(|e| AmqpError::Decode(format!("short string is not valid UTF-8: {e}")))
}

pub fn encode_short_string(buf: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u8::try_from(value.len()).map_err(|_| {
        AmqpError::Encode(format!(
            "short string of {} bytes exceeds 255",
            value.len()
        ))
    })?;
    buf.push(len);
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

pub fn decode_long_string(reader: &mut dyn Read) -> Result<Vec<u8>> {
    let len = read_length(reader, "long string")?;
    read_bytes(reader, len, "long string")
}

pub fn encode_long_string(buf: &mut Vec<u8>, value: &[u8]) -> Result<()> {
    write_length(buf, value.len(), "long string")?;
    buf.extend_from_slice(value);
    Ok(())
}

// === TABLES ===

/// Decodes (key, value) pairs until the table body is used up. A repeated key
/// keeps the last value seen.
pub fn decode_table(reader: &mut dyn Read) -> Result<FieldTable> {
    decode_table_at(reader, 1)
}

fn check_nesting(depth: usize) -> Result<()> {
    if depth > MAX_FIELD_NESTING {
        return Err(AmqpError::Decode(format!(
            "field values nested deeper than {MAX_FIELD_NESTING} levels"
        )));
    }
    Ok(())
}

fn decode_table_at(reader: &mut dyn Read, depth: usize) -> Result<FieldTable> {
    check_nesting(depth)?;
    let size = read_length(reader, "field table")?;
    let mut bounded = Read::take(&mut *reader, u64::from(size));
    let mut table = FieldTable::new();

    while bounded.limit() > 0 {
        let key = decode_short_string(&mut bounded)?;
        let value = decode_field_at(&mut bounded, depth)?;
        table.insert(key, value);
    }

    Ok(table)
}

pub fn encode_table(buf: &mut Vec<u8>, table: &FieldTable) -> Result<()> {
    let mut body = Vec::new();
    for (key, value) in table {
        encode_short_string(&mut body, key)?;
        encode_field(&mut body, value)?;
    }
    encode_long_string(buf, &body)
}

// === FIELD VALUES ===

pub fn decode_field(reader: &mut dyn Read) -> Result<FieldValue> {
    decode_field_at(reader, 0)
}

/// `depth` counts the tables and arrays enclosing the value.
fn decode_field_at(reader: &mut dyn Read, depth: usize) -> Result<FieldValue> {
    let [tag] = read_array::<1>(reader)?;
    decode_tagged(reader, tag, depth)
}

fn decode_tagged(reader: &mut dyn Read, tag: u8, depth: usize) -> Result<FieldValue> {
    let value = match tag {
        tags::BOOL => {
            let [v] = read_array::<1>(reader)?;
            FieldValue::Bool(v != 0)
        }
        tags::OCTET => {
            let [v] = read_array::<1>(reader)?;
            FieldValue::Octet(v)
        }
        tags::I16 => FieldValue::I16(i16::from_be_bytes(read_array(reader)?)),
        tags::I32 => FieldValue::I32(i32::from_be_bytes(read_array(reader)?)),
        tags::I64 => FieldValue::I64(i64::from_be_bytes(read_array(reader)?)),
        tags::F32 => FieldValue::F32(f32::from_be_bytes(read_array(reader)?)),
        tags::F64 => FieldValue::F64(f64::from_be_bytes(read_array(reader)?)),
        tags::DECIMAL => {
            let [scale] = read_array::<1>(reader)?;
            let value = i32::from_be_bytes(read_array(reader)?);
            FieldValue::Decimal(Decimal { scale, value })
        }
        tags::LONG_STRING => FieldValue::LongString(decode_long_string(reader)?),
        tags::TIMESTAMP => FieldValue::Timestamp(i64::from_be_bytes(read_array(reader)?)),
        tags::BYTE_ARRAY => {
            let len = read_length(reader, "byte array")?;
            FieldValue::ByteArray(read_bytes(reader, len, "byte array")?)
        }
        tags::ARRAY => FieldValue::Array(decode_array(reader, depth + 1)?),
        tags::TABLE => FieldValue::Table(decode_table_at(reader, depth + 1)?),
        tags::VOID => FieldValue::Void,
        other => return Err(AmqpError::UnsupportedFieldType(other)),
    };
    Ok(value)
}

/// The prefix counts bytes, not elements: values are read from a bounded
/// sub-reader until it runs dry.
fn decode_array(reader: &mut dyn Read, depth: usize) -> Result<Vec<FieldValue>> {
    check_nesting(depth)?;
    let size = read_length(reader, "field array")?;
    let mut bounded = Read::take(&mut *reader, u64::from(size));
    let mut values = Vec::new();

    loop {
        let mut tag = [0u8; 1];
        if bounded.read(&mut tag)? == 0 {
            break;
        }
        values.push(decode_tagged(&mut bounded, tag[0], depth)?);
    }

    if bounded.limit() != 0 {
        return Err(truncated("field array"));
    }
    Ok(values)
}

pub fn encode_field(buf: &mut Vec<u8>, value: &FieldValue) -> Result<()> {
    buf.push(value.tag());
    match value {
        FieldValue::Bool(v) => buf.push(u8::from(*v)),
        FieldValue::Octet(v) => buf.push(*v),
        FieldValue::I16(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::I32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::I64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::F32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::F64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::Decimal(d) => {
            buf.push(d.scale);
            buf.extend_from_slice(&d.value.to_be_bytes());
        }
        FieldValue::LongString(s) => encode_long_string(buf, s)?,
        FieldValue::Timestamp(seconds) => buf.extend_from_slice(&seconds.to_be_bytes()),
        FieldValue::ByteArray(bytes) => {
            write_length(buf, bytes.len(), "byte array")?;
            buf.extend_from_slice(bytes);
        }
        FieldValue::Array(values) => {
            let mut body = Vec::new();
            for v in values {
                encode_field(&mut body, v)?;
            }
            write_length(buf, body.len(), "field array")?;
            buf.extend_from_slice(&body);
        }
        FieldValue::Table(table) => encode_table(buf, table)?,
        FieldValue::Void => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded(value: &FieldValue) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_field(&mut buf, value).unwrap();
        buf
    }

    fn decoded(bytes: &[u8]) -> Result<FieldValue> {
        decode_field(&mut Cursor::new(bytes))
    }

    #[test]
    fn every_variant_survives_the_wire() {
        let mut nested = FieldTable::new();
        nested.insert("inner".to_string(), FieldValue::I32(-7));

        let samples = vec![
            FieldValue::Bool(true),
            FieldValue::Octet(0xAB),
            FieldValue::I16(-2),
            FieldValue::I32(i32::MIN),
            FieldValue::I64(1 << 40),
            FieldValue::F32(1.5),
            FieldValue::F64(-0.25),
            FieldValue::Decimal(Decimal {
                scale: 2,
                value: 12345,
            }),
            FieldValue::LongString(vec![0, 159, 146, 150]),
            FieldValue::Timestamp(1_700_000_000),
            FieldValue::ByteArray(vec![1, 2, 3]),
            FieldValue::Array(vec![FieldValue::Void, "x".into(), FieldValue::Bool(false)]),
            FieldValue::Table(nested),
            FieldValue::Void,
        ];

        for value in samples {
            let bytes = encoded(&value);
            assert_eq!(bytes[0], value.tag());
            assert_eq!(decoded(&bytes).unwrap(), value);
        }
    }

    /// `levels` arrays inside one another, the innermost empty.
    fn nested_arrays(levels: usize) -> Vec<u8> {
        let mut wire = Vec::with_capacity(levels * 5);
        for level in (0..levels).rev() {
            wire.push(b'A');
            wire.extend_from_slice(&((level * 5) as u32).to_be_bytes());
        }
        wire
    }

    #[test]
    fn nesting_up_to_the_limit_decodes() {
        let mut value = decoded(&nested_arrays(MAX_FIELD_NESTING)).unwrap();
        let mut levels = 0;
        while let FieldValue::Array(mut inner) = value {
            levels += 1;
            value = inner.pop().unwrap_or(FieldValue::Void);
        }
        assert_eq!(levels, MAX_FIELD_NESTING);
    }

    #[test]
    fn nesting_past_the_limit_is_rejected() {
        let err = decoded(&nested_arrays(20_000)).unwrap_err();
        assert!(matches!(err, AmqpError::Decode(_)), "{err}");

        let err = decoded(&nested_arrays(MAX_FIELD_NESTING + 1)).unwrap_err();
        assert!(matches!(err, AmqpError::Decode(_)), "{err}");
    }

    #[test]
    fn nested_tables_count_toward_the_limit() {
        // each level is a table with one key "k" holding the next table
        let levels = MAX_FIELD_NESTING + 1;
        let mut wire = Vec::new();
        for level in (0..levels).rev() {
            wire.extend_from_slice(&((level * 7) as u32).to_be_bytes());
            if level > 0 {
                wire.extend_from_slice(&[1, b'k', b'F']);
            }
        }
        let err = decode_table(&mut Cursor::new(wire.as_slice())).unwrap_err();
        assert!(matches!(err, AmqpError::Decode(_)), "{err}");

        let accepted = &wire[7..];
        assert!(decode_table(&mut Cursor::new(accepted)).is_ok());
    }

    #[test]
    fn timestamps_cover_the_whole_i64_range() {
        for seconds in [i64::MIN, -1, 0, i64::MAX] {
            let bytes = encoded(&FieldValue::Timestamp(seconds));
            assert_eq!(&bytes[1..], &seconds.to_be_bytes());
            assert_eq!(decoded(&bytes).unwrap(), FieldValue::Timestamp(seconds));
        }
        assert_eq!(FieldValue::Timestamp(i64::MAX).as_datetime(), None);
    }

    #[test]
    fn timestamp_converts_to_and_from_chrono() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let value = FieldValue::from(at);
        assert_eq!(value, FieldValue::Timestamp(1_700_000_000));
        assert_eq!(value.as_datetime(), Some(at));
    }

    #[test]
    fn float_payloads_are_bit_exact() {
        let nan = f64::from_bits(0x7ff8_0000_dead_beef);
        match decoded(&encoded(&FieldValue::F64(nan))).unwrap() {
            FieldValue::F64(v) => assert_eq!(v.to_bits(), nan.to_bits()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decimal_layout_is_scale_then_unscaled() {
        let bytes = encoded(&FieldValue::Decimal(Decimal {
            scale: 3,
            value: -1,
        }));
        assert_eq!(bytes, vec![b'D', 3, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn long_string_field_layout() {
        assert_eq!(
            encoded(&"PLAIN".into()),
            vec![b'S', 0, 0, 0, 5, b'P', b'L', b'A', b'I', b'N']
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decoded(&[b'Z', 0, 0]).unwrap_err();
        assert!(matches!(err, AmqpError::UnsupportedFieldType(b'Z')));
        assert!(err.to_string().contains("unsupported field type 'Z'"));
    }

    #[test]
    fn truncated_value_reports_unexpected_eof() {
        match decoded(&[b'I', 0, 1]).unwrap_err() {
            AmqpError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn long_string_with_top_bit_set_is_rejected() {
        let err = decode_long_string(&mut Cursor::new(&[0x80u8, 0, 0, 0][..])).unwrap_err();
        assert!(matches!(err, AmqpError::Decode(_)));
    }

    #[test]
    fn long_string_longer_than_input_is_truncated() {
        let err = decode_long_string(&mut Cursor::new(&[0u8, 0, 0, 10, b'a'][..])).unwrap_err();
        assert!(matches!(err, AmqpError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn short_string_rejects_more_than_255_bytes() {
        let mut buf = Vec::new();
        assert!(encode_short_string(&mut buf, &"a".repeat(255)).is_ok());
        let err = encode_short_string(&mut Vec::new(), &"a".repeat(256)).unwrap_err();
        assert!(matches!(err, AmqpError::Encode(_)));

        let back = decode_short_string(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(back.len(), 255);
    }

    #[test]
    fn short_string_must_be_utf8() {
        let err = decode_short_string(&mut Cursor::new(&[2u8, 0xC3, 0x28][..])).unwrap_err();
        assert!(matches!(err, AmqpError::Decode(_)));
    }

    #[test]
    fn empty_table_is_four_zero_bytes() {
        let mut buf = Vec::new();
        encode_table(&mut buf, &FieldTable::new()).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0]);
        assert!(decode_table(&mut Cursor::new(buf.as_slice())).unwrap().is_empty());
    }

    #[test]
    fn table_decoding_ignores_wire_order() {
        // b=1 then a=true, written by hand in reverse key order
        let body = [
            &[1, b'b', b'I', 0, 0, 0, 1][..],
            &[1, b'a', b't', 1][..],
        ]
        .concat();
        let mut wire = (body.len() as u32).to_be_bytes().to_vec();
        wire.extend_from_slice(&body);

        let table = decode_table(&mut Cursor::new(wire.as_slice())).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["a"], FieldValue::Bool(true));
        assert_eq!(table["b"], FieldValue::I32(1));
    }

    #[test]
    fn table_decoding_stops_at_its_length_prefix() {
        let mut table = FieldTable::new();
        table.insert("k".to_string(), FieldValue::Octet(9));
        let mut wire = Vec::new();
        encode_table(&mut wire, &table).unwrap();
        wire.extend_from_slice(&[0xDE, 0xAD]);

        let mut cursor = Cursor::new(wire.as_slice());
        assert_eq!(decode_table(&mut cursor).unwrap(), table);
        assert_eq!(cursor.position() as usize, wire.len() - 2);
    }

    #[test]
    fn table_with_truncated_entry_fails() {
        // body claims 3 bytes: key "k" then an I32 tag with no value
        let wire = [0, 0, 0, 3, 1, b'k', b'I'];
        assert!(decode_table(&mut Cursor::new(&wire[..])).is_err());
    }

    #[test]
    fn array_prefix_counts_bytes_not_elements() {
        let bytes = encoded(&FieldValue::Array(vec![
            FieldValue::I16(1),
            FieldValue::Bool(true),
        ]));
        // 's' + 2 bytes, 't' + 1 byte
        assert_eq!(&bytes[..5], &[b'A', 0, 0, 0, 5]);
        assert_eq!(bytes.len(), 10);
    }

    #[test]
    fn array_cut_short_by_input_is_truncated() {
        // claims 9 bytes of elements but only one complete element follows
        let wire = [b'A', 0, 0, 0, 9, b't', 1];
        assert!(matches!(
            decoded(&wire).unwrap_err(),
            AmqpError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn array_leaves_following_bytes_alone() {
        let mut wire = encoded(&FieldValue::Array(vec![FieldValue::Octet(1)]));
        wire.extend_from_slice(&[b'V']);
        let mut cursor = Cursor::new(wire.as_slice());
        assert_eq!(
            decode_field(&mut cursor).unwrap(),
            FieldValue::Array(vec![FieldValue::Octet(1)])
        );
        assert_eq!(decode_field(&mut cursor).unwrap(), FieldValue::Void);
    }
}
