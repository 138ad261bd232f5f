//! Primitive types.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>
//! - <https://cwiki.apache.org/confluence/display/KAFKA/KIP-482%3A+The+Kafka+Protocol+should+Support+Optional+Tagged+Fields#KIP482:TheKafkaProtocolshouldSupportOptionalTaggedFields-UnsignedVarints>

use std::io::{Read, Write};

use super::{
    traits::{ReadCompactType, ReadError, ReadType, WriteCompactType, WriteError, WriteType},
    vec_builder::VecBuilder,
};

impl<R: Read> ReadType<R> for bool {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        // any non-zero value is considered true
        Ok(u8::from_be_bytes(read_array(reader)?) != 0)
    }
}

impl<W: Write> WriteType<W> for bool {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&[u8::from(*self)])?;
        Ok(())
    }
}

macro_rules! fixed_width_int {
    ($($t:ty),+) => {
        $(
            impl<R: Read> ReadType<R> for $t {
                fn read(reader: &mut R) -> Result<Self, ReadError> {
                    Ok(<$t>::from_be_bytes(read_array(reader)?))
                }
            }

            impl<W: Write> WriteType<W> for $t {
                fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                    writer.write_all(&self.to_be_bytes())?;
                    Ok(())
                }
            }
        )+
    };
}

fixed_width_int!(i8, i16, i32, i64);

fn read_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N], ReadError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, ReadError> {
    Ok(VecBuilder::new(len).read_exact(reader)?.into())
}

fn read_utf8<R: Read>(reader: &mut R, len: usize) -> Result<String, ReadError> {
    String::from_utf8(read_bytes(reader, len)?).map_err(|e| ReadError::Malformed(Box::new(e)))
}

/// Reads the length prefix of a compact (flexible version) field.
///
/// The wire value is `N + 1`, where `0` encodes null.
fn read_compact_len<R: Read>(reader: &mut R) -> Result<Option<usize>, ReadError> {
    match UnsignedVarint::read(reader)?.0 {
        0 => Ok(None),
        len => Ok(Some(usize::try_from(len - 1)?)),
    }
}

fn write_compact_len<W: Write>(writer: &mut W, len: Option<usize>) -> Result<(), WriteError> {
    let encoded = match len {
        Some(len) => u64::try_from(len)?
            .checked_add(1)
            .ok_or_else(|| WriteError::Malformed("Compact length overflow".into()))?,
        None => 0,
    };

    UnsignedVarint(encoded).write(writer)
}

/// The UNSIGNED_VARINT type describes an unsigned variable length integer.
///
/// Numbers are written in groups of 7 bits, lowest group first. The high bit of each byte is set while more groups
/// follow.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct UnsignedVarint(pub u64);

impl<R> ReadType<R> for UnsignedVarint
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut res: u64 = 0;
        let mut shift = 0;

        loop {
            let [c] = read_array::<R, 1>(reader)?;
            res |= u64::from(c & 0x7f) << shift;

            if (c & 0x80) == 0 {
                return Ok(Self(res));
            }

            shift += 7;
            if shift > 63 {
                return Err(ReadError::Malformed(
                    "Overflow while reading unsigned varint".into(),
                ));
            }
        }
    }
}

impl<W> WriteType<W> for UnsignedVarint
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let mut curr = self.0;
        loop {
            let low = (curr & 0x7f) as u8;
            curr >>= 7;

            if curr == 0 {
                writer.write_all(&[low])?;
                return Ok(());
            }

            writer.write_all(&[low | 0x80])?;
        }
    }
}

// STRING
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        let len = usize::try_from(len).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        read_utf8(reader, len)
    }
}

impl<W: Write> WriteType<W> for String {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        i16::try_from(self.len())?.write(writer)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

// NULLABLE_STRING
impl<R: Read> ReadType<R> for Option<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        match i16::read(reader)? {
            -1 => Ok(None),
            l if l < -1 => Err(ReadError::Malformed(
                format!("Invalid negative length for nullable string: {l}").into(),
            )),
            l => Ok(Some(read_utf8(reader, usize::try_from(l)?)?)),
        }
    }
}

impl<W: Write> WriteType<W> for Option<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write(writer),
            None => (-1i16).write(writer),
        }
    }
}

// COMPACT_STRING
impl<R: Read> ReadCompactType<R> for String {
    fn read_compact(reader: &mut R) -> Result<Self, ReadError> {
        match read_compact_len(reader)? {
            Some(len) => read_utf8(reader, len),
            None => Err(ReadError::Malformed(
                "CompactString must have non-zero length".into(),
            )),
        }
    }
}

impl<W: Write> WriteCompactType<W> for String {
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError> {
        write_compact_len(writer, Some(self.len()))?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

// COMPACT_NULLABLE_STRING
impl<R: Read> ReadCompactType<R> for Option<String> {
    fn read_compact(reader: &mut R) -> Result<Self, ReadError> {
        read_compact_len(reader)?
            .map(|len| read_utf8(reader, len))
            .transpose()
    }
}

impl<W: Write> WriteCompactType<W> for Option<String> {
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write_compact(writer),
            None => write_compact_len(writer, None),
        }
    }
}

// BYTES
impl<R: Read> ReadType<R> for Vec<u8> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        match i32::read(reader)? {
            l if l < 0 => Err(ReadError::Malformed(
                format!("Invalid length for bytes: {l}").into(),
            )),
            l => read_bytes(reader, usize::try_from(l)?),
        }
    }
}

impl<W: Write> WriteType<W> for Vec<u8> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        i32::try_from(self.len())?.write(writer)?;
        writer.write_all(self)?;
        Ok(())
    }
}

// COMPACT_BYTES
impl<R: Read> ReadCompactType<R> for Vec<u8> {
    fn read_compact(reader: &mut R) -> Result<Self, ReadError> {
        match read_compact_len(reader)? {
            Some(len) => read_bytes(reader, len),
            None => Err(ReadError::Malformed(
                "CompactBytes must have non-zero length".into(),
            )),
        }
    }
}

impl<W: Write> WriteCompactType<W> for Vec<u8> {
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError> {
        write_compact_len(writer, Some(self.len()))?;
        writer.write_all(self)?;
        Ok(())
    }
}

/// Represents a section containing optional tagged fields.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct TaggedFields(pub Vec<(UnsignedVarint, Vec<u8>)>);

impl<R> ReadType<R> for TaggedFields
where
    R: Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = usize::try_from(UnsignedVarint::read(reader)?.0)?;

        let mut res = VecBuilder::new(len);
        for _ in 0..len {
            let tag = UnsignedVarint::read(reader)?;
            let data_len = usize::try_from(UnsignedVarint::read(reader)?.0)?;
            res.push((tag, read_bytes(reader, data_len)?));
        }

        Ok(Self(res.into()))
    }
}

impl<W> WriteType<W> for TaggedFields
where
    W: Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        UnsignedVarint(u64::try_from(self.0.len())?).write(writer)?;

        for (tag, data) in &self.0 {
            tag.write(writer)?;
            UnsignedVarint(u64::try_from(data.len())?).write(writer)?;
            writer.write_all(data)?;
        }

        Ok(())
    }
}

impl<W: Write> WriteType<W> for Option<TaggedFields> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(tagged_fields) => tagged_fields.write(writer),
            None => TaggedFields::default().write(writer),
        }
    }
}

/// Reads `[T]`, a null array (length `-1`) reads as empty.
fn read_array_of<R, T>(reader: &mut R) -> Result<Vec<T>, ReadError>
where
    R: Read,
    T: ReadType<R>,
{
    let len = i32::read(reader)?;
    if len == -1 {
        return Ok(vec![]);
    }

    let len = usize::try_from(len)?;
    let mut res = VecBuilder::new(len);
    for _ in 0..len {
        res.push(T::read(reader)?);
    }

    Ok(res.into())
}

/// Writes `[T]`, an empty slice is written as a null array.
fn write_array_of<W, T>(writer: &mut W, items: &[T]) -> Result<(), WriteError>
where
    W: Write,
    T: WriteType<W>,
{
    if items.is_empty() {
        return (-1i32).write(writer);
    }

    i32::try_from(items.len())?.write(writer)?;
    for item in items {
        item.write(writer)?;
    }

    Ok(())
}

// ARRAY<STRING>
impl<R: Read> ReadType<R> for Vec<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array_of(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array_of(writer, self)
    }
}

// ARRAY<INT32>
impl<R: Read> ReadType<R> for Vec<i32> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array_of(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<i32> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array_of(writer, self)
    }
}

// ARRAY<INT64>
impl<R: Read> ReadType<R> for Vec<i64> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        read_array_of(reader)
    }
}

impl<W: Write> WriteType<W> for Vec<i64> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        write_array_of(writer, self)
    }
}

// COMPACT_ARRAY<INT32>
impl<R: Read> ReadCompactType<R> for Vec<i32> {
    fn read_compact(reader: &mut R) -> Result<Self, ReadError> {
        let Some(len) = read_compact_len(reader)? else {
            return Ok(vec![]);
        };

        let mut res = VecBuilder::new(len);
        for _ in 0..len {
            res.push(i32::read(reader)?);
        }

        Ok(res.into())
    }
}

impl<W: Write> WriteCompactType<W> for Vec<i32> {
    fn write_compact(&self, writer: &mut W) -> Result<(), WriteError> {
        write_compact_len(writer, Some(self.len()))?;
        for elmt in self {
            elmt.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;
    use crate::protocol::test_utils::test_roundtrip;

    test_roundtrip!(bool, test_bool_roundtrip);

    #[test]
    fn test_boolean_decode() {
        assert!(!bool::read(&mut Cursor::new(vec![0])).unwrap());

        // When reading a boolean value, any non-zero value is considered true.
        for v in [1, 35, 255] {
            assert!(bool::read(&mut Cursor::new(vec![v])).unwrap());
        }
    }

    test_roundtrip!(i8, test_int8_roundtrip);

    test_roundtrip!(i16, test_int16_roundtrip);

    test_roundtrip!(i32, test_int32_roundtrip);

    test_roundtrip!(i64, test_int64_roundtrip);

    #[test]
    fn test_int_big_endian() {
        let mut buf = vec![];
        0x0102_0304i32.write(&mut buf).unwrap();
        (-2i16).write(&mut buf).unwrap();
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFE]);
    }

    test_roundtrip!(UnsignedVarint, test_unsigned_varint_roundtrip);

    #[test]
    fn test_unsigned_varint_encoding() {
        for (value, want) in [
            (0u64, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7f]),
            (128, vec![0x80, 0x01]),
            (300, vec![0xac, 0x02]),
        ] {
            let mut buf = vec![];
            UnsignedVarint(value).write(&mut buf).unwrap();
            assert_eq!(buf, want, "{value}");
        }
    }

    #[test]
    fn test_unsigned_varint_read_overflow() {
        let mut buf = Cursor::new(vec![0xffu8; 64 / 7 + 1]);

        let err = UnsignedVarint::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
        assert_eq!(
            err.to_string(),
            "Malformed data: Overflow while reading unsigned varint",
        );
    }

    test_roundtrip!(String, test_string_roundtrip);

    #[test]
    fn test_string_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        i16::MAX.write(&mut buf).unwrap();
        buf.set_position(0);

        let err = String::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    test_roundtrip!(Option<String>, test_nullable_string_roundtrip);

    #[test]
    fn test_nullable_string_read_negative_length() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        (-2i16).write(&mut buf).unwrap();
        buf.set_position(0);

        let err = Option::<String>::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
        assert_eq!(
            err.to_string(),
            "Malformed data: Invalid negative length for nullable string: -2",
        );
    }

    #[test]
    fn test_compact_string() {
        let mut buf = vec![];
        "blah".to_string().write_compact(&mut buf).unwrap();
        assert_eq!(buf, [0x05, b'b', b'l', b'a', b'h']);

        let s = String::read_compact(&mut Cursor::new(buf)).unwrap();
        assert_eq!(s, "blah");

        let err = String::read_compact(&mut Cursor::new(vec![0x00])).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
    }

    #[test]
    fn test_compact_string_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        UnsignedVarint(u64::MAX).write(&mut buf).unwrap();
        buf.set_position(0);

        let err = String::read_compact(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    #[test]
    fn test_compact_nullable_string() {
        let got: Option<String> = ReadCompactType::read_compact(&mut Cursor::new(vec![0])).unwrap();
        assert_eq!(got, None);

        let mut buf = vec![];
        None::<String>.write_compact(&mut buf).unwrap();
        assert_eq!(buf, [0x00]);
    }

    #[test]
    fn test_compact_nullable_string_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        UnsignedVarint(u64::MAX).write(&mut buf).unwrap();
        buf.set_position(0);

        let result: Result<Option<String>, ReadError> = ReadCompactType::read_compact(&mut buf);
        assert_matches!(result.unwrap_err(), ReadError::IO(_));
    }

    test_roundtrip!(Vec<u8>, test_bytes_roundtrip);

    #[test]
    fn test_bytes_read_negative_length() {
        let err = Vec::<u8>::read(&mut Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFE])).unwrap_err();
        assert_matches!(err, ReadError::Malformed(_));
    }

    #[test]
    fn test_bytes_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        i32::MAX.write(&mut buf).unwrap();
        buf.set_position(0);

        let err = Vec::<u8>::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    test_roundtrip!(TaggedFields, test_tagged_fields_roundtrip);

    #[test]
    fn test_tagged_fields_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());

        // number of fields
        UnsignedVarint(u64::MAX).write(&mut buf).unwrap();

        // tag
        UnsignedVarint(u64::MAX).write(&mut buf).unwrap();

        // data length
        UnsignedVarint(u64::MAX).write(&mut buf).unwrap();

        buf.set_position(0);

        let err = TaggedFields::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    test_roundtrip!(Vec<i32>, test_array_roundtrip);

    test_roundtrip!(Vec<String>, test_string_array_roundtrip);

    #[test]
    fn test_array_null_reads_empty() {
        let got = Vec::<i64>::read(&mut Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF])).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn test_array_blowup_memory() {
        let mut buf = Cursor::new(Vec::<u8>::new());
        i32::MAX.write(&mut buf).unwrap();
        buf.set_position(0);

        let err = Vec::<i32>::read(&mut buf).unwrap_err();
        assert_matches!(err, ReadError::IO(_));
    }

    #[test]
    fn test_compact_array() {
        let mut buf = vec![];
        vec![1i32, 2].write_compact(&mut buf).unwrap();
        assert_eq!(buf, [0x03, 0, 0, 0, 1, 0, 0, 0, 2]);

        let got = Vec::<i32>::read_compact(&mut Cursor::new(buf)).unwrap();
        assert_eq!(got, vec![1, 2]);
    }
}
