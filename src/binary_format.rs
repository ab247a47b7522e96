use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Inverse of [`Serialize`], for reading constructs back out of class files
///
/// Everything in the format is big-endian and length-prefixed, so decoding never needs to look
/// ahead more than the current record.
pub trait Deserialize: Sized {
    /// Deserialize construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self>;
}

macro_rules! fixed_width_impls {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Serialize for $ty {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }
        impl Deserialize for $ty {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                reader.$read::<BigEndian>()
            }
        }
    };
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_u8()
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Deserialize for i8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        reader.read_i8()
    }
}

fixed_width_impls!(u16, write_u16, read_u16);
fixed_width_impls!(u32, write_u32, read_u32);
fixed_width_impls!(u64, write_u64, read_u64);
fixed_width_impls!(i16, write_i16, read_i16);
fixed_width_impls!(i32, write_i32, read_i32);
fixed_width_impls!(i64, write_i64, read_i64);
fixed_width_impls!(f32, write_f32, read_f32);
fixed_width_impls!(f64, write_f64, read_f64);

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<A: Serialize + Deserialize + PartialEq + std::fmt::Debug>(value: A) {
        let mut buf: Vec<u8> = vec![];
        value.serialize(&mut buf).unwrap();
        let read_back = A::deserialize(&mut &buf[..]).unwrap();
        assert_eq!(value, read_back);
    }

    #[test]
    fn primitives() {
        round_trip(0x42u8);
        round_trip(0xCAFEu16);
        round_trip(0xCAFEBABEu32);
        round_trip(-40_000i32);
        round_trip(i64::MIN);
        round_trip(1.5f32);
        round_trip(f64::MAX);
    }

    #[test]
    fn length_prefixed_vec() {
        let mut buf: Vec<u8> = vec![];
        vec![1u16, 2, 3].serialize(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 3, 0, 1, 0, 2, 0, 3]);
        round_trip(vec![0xAAu8; 300]);
    }

    #[test]
    fn big_endian_layout() {
        let mut buf: Vec<u8> = vec![];
        0x1234u16.serialize(&mut buf).unwrap();
        assert_eq!(buf, vec![0x12, 0x34]);
    }
}
