//! Structural model of a class file
//!
//! A [`Class`] holds its members symbolically (names and parsed descriptors rather than pool
//! indices); the constant pool only enters the picture at serialization and reading time.

mod attribute;
mod class;
mod field;
mod method;

pub use attribute::{
    read_attribute, Attribute, AttributeDecoder, AttributeRegistry, ConstValue, InnerClassEntry,
    LocalVariableEntry,
};
pub use class::{Class, ClassDataSource, LoadedClass};
pub use field::Field;
pub use method::Method;

use crate::binary_format::{Deserialize, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file format version
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// Version 49.0, the newest format this crate emits
    pub const JAVA5: Version = Version {
        minor_version: 0,
        major_version: 49,
    };
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Version> {
        Ok(Version {
            minor_version: u16::deserialize(reader)?,
            major_version: u16::deserialize(reader)?,
        })
    }
}
