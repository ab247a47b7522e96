use crate::access_flags::FieldAccessFlags;
use crate::binary_format::{Deserialize, Serialize};
use crate::descriptors::{FieldType, ParseDescriptor, RenderDescriptor};
use crate::errors::{Error, Result};
use crate::model::{read_attribute, Attribute, AttributeRegistry};
use crate::names::{BinaryName, Name, UnqualifiedName};
use crate::pool::{ConstantPool, LoadedPool};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Field declared by a class or interface
#[derive(Debug)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub attributes: Vec<Attribute>,
}

impl Field {
    pub fn new(
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
    ) -> Field {
        Field {
            access_flags,
            name,
            descriptor,
            attributes: vec![],
        }
    }

    pub(crate) fn intern(&self, pool: &mut ConstantPool) -> Result<()> {
        pool.get_utf8(self.name.as_str());
        pool.get_utf8(&self.descriptor.render());
        for attribute in &self.attributes {
            attribute.intern(pool)?;
        }
        Ok(())
    }

    pub(crate) fn serialize<W: WriteBytesExt>(
        &self,
        pool: &ConstantPool,
        writer: &mut W,
    ) -> Result<()> {
        self.access_flags.serialize(writer)?;
        pool.utf8_index(self.name.as_str())?.serialize(writer)?;
        pool.utf8_index(&self.descriptor.render())?
            .serialize(writer)?;
        (self.attributes.len() as u16).serialize(writer)?;
        for attribute in &self.attributes {
            attribute.serialize(pool, writer)?;
        }
        Ok(())
    }

    pub(crate) fn read<R: ReadBytesExt>(
        reader: &mut R,
        pool: &LoadedPool,
        registry: &AttributeRegistry,
    ) -> Result<Field> {
        let access_flags = FieldAccessFlags::deserialize(reader)?;
        let name = UnqualifiedName::from_string(pool.utf8(u16::deserialize(reader)?)?.to_string())
            .map_err(Error::InvalidName)?;
        let descriptor = FieldType::parse(pool.utf8(u16::deserialize(reader)?)?)
            .map_err(|err| Error::InvalidDescriptor(err.to_string()))?;
        let attribute_count = u16::deserialize(reader)?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            attributes.push(read_attribute(reader, pool, registry)?);
        }
        Ok(Field {
            access_flags,
            name,
            descriptor,
            attributes,
        })
    }
}
