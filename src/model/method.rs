use crate::access_flags::MethodAccessFlags;
use crate::binary_format::{Deserialize, Serialize};
use crate::code::Code;
use crate::descriptors::{MethodDescriptor, ParseDescriptor, RenderDescriptor};
use crate::errors::{Error, Result};
use crate::model::{read_attribute, Attribute, AttributeRegistry};
use crate::names::{BinaryName, Name, UnqualifiedName};
use crate::pool::{ConstantPool, LoadedPool};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// A body assembled through `CodeBuilder` lives in `code` and is resolved into a `Code` attribute
/// during serialization. Methods read from a class file instead carry an [`Attribute::Code`] in
/// `attributes`, which cannot be serialized as-is (its bytecode references the pool it was read
/// from); `disasm::reassemble` moves it over to `code`.
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub code: Option<Code>,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn new(
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> Method {
        Method {
            access_flags,
            name,
            descriptor,
            code: None,
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

        let attribute_count = self.attributes.len() + usize::from(self.code.is_some());
        (attribute_count as u16).serialize(writer)?;
        if let Some(code) = &self.code {
            let body = code.resolve(pool)?;
            Attribute::Code(body).serialize(pool, writer)?;
        }
        for attribute in &self.attributes {
            attribute.serialize(pool, writer)?;
        }
        Ok(())
    }

    pub(crate) fn read<R: ReadBytesExt>(
        reader: &mut R,
        pool: &LoadedPool,
        registry: &AttributeRegistry,
    ) -> Result<Method> {
        let access_flags = MethodAccessFlags::deserialize(reader)?;
        let name = UnqualifiedName::from_string(pool.utf8(u16::deserialize(reader)?)?.to_string())
            .map_err(Error::InvalidName)?;
        let descriptor = MethodDescriptor::parse(pool.utf8(u16::deserialize(reader)?)?)
            .map_err(|err| Error::InvalidDescriptor(err.to_string()))?;
        let attribute_count = u16::deserialize(reader)?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            attributes.push(read_attribute(reader, pool, registry)?);
        }
        Ok(Method {
            access_flags,
            name,
            descriptor,
            code: None,
            attributes,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }
}
