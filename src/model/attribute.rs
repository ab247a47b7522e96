//! Attributes, kept as a closed enum
//!
//! Every attribute this crate understands is a variant carrying decoded, symbolic content;
//! anything else survives reading as `Unknown` with its raw payload. Reading goes through an
//! [`AttributeRegistry`], a table of named decode functions, so callers can teach the reader
//! about extension attributes without the model growing new variants.

use crate::access_flags::InnerClassAccessFlags;
use crate::binary_format::{Deserialize, Serialize};
use crate::code::{CodeBody, ExceptionHandler};
use crate::descriptors::{FieldType, ParseDescriptor, RenderDescriptor};
use crate::errors::{Error, Result};
use crate::names::{BinaryName, Name};
use crate::pool::{ConstantPool, LoadedPool, PoolEntry};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::Read;

#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    SourceFile(String),
    ConstantValue(ConstValue),
    Exceptions(Vec<BinaryName>),
    InnerClasses(Vec<InnerClassEntry>),
    Synthetic,
    Deprecated,

    /// A resolved method body; appears in a read class's attribute list and must be re-assembled
    /// (see `disasm::reassemble`) before the class can be serialized again
    Code(CodeBody),

    /// `(start_pc, line_number)` pairs
    LineNumberTable(Vec<(u16, u16)>),
    LocalVariableTable(Vec<LocalVariableEntry>),

    /// Attribute the registry had no decoder for, captured opaquely
    ///
    /// The payload may embed indices into the pool it was read from, so re-serializing it against
    /// a different pool reproduces the bytes but not necessarily their meaning.
    Unknown { name: String, info: Vec<u8> },
}

/// Value of a `ConstantValue` attribute on a field
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Str(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InnerClassEntry {
    pub inner: BinaryName,

    /// `None` for anonymous and local classes
    pub outer: Option<BinaryName>,

    /// The simple (unqualified) name; `None` for anonymous classes
    pub short_name: Option<String>,

    pub access_flags: InnerClassAccessFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name: String,
    pub descriptor: FieldType<BinaryName>,
    pub slot: u16,
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::SourceFile(_) => "SourceFile",
            Attribute::ConstantValue(_) => "ConstantValue",
            Attribute::Exceptions(_) => "Exceptions",
            Attribute::InnerClasses(_) => "InnerClasses",
            Attribute::Synthetic => "Synthetic",
            Attribute::Deprecated => "Deprecated",
            Attribute::Code(_) => "Code",
            Attribute::LineNumberTable(_) => "LineNumberTable",
            Attribute::LocalVariableTable(_) => "LocalVariableTable",
            Attribute::Unknown { name, .. } => name,
        }
    }

    /// Intern every constant the serialized form will reference
    ///
    /// Code built through `CodeBuilder` interned its own constants as the verbs ran, which is why
    /// a `Code` variant showing up here (only possible by reading a class file) is an error.
    pub fn intern(&self, pool: &mut ConstantPool) -> Result<()> {
        pool.get_utf8(self.name());
        match self {
            Attribute::SourceFile(file) => {
                pool.get_utf8(file);
            }
            Attribute::ConstantValue(value) => match value {
                ConstValue::Integer(value) => {
                    pool.get_integer(*value);
                }
                ConstValue::Float(value) => {
                    pool.get_float(*value);
                }
                ConstValue::Long(value) => {
                    pool.get_long(*value);
                }
                ConstValue::Double(value) => {
                    pool.get_double(*value);
                }
                ConstValue::Str(text) => {
                    pool.get_string(text);
                }
            },
            Attribute::Exceptions(classes) => {
                for class in classes {
                    pool.get_class(class.as_str());
                }
            }
            Attribute::InnerClasses(entries) => {
                for entry in entries {
                    pool.get_class(entry.inner.as_str());
                    if let Some(outer) = &entry.outer {
                        pool.get_class(outer.as_str());
                    }
                    if let Some(short_name) = &entry.short_name {
                        pool.get_utf8(short_name);
                    }
                }
            }
            Attribute::Code(_) => return Err(Error::CodeNotReassembled),
            Attribute::Synthetic
            | Attribute::Deprecated
            | Attribute::LineNumberTable(_)
            | Attribute::LocalVariableTable(_)
            | Attribute::Unknown { .. } => (),
        }
        Ok(())
    }

    /// Write the attribute record (name index, payload length, payload)
    pub fn serialize<W: WriteBytesExt>(
        &self,
        pool: &ConstantPool,
        writer: &mut W,
    ) -> Result<()> {
        let mut payload: Vec<u8> = vec![];
        match self {
            Attribute::SourceFile(file) => {
                pool.utf8_index(file)?.serialize(&mut payload)?;
            }
            Attribute::ConstantValue(value) => {
                let index = match value {
                    ConstValue::Integer(value) => pool.integer_index(*value)?,
                    ConstValue::Float(value) => pool.float_index(*value)?,
                    ConstValue::Long(value) => pool.long_index(*value)?,
                    ConstValue::Double(value) => pool.double_index(*value)?,
                    ConstValue::Str(text) => pool.string_index(text)?,
                };
                index.serialize(&mut payload)?;
            }
            Attribute::Exceptions(classes) => {
                (classes.len() as u16).serialize(&mut payload)?;
                for class in classes {
                    pool.class_index(class.as_str())?.serialize(&mut payload)?;
                }
            }
            Attribute::InnerClasses(entries) => {
                (entries.len() as u16).serialize(&mut payload)?;
                for entry in entries {
                    pool.class_index(entry.inner.as_str())?
                        .serialize(&mut payload)?;
                    match &entry.outer {
                        Some(outer) => pool.class_index(outer.as_str())?,
                        None => 0,
                    }
                    .serialize(&mut payload)?;
                    match &entry.short_name {
                        Some(short_name) => pool.utf8_index(short_name)?,
                        None => 0,
                    }
                    .serialize(&mut payload)?;
                    entry.access_flags.serialize(&mut payload)?;
                }
            }
            Attribute::Synthetic | Attribute::Deprecated => (),
            Attribute::Code(body) => {
                body.max_stack.serialize(&mut payload)?;
                body.max_locals.serialize(&mut payload)?;
                (body.bytecode.len() as u32).serialize(&mut payload)?;
                payload.extend_from_slice(&body.bytecode);
                if body.handlers.len() > u16::MAX as usize {
                    return Err(Error::SectionCountOverflow {
                        section: "exception table",
                        count: body.handlers.len(),
                    });
                }
                (body.handlers.len() as u16).serialize(&mut payload)?;
                for handler in &body.handlers {
                    handler.start_pc.serialize(&mut payload)?;
                    handler.end_pc.serialize(&mut payload)?;
                    handler.handler_pc.serialize(&mut payload)?;
                    match &handler.catch_type {
                        Some(class) => pool.class_index(class.as_str())?,
                        None => 0,
                    }
                    .serialize(&mut payload)?;
                }
                (body.attributes.len() as u16).serialize(&mut payload)?;
                for attribute in &body.attributes {
                    attribute.serialize(pool, &mut payload)?;
                }
            }
            Attribute::LineNumberTable(table) => {
                (table.len() as u16).serialize(&mut payload)?;
                for &(start_pc, line) in table {
                    start_pc.serialize(&mut payload)?;
                    line.serialize(&mut payload)?;
                }
            }
            Attribute::LocalVariableTable(entries) => {
                (entries.len() as u16).serialize(&mut payload)?;
                for entry in entries {
                    entry.start_pc.serialize(&mut payload)?;
                    entry.length.serialize(&mut payload)?;
                    pool.utf8_index(&entry.name)?.serialize(&mut payload)?;
                    pool.utf8_index(&entry.descriptor.render())?
                        .serialize(&mut payload)?;
                    entry.slot.serialize(&mut payload)?;
                }
            }
            Attribute::Unknown { info, .. } => payload.extend_from_slice(info),
        }

        pool.utf8_index(self.name())?.serialize(writer)?;
        (payload.len() as u32).serialize(writer)?;
        writer.write_all(&payload)?;
        Ok(())
    }
}

/// A named attribute decode function
///
/// Receives the registry itself so that decoders for nesting attributes (`Code`) can decode their
/// sub-attributes through the same table.
pub type AttributeDecoder = fn(&AttributeRegistry, &[u8], &LoadedPool) -> Result<Attribute>;

/// Table of attribute decoders consulted while reading, keyed by attribute name
pub struct AttributeRegistry {
    decoders: HashMap<String, AttributeDecoder>,
}

impl Default for AttributeRegistry {
    fn default() -> AttributeRegistry {
        AttributeRegistry::standard()
    }
}

impl AttributeRegistry {
    /// Registry knowing every attribute the [`Attribute`] enum models
    pub fn standard() -> AttributeRegistry {
        let mut registry = AttributeRegistry {
            decoders: HashMap::new(),
        };
        registry.register("SourceFile", decode_source_file);
        registry.register("ConstantValue", decode_constant_value);
        registry.register("Exceptions", decode_exceptions);
        registry.register("InnerClasses", decode_inner_classes);
        registry.register("Synthetic", decode_synthetic);
        registry.register("Deprecated", decode_deprecated);
        registry.register("Code", decode_code);
        registry.register("LineNumberTable", decode_line_number_table);
        registry.register("LocalVariableTable", decode_local_variable_table);
        registry
    }

    pub fn register(&mut self, name: &str, decoder: AttributeDecoder) {
        self.decoders.insert(name.to_string(), decoder);
    }

    /// Decode one attribute payload, falling back to opaque capture for unknown names
    pub fn decode(&self, name: &str, info: &[u8], pool: &LoadedPool) -> Result<Attribute> {
        match self.decoders.get(name) {
            Some(decoder) => decoder(self, info, pool),
            None => Ok(Attribute::Unknown {
                name: name.to_string(),
                info: info.to_vec(),
            }),
        }
    }
}

/// Read an attribute record (name index, payload length, payload) and decode it
pub fn read_attribute<R: ReadBytesExt>(
    reader: &mut R,
    pool: &LoadedPool,
    registry: &AttributeRegistry,
) -> Result<Attribute> {
    let name_index = u16::deserialize(reader)?;
    let length = u32::deserialize(reader)?;
    let mut info = vec![0u8; length as usize];
    reader.read_exact(&mut info)?;
    let name = pool.utf8(name_index)?;
    registry.decode(name, &info, pool)
}

fn class_name(pool: &LoadedPool, index: u16) -> Result<BinaryName> {
    BinaryName::from_string(pool.class_name(index)?.to_string()).map_err(Error::InvalidName)
}

fn decode_source_file(_: &AttributeRegistry, info: &[u8], pool: &LoadedPool) -> Result<Attribute> {
    let mut reader = info;
    let index = u16::deserialize(&mut reader)?;
    Ok(Attribute::SourceFile(pool.utf8(index)?.to_string()))
}

fn decode_constant_value(
    _: &AttributeRegistry,
    info: &[u8],
    pool: &LoadedPool,
) -> Result<Attribute> {
    let mut reader = info;
    let index = u16::deserialize(&mut reader)?;
    let value = match pool.entry(index)? {
        PoolEntry::Integer(value) => ConstValue::Integer(*value),
        PoolEntry::Float(value) => ConstValue::Float(*value),
        PoolEntry::Long(value) => ConstValue::Long(*value),
        PoolEntry::Double(value) => ConstValue::Double(*value),
        PoolEntry::Str(utf8) => ConstValue::Str(pool.pool.utf8_text(*utf8).to_string()),
        _ => {
            return Err(Error::WrongConstantKind {
                index,
                expected: "a loadable constant",
            })
        }
    };
    Ok(Attribute::ConstantValue(value))
}

fn decode_exceptions(_: &AttributeRegistry, info: &[u8], pool: &LoadedPool) -> Result<Attribute> {
    let mut reader = info;
    let indices: Vec<u16> = Vec::deserialize(&mut reader)?;
    let classes = indices
        .into_iter()
        .map(|index| class_name(pool, index))
        .collect::<Result<_>>()?;
    Ok(Attribute::Exceptions(classes))
}

fn decode_inner_classes(
    _: &AttributeRegistry,
    info: &[u8],
    pool: &LoadedPool,
) -> Result<Attribute> {
    let mut reader = info;
    let count = u16::deserialize(&mut reader)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let inner_index = u16::deserialize(&mut reader)?;
        let outer_index = u16::deserialize(&mut reader)?;
        let name_index = u16::deserialize(&mut reader)?;
        let access_flags = InnerClassAccessFlags::deserialize(&mut reader)?;
        entries.push(InnerClassEntry {
            inner: class_name(pool, inner_index)?,
            outer: if outer_index == 0 {
                None
            } else {
                Some(class_name(pool, outer_index)?)
            },
            short_name: if name_index == 0 {
                None
            } else {
                Some(pool.utf8(name_index)?.to_string())
            },
            access_flags,
        });
    }
    Ok(Attribute::InnerClasses(entries))
}

fn decode_synthetic(_: &AttributeRegistry, _: &[u8], _: &LoadedPool) -> Result<Attribute> {
    Ok(Attribute::Synthetic)
}

fn decode_deprecated(_: &AttributeRegistry, _: &[u8], _: &LoadedPool) -> Result<Attribute> {
    Ok(Attribute::Deprecated)
}

fn decode_code(registry: &AttributeRegistry, info: &[u8], pool: &LoadedPool) -> Result<Attribute> {
    let mut reader = info;
    let max_stack = u16::deserialize(&mut reader)?;
    let max_locals = u16::deserialize(&mut reader)?;
    let code_length = u32::deserialize(&mut reader)?;
    let mut bytecode = vec![0u8; code_length as usize];
    reader.read_exact(&mut bytecode)?;

    let handler_count = u16::deserialize(&mut reader)?;
    let mut handlers = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        let start_pc = u16::deserialize(&mut reader)?;
        let end_pc = u16::deserialize(&mut reader)?;
        let handler_pc = u16::deserialize(&mut reader)?;
        let catch_index = u16::deserialize(&mut reader)?;
        handlers.push(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: if catch_index == 0 {
                None
            } else {
                Some(class_name(pool, catch_index)?)
            },
        });
    }

    let attribute_count = u16::deserialize(&mut reader)?;
    let mut attributes = Vec::with_capacity(attribute_count as usize);
    for _ in 0..attribute_count {
        attributes.push(read_attribute(&mut reader, pool, registry)?);
    }

    Ok(Attribute::Code(CodeBody {
        max_stack,
        max_locals,
        bytecode,
        handlers,
        attributes,
    }))
}

fn decode_line_number_table(
    _: &AttributeRegistry,
    info: &[u8],
    _: &LoadedPool,
) -> Result<Attribute> {
    let mut reader = info;
    let count = u16::deserialize(&mut reader)?;
    let mut table = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = u16::deserialize(&mut reader)?;
        let line = u16::deserialize(&mut reader)?;
        table.push((start_pc, line));
    }
    Ok(Attribute::LineNumberTable(table))
}

fn decode_local_variable_table(
    _: &AttributeRegistry,
    info: &[u8],
    pool: &LoadedPool,
) -> Result<Attribute> {
    let mut reader = info;
    let count = u16::deserialize(&mut reader)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = u16::deserialize(&mut reader)?;
        let length = u16::deserialize(&mut reader)?;
        let name = pool.utf8(u16::deserialize(&mut reader)?)?.to_string();
        let descriptor = FieldType::parse(pool.utf8(u16::deserialize(&mut reader)?)?)
            .map_err(|err| Error::InvalidDescriptor(err.to_string()))?;
        let slot = u16::deserialize(&mut reader)?;
        entries.push(LocalVariableEntry {
            start_pc,
            length,
            name,
            descriptor,
            slot,
        });
    }
    Ok(Attribute::LocalVariableTable(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn source_file_round_trip() {
        let mut pool = ConstantPool::new();
        let attribute = Attribute::SourceFile("Widget.java".to_string());
        attribute.intern(&mut pool).unwrap();
        pool.assign_indices().unwrap();

        let mut buffer: Vec<u8> = vec![];
        attribute.serialize(&pool, &mut buffer).unwrap();

        let mut pool_bytes: Vec<u8> = vec![];
        pool.serialize(&mut pool_bytes).unwrap();
        let loaded = LoadedPool::read(&mut &pool_bytes[..]).unwrap();

        let registry = AttributeRegistry::standard();
        let read_back = read_attribute(&mut &buffer[..], &loaded, &registry).unwrap();
        assert_eq!(attribute, read_back);
    }

    #[test]
    fn unknown_attribute_captured_opaquely() {
        let mut pool = ConstantPool::new();
        pool.get_utf8("Mystery");
        pool.assign_indices().unwrap();
        let mut pool_bytes: Vec<u8> = vec![];
        pool.serialize(&mut pool_bytes).unwrap();
        let loaded = LoadedPool::read(&mut &pool_bytes[..]).unwrap();

        let registry = AttributeRegistry::standard();
        let decoded = registry.decode("Mystery", &[1, 2, 3], &loaded).unwrap();
        assert_eq!(
            decoded,
            Attribute::Unknown {
                name: "Mystery".to_string(),
                info: vec![1, 2, 3],
            },
        );
    }

    #[test]
    fn registered_decoder_takes_precedence_over_opaque_capture() {
        fn decode_marker(_: &AttributeRegistry, _: &[u8], _: &LoadedPool) -> Result<Attribute> {
            Ok(Attribute::Deprecated)
        }

        let mut pool = ConstantPool::new();
        pool.get_utf8("x");
        pool.assign_indices().unwrap();
        let mut pool_bytes: Vec<u8> = vec![];
        pool.serialize(&mut pool_bytes).unwrap();
        let loaded = LoadedPool::read(&mut &pool_bytes[..]).unwrap();

        let mut registry = AttributeRegistry::standard();
        registry.register("Marker", decode_marker);
        let decoded = registry.decode("Marker", &[], &loaded).unwrap();
        assert_eq!(decoded, Attribute::Deprecated);
    }

    #[test]
    fn read_code_attribute_rejected_at_intern() {
        let body = CodeBody {
            max_stack: 0,
            max_locals: 0,
            bytecode: vec![0xb1],
            handlers: vec![],
            attributes: vec![],
        };
        let mut pool = ConstantPool::new();
        let result = Attribute::Code(body).intern(&mut pool);
        assert!(matches!(result, Err(Error::CodeNotReassembled)));
    }
}
