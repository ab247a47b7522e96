//! Deduplicating constant pool with deferred index assignment
//!
//! Interning an entry never assigns it a class file index; handles are arena positions. Indices
//! only exist after [`ConstantPool::assign_indices`] runs (right before serialization), which
//! numbers string/integer/float entries ahead of everything else so that as many of them as
//! possible land in the 1-byte index range of the `ldc` instruction.

use crate::binary_format::{Deserialize, Serialize};
use crate::errors::{Error, Result};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;

/// Position of an interned entry in the pool arena
///
/// This is a stable identity: it never shifts when other entries are added and it is valid before
/// index assignment has run.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PoolHandle(pub(crate) u32);

macro_rules! typed_handle {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub struct $name(pub(crate) PoolHandle);

        impl From<$name> for PoolHandle {
            fn from(handle: $name) -> PoolHandle {
                handle.0
            }
        }
    };
}

typed_handle!(Utf8Handle, "Handle to a `CONSTANT_Utf8` entry");
typed_handle!(ClassHandle, "Handle to a `CONSTANT_Class` entry");
typed_handle!(NameAndTypeHandle, "Handle to a `CONSTANT_NameAndType` entry");

/// Tags from the constant pool section of the class file format
mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACEMETHODREF: u8 = 11;
    pub const NAMEANDTYPE: u8 = 12;
}

#[derive(Clone, PartialEq, Debug)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(Utf8Handle),
    Str(Utf8Handle),
    FieldRef(ClassHandle, NameAndTypeHandle),
    MethodRef(ClassHandle, NameAndTypeHandle),
    InterfaceMethodRef(ClassHandle, NameAndTypeHandle),
    NameAndType(Utf8Handle, Utf8Handle),
}

impl Width for PoolEntry {
    fn width(&self) -> usize {
        match self {
            PoolEntry::Long(_) | PoolEntry::Double(_) => 2,
            _ => 1,
        }
    }
}

impl PoolEntry {
    /// Entries eligible for the 1-byte `ldc` index operand get their indices assigned first
    fn index_priority(&self) -> bool {
        matches!(
            self,
            PoolEntry::Str(_) | PoolEntry::Integer(_) | PoolEntry::Float(_)
        )
    }
}

pub struct ConstantPool {
    entries: Vec<PoolEntry>,
    assigned: Vec<Option<u16>>,

    /// Next class file index to hand out (index 0 is reserved by the format)
    next_index: u16,

    // Deduplication maps, one per entry kind (floating point keyed on raw bits)
    utf8s: HashMap<String, Utf8Handle>,
    integers: HashMap<i32, PoolHandle>,
    floats: HashMap<[u8; 4], PoolHandle>,
    longs: HashMap<i64, PoolHandle>,
    doubles: HashMap<[u8; 8], PoolHandle>,
    classes: HashMap<Utf8Handle, ClassHandle>,
    strings: HashMap<Utf8Handle, PoolHandle>,
    name_and_types: HashMap<(Utf8Handle, Utf8Handle), NameAndTypeHandle>,
    field_refs: HashMap<(ClassHandle, NameAndTypeHandle), PoolHandle>,
    method_refs: HashMap<(ClassHandle, NameAndTypeHandle), PoolHandle>,
    interface_method_refs: HashMap<(ClassHandle, NameAndTypeHandle), PoolHandle>,
}

impl Default for ConstantPool {
    fn default() -> ConstantPool {
        ConstantPool::new()
    }
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool {
            entries: vec![],
            assigned: vec![],
            next_index: 1,
            utf8s: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            name_and_types: HashMap::new(),
            field_refs: HashMap::new(),
            method_refs: HashMap::new(),
            interface_method_refs: HashMap::new(),
        }
    }

    fn push_entry(&mut self, entry: PoolEntry) -> PoolHandle {
        let handle = PoolHandle(self.entries.len() as u32);
        self.entries.push(entry);
        self.assigned.push(None);
        handle
    }

    pub fn entry(&self, handle: PoolHandle) -> &PoolEntry {
        &self.entries[handle.0 as usize]
    }

    /// Text of an interned `CONSTANT_Utf8` entry
    pub fn utf8_text(&self, handle: Utf8Handle) -> &str {
        match self.entry(handle.0) {
            PoolEntry::Utf8(text) => text,
            _ => unreachable!("Utf8Handle always points at a Utf8 entry"),
        }
    }

    /// Name string of an interned `CONSTANT_Class` entry
    pub fn class_name(&self, handle: ClassHandle) -> &str {
        match self.entry(handle.0) {
            PoolEntry::Class(utf8) => self.utf8_text(*utf8),
            _ => unreachable!("ClassHandle always points at a Class entry"),
        }
    }

    pub fn get_utf8(&mut self, text: &str) -> Utf8Handle {
        if let Some(&handle) = self.utf8s.get(text) {
            return handle;
        }
        let handle = Utf8Handle(self.push_entry(PoolEntry::Utf8(text.to_string())));
        self.utf8s.insert(text.to_string(), handle);
        handle
    }

    pub fn get_integer(&mut self, value: i32) -> PoolHandle {
        if let Some(&handle) = self.integers.get(&value) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::Integer(value));
        self.integers.insert(value, handle);
        handle
    }

    pub fn get_float(&mut self, value: f32) -> PoolHandle {
        let key = value.to_be_bytes();
        if let Some(&handle) = self.floats.get(&key) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::Float(value));
        self.floats.insert(key, handle);
        handle
    }

    pub fn get_long(&mut self, value: i64) -> PoolHandle {
        if let Some(&handle) = self.longs.get(&value) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::Long(value));
        self.longs.insert(value, handle);
        handle
    }

    pub fn get_double(&mut self, value: f64) -> PoolHandle {
        let key = value.to_be_bytes();
        if let Some(&handle) = self.doubles.get(&key) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::Double(value));
        self.doubles.insert(key, handle);
        handle
    }

    /// Intern a class entry; `name` is a binary class name or, for array classes, a descriptor
    pub fn get_class(&mut self, name: &str) -> ClassHandle {
        let utf8 = self.get_utf8(name);
        if let Some(&handle) = self.classes.get(&utf8) {
            return handle;
        }
        let handle = ClassHandle(self.push_entry(PoolEntry::Class(utf8)));
        self.classes.insert(utf8, handle);
        handle
    }

    pub fn get_string(&mut self, text: &str) -> PoolHandle {
        let utf8 = self.get_utf8(text);
        if let Some(&handle) = self.strings.get(&utf8) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::Str(utf8));
        self.strings.insert(utf8, handle);
        handle
    }

    pub fn get_name_and_type(&mut self, name: &str, descriptor: &str) -> NameAndTypeHandle {
        let name = self.get_utf8(name);
        let descriptor = self.get_utf8(descriptor);
        if let Some(&handle) = self.name_and_types.get(&(name, descriptor)) {
            return handle;
        }
        let handle = NameAndTypeHandle(self.push_entry(PoolEntry::NameAndType(name, descriptor)));
        self.name_and_types.insert((name, descriptor), handle);
        handle
    }

    pub fn get_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> PoolHandle {
        let class = self.get_class(class);
        let nat = self.get_name_and_type(name, descriptor);
        if let Some(&handle) = self.field_refs.get(&(class, nat)) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::FieldRef(class, nat));
        self.field_refs.insert((class, nat), handle);
        handle
    }

    pub fn get_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> PoolHandle {
        let class = self.get_class(class);
        let nat = self.get_name_and_type(name, descriptor);
        if let Some(&handle) = self.method_refs.get(&(class, nat)) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::MethodRef(class, nat));
        self.method_refs.insert((class, nat), handle);
        handle
    }

    pub fn get_interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> PoolHandle {
        let class = self.get_class(class);
        let nat = self.get_name_and_type(name, descriptor);
        if let Some(&handle) = self.interface_method_refs.get(&(class, nat)) {
            return handle;
        }
        let handle = self.push_entry(PoolEntry::InterfaceMethodRef(class, nat));
        self.interface_method_refs.insert((class, nat), handle);
        handle
    }

    /// Number the entries that do not yet have a class file index
    ///
    /// String, integer and float entries come first so that constant loads of them stay eligible
    /// for the short `ldc` form. Long and double entries consume two slots each. Running out of
    /// the format's 65535 indices is fatal.
    pub fn assign_indices(&mut self) -> Result<()> {
        let unassigned: Vec<usize> = (0..self.entries.len())
            .filter(|&at| self.assigned[at].is_none())
            .collect();

        let passes = [true, false];
        for priority in passes {
            for &at in &unassigned {
                if self.entries[at].index_priority() != priority {
                    continue;
                }
                let width = self.entries[at].width();
                let next = self.next_index as usize + width;
                if next > u16::MAX as usize + 1 {
                    log::error!(
                        "Constant pool overflow assigning entry {:?}",
                        self.entries[at]
                    );
                    return Err(Error::ConstantPoolOverflow {
                        used: self.next_index as usize,
                    });
                }
                self.assigned[at] = Some(self.next_index);
                self.next_index = next as u16;
            }
        }
        Ok(())
    }

    /// Class file index of an interned entry (only valid after [`ConstantPool::assign_indices`])
    pub fn index_of(&self, handle: impl Into<PoolHandle>) -> Result<u16> {
        let handle = handle.into();
        self.assigned[handle.0 as usize].ok_or(Error::UnassignedConstant(handle))
    }

    /// Look up an already-interned utf8 entry's class file index
    ///
    /// Serialization is split into an interning phase and a writing phase; the writing phase uses
    /// these content lookups and must never see a constant the interning phase missed.
    pub fn utf8_index(&self, text: &str) -> Result<u16> {
        match self.utf8s.get(text) {
            Some(&handle) => self.index_of(handle),
            None => Err(Error::ConstantNotInterned {
                kind: "Utf8",
                value: text.to_string(),
            }),
        }
    }

    /// Look up an already-interned class entry's class file index
    pub fn class_index(&self, name: &str) -> Result<u16> {
        let missing = || Error::ConstantNotInterned {
            kind: "Class",
            value: name.to_string(),
        };
        let utf8 = self.utf8s.get(name).ok_or_else(missing)?;
        let handle = self.classes.get(utf8).ok_or_else(missing)?;
        self.index_of(*handle)
    }

    /// Look up an already-interned string entry's class file index
    pub fn string_index(&self, text: &str) -> Result<u16> {
        let missing = || Error::ConstantNotInterned {
            kind: "String",
            value: text.to_string(),
        };
        let utf8 = self.utf8s.get(text).ok_or_else(missing)?;
        let handle = self.strings.get(utf8).ok_or_else(missing)?;
        self.index_of(*handle)
    }

    pub fn integer_index(&self, value: i32) -> Result<u16> {
        match self.integers.get(&value) {
            Some(&handle) => self.index_of(handle),
            None => Err(Error::ConstantNotInterned {
                kind: "Integer",
                value: value.to_string(),
            }),
        }
    }

    pub fn float_index(&self, value: f32) -> Result<u16> {
        match self.floats.get(&value.to_be_bytes()) {
            Some(&handle) => self.index_of(handle),
            None => Err(Error::ConstantNotInterned {
                kind: "Float",
                value: value.to_string(),
            }),
        }
    }

    pub fn long_index(&self, value: i64) -> Result<u16> {
        match self.longs.get(&value) {
            Some(&handle) => self.index_of(handle),
            None => Err(Error::ConstantNotInterned {
                kind: "Long",
                value: value.to_string(),
            }),
        }
    }

    pub fn double_index(&self, value: f64) -> Result<u16> {
        match self.doubles.get(&value.to_be_bytes()) {
            Some(&handle) => self.index_of(handle),
            None => Err(Error::ConstantNotInterned {
                kind: "Double",
                value: value.to_string(),
            }),
        }
    }

    /// Number of entries interned (not slots, and not the serialized count field)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the `constant_pool_count` field followed by every entry in index order
    pub fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let mut by_index: Vec<(u16, usize)> = vec![];
        for (at, assigned) in self.assigned.iter().enumerate() {
            let index = assigned.ok_or(Error::UnassignedConstant(PoolHandle(at as u32)))?;
            by_index.push((index, at));
        }
        by_index.sort_unstable();

        self.next_index.serialize(writer)?;
        for (_, at) in by_index {
            self.serialize_entry(&self.entries[at], writer)?;
        }
        Ok(())
    }

    fn serialize_entry<W: WriteBytesExt>(&self, entry: &PoolEntry, writer: &mut W) -> Result<()> {
        match entry {
            PoolEntry::Utf8(text) => {
                let buffer = encode_modified_utf8(text);
                if buffer.len() > u16::MAX as usize {
                    return Err(Error::SectionCountOverflow {
                        section: "CONSTANT_Utf8",
                        count: buffer.len(),
                    });
                }
                tag::UTF8.serialize(writer)?;
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer).map_err(Error::IoError)?;
            }
            PoolEntry::Integer(value) => {
                tag::INTEGER.serialize(writer)?;
                value.serialize(writer)?;
            }
            PoolEntry::Float(value) => {
                tag::FLOAT.serialize(writer)?;
                value.serialize(writer)?;
            }
            PoolEntry::Long(value) => {
                tag::LONG.serialize(writer)?;
                value.serialize(writer)?;
            }
            PoolEntry::Double(value) => {
                tag::DOUBLE.serialize(writer)?;
                value.serialize(writer)?;
            }
            PoolEntry::Class(name) => {
                tag::CLASS.serialize(writer)?;
                self.index_of(*name)?.serialize(writer)?;
            }
            PoolEntry::Str(utf8) => {
                tag::STRING.serialize(writer)?;
                self.index_of(*utf8)?.serialize(writer)?;
            }
            PoolEntry::FieldRef(class, nat) => {
                tag::FIELDREF.serialize(writer)?;
                self.index_of(*class)?.serialize(writer)?;
                self.index_of(*nat)?.serialize(writer)?;
            }
            PoolEntry::MethodRef(class, nat) => {
                tag::METHODREF.serialize(writer)?;
                self.index_of(*class)?.serialize(writer)?;
                self.index_of(*nat)?.serialize(writer)?;
            }
            PoolEntry::InterfaceMethodRef(class, nat) => {
                tag::INTERFACEMETHODREF.serialize(writer)?;
                self.index_of(*class)?.serialize(writer)?;
                self.index_of(*nat)?.serialize(writer)?;
            }
            PoolEntry::NameAndType(name, descriptor) => {
                tag::NAMEANDTYPE.serialize(writer)?;
                self.index_of(*name)?.serialize(writer)?;
                self.index_of(*descriptor)?.serialize(writer)?;
            }
        }
        Ok(())
    }
}

/// A constant pool decoded from a class file, along with the mapping from the file's indices back
/// to interned handles
///
/// Everything read out of the same class file shares one of these.
pub struct LoadedPool {
    pub pool: ConstantPool,
    handles: Vec<Option<PoolHandle>>,
}

impl LoadedPool {
    /// Read the `constant_pool_count` field and the entries that follow
    ///
    /// Entries are first captured in raw form (tags plus unresolved index operands) and then
    /// resolved recursively into interned entries, so forward references between entries are fine.
    /// Reference cycles are not legal in the format and are reported as errors.
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<LoadedPool> {
        let count = u16::deserialize(reader)?;
        let mut raw: Vec<Option<RawEntry>> = vec![None; count as usize];

        let mut index = 1usize;
        while index < count as usize {
            let tag = u8::deserialize(reader)?;
            let entry = match tag {
                tag::UTF8 => {
                    let length = u16::deserialize(reader)?;
                    let mut buffer = vec![0u8; length as usize];
                    reader.read_exact(&mut buffer)?;
                    let text = decode_modified_utf8(&buffer).ok_or(Error::MalformedUtf8 {
                        index: index as u16,
                    })?;
                    RawEntry::Utf8(text)
                }
                tag::INTEGER => RawEntry::Integer(i32::deserialize(reader)?),
                tag::FLOAT => RawEntry::Float(f32::deserialize(reader)?),
                tag::LONG => RawEntry::Long(i64::deserialize(reader)?),
                tag::DOUBLE => RawEntry::Double(f64::deserialize(reader)?),
                tag::CLASS => RawEntry::Class(u16::deserialize(reader)?),
                tag::STRING => RawEntry::Str(u16::deserialize(reader)?),
                tag::FIELDREF => {
                    RawEntry::FieldRef(u16::deserialize(reader)?, u16::deserialize(reader)?)
                }
                tag::METHODREF => {
                    RawEntry::MethodRef(u16::deserialize(reader)?, u16::deserialize(reader)?)
                }
                tag::INTERFACEMETHODREF => RawEntry::InterfaceMethodRef(
                    u16::deserialize(reader)?,
                    u16::deserialize(reader)?,
                ),
                tag::NAMEANDTYPE => {
                    RawEntry::NameAndType(u16::deserialize(reader)?, u16::deserialize(reader)?)
                }
                other => return Err(Error::InvalidConstantTag(other)),
            };
            let two_slots = matches!(entry, RawEntry::Long(_) | RawEntry::Double(_));
            raw[index] = Some(entry);
            index += if two_slots { 2 } else { 1 };
        }

        let mut resolver = Resolver {
            raw: &raw,
            pool: ConstantPool::new(),
            states: vec![ResolveState::Unvisited; count as usize],
        };
        for at in 1..count as usize {
            if raw[at].is_some() {
                resolver.resolve(at as u16)?;
            }
        }

        let handles = resolver
            .states
            .into_iter()
            .map(|state| match state {
                ResolveState::Done(handle) => Some(handle),
                _ => None,
            })
            .collect();
        Ok(LoadedPool {
            pool: resolver.pool,
            handles,
        })
    }

    pub fn handle(&self, index: u16) -> Result<PoolHandle> {
        self.handles
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or(Error::InvalidConstantReference { index })
    }

    pub fn entry(&self, index: u16) -> Result<&PoolEntry> {
        Ok(self.pool.entry(self.handle(index)?))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.entry(index)? {
            PoolEntry::Utf8(text) => Ok(text),
            _ => Err(Error::WrongConstantKind {
                index,
                expected: "CONSTANT_Utf8",
            }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.entry(index)? {
            PoolEntry::Class(utf8) => Ok(self.pool.utf8_text(*utf8)),
            _ => Err(Error::WrongConstantKind {
                index,
                expected: "CONSTANT_Class",
            }),
        }
    }

    /// Class name and name-and-type parts of a field/method/interface-method reference
    pub fn member_ref(&self, index: u16) -> Result<(&str, &str, &str)> {
        let (class, nat) = match self.entry(index)? {
            PoolEntry::FieldRef(class, nat)
            | PoolEntry::MethodRef(class, nat)
            | PoolEntry::InterfaceMethodRef(class, nat) => (*class, *nat),
            _ => {
                return Err(Error::WrongConstantKind {
                    index,
                    expected: "CONSTANT_Fieldref/Methodref/InterfaceMethodref",
                })
            }
        };
        let (name, descriptor) = match self.pool.entry(nat.into()) {
            PoolEntry::NameAndType(name, descriptor) => (*name, *descriptor),
            _ => return Err(Error::InvalidConstantReference { index }),
        };
        Ok((
            self.pool.class_name(class),
            self.pool.utf8_text(name),
            self.pool.utf8_text(descriptor),
        ))
    }
}

#[derive(Clone, Debug)]
enum RawEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Str(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

#[derive(Copy, Clone)]
enum ResolveState {
    Unvisited,
    Visiting,
    Done(PoolHandle),
}

struct Resolver<'a> {
    raw: &'a [Option<RawEntry>],
    pool: ConstantPool,
    states: Vec<ResolveState>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, index: u16) -> Result<PoolHandle> {
        match self.states.get(index as usize) {
            Some(ResolveState::Done(handle)) => return Ok(*handle),
            Some(ResolveState::Visiting) => {
                return Err(Error::InvalidConstantReference { index })
            }
            Some(ResolveState::Unvisited) => (),
            None => return Err(Error::InvalidConstantReference { index }),
        }
        let raw = match &self.raw[index as usize] {
            Some(raw) => raw.clone(),
            None => return Err(Error::InvalidConstantReference { index }),
        };
        self.states[index as usize] = ResolveState::Visiting;

        let handle = match raw {
            RawEntry::Utf8(text) => self.pool.get_utf8(&text).into(),
            RawEntry::Integer(value) => self.pool.get_integer(value),
            RawEntry::Float(value) => self.pool.get_float(value),
            RawEntry::Long(value) => self.pool.get_long(value),
            RawEntry::Double(value) => self.pool.get_double(value),
            RawEntry::Class(name) => {
                let name = self.resolve_utf8(name)?;
                self.pool.get_class(&name).into()
            }
            RawEntry::Str(utf8) => {
                let text = self.resolve_utf8(utf8)?;
                self.pool.get_string(&text)
            }
            RawEntry::FieldRef(class, nat) => {
                let (class, name, descriptor) = self.resolve_member_parts(class, nat)?;
                self.pool.get_field_ref(&class, &name, &descriptor)
            }
            RawEntry::MethodRef(class, nat) => {
                let (class, name, descriptor) = self.resolve_member_parts(class, nat)?;
                self.pool.get_method_ref(&class, &name, &descriptor)
            }
            RawEntry::InterfaceMethodRef(class, nat) => {
                let (class, name, descriptor) = self.resolve_member_parts(class, nat)?;
                self.pool
                    .get_interface_method_ref(&class, &name, &descriptor)
            }
            RawEntry::NameAndType(name, descriptor) => {
                let name = self.resolve_utf8(name)?;
                let descriptor = self.resolve_utf8(descriptor)?;
                self.pool.get_name_and_type(&name, &descriptor).into()
            }
        };
        self.states[index as usize] = ResolveState::Done(handle);
        Ok(handle)
    }

    fn resolve_utf8(&mut self, index: u16) -> Result<String> {
        let handle = self.resolve(index)?;
        match self.pool.entry(handle) {
            PoolEntry::Utf8(text) => Ok(text.clone()),
            _ => Err(Error::WrongConstantKind {
                index,
                expected: "CONSTANT_Utf8",
            }),
        }
    }

    fn resolve_member_parts(&mut self, class: u16, nat: u16) -> Result<(String, String, String)> {
        let class_handle = self.resolve(class)?;
        let class_name = match self.pool.entry(class_handle) {
            PoolEntry::Class(utf8) => self.pool.utf8_text(*utf8).to_string(),
            _ => {
                return Err(Error::WrongConstantKind {
                    index: class,
                    expected: "CONSTANT_Class",
                })
            }
        };
        let nat_handle = self.resolve(nat)?;
        let (name, descriptor) = match self.pool.entry(nat_handle) {
            PoolEntry::NameAndType(name, descriptor) => (
                self.pool.utf8_text(*name).to_string(),
                self.pool.utf8_text(*descriptor).to_string(),
            ),
            _ => {
                return Err(Error::WrongConstantKind {
                    index: nat,
                    expected: "CONSTANT_NameAndType",
                })
            }
        };
        Ok((class_name, name, descriptor))
    }
}

/// Encode a string into "modified UTF-8", the encoding `CONSTANT_Utf8` entries use
///
/// This is ordinary UTF-8 except that `\u{0000}` is encoded in two bytes (so the output contains
/// no zero bytes) and supplementary characters are encoded as surrogate pairs of three bytes each.
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    fn three_byte_unit(buffer: &mut Vec<u8>, unit: u32) {
        buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
        buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
        buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
    }

    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        let code = c as u32;
        match code {
            0x0001..=0x007F => buffer.push(code as u8),
            // `\u{0000}` takes the two byte form so the output never contains a zero byte
            0x0000..=0x07FF => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            0x0800..=0xFFFF => three_byte_unit(&mut buffer, code),
            // Above the BMP: a surrogate pair, each half in the three byte form
            _ => {
                let reduced = code - 0x1_0000;
                three_byte_unit(&mut buffer, 0xD800 | (reduced >> 10));
                three_byte_unit(&mut buffer, 0xDC00 | (reduced & 0x3FF));
            }
        }
    }
    buffer
}

/// Number of bytes a single character occupies under modified UTF-8
pub fn modified_utf8_len(c: char) -> usize {
    if c == '\u{0000}' {
        2
    } else if c.len_utf8() == 4 {
        6
    } else {
        c.len_utf8()
    }
}

/// Inverse of [`encode_modified_utf8`]; `None` means the bytes are not valid modified UTF-8
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    fn code_unit(bytes: &[u8], at: &mut usize) -> Option<u32> {
        let b = *bytes.get(*at)?;
        if b & 0x80 == 0 {
            // A zero byte is never legal; `\u{0000}` uses the two byte form
            if b == 0 {
                return None;
            }
            *at += 1;
            Some(b as u32)
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(*at + 1)?;
            if b2 & 0xC0 != 0x80 {
                return None;
            }
            *at += 2;
            Some((b as u32 & 0x1F) << 6 | (b2 as u32 & 0x3F))
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(*at + 1)?;
            let b3 = *bytes.get(*at + 2)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return None;
            }
            *at += 3;
            Some((b as u32 & 0x0F) << 12 | (b2 as u32 & 0x3F) << 6 | (b3 as u32 & 0x3F))
        } else {
            None
        }
    }

    let mut out = String::new();
    let mut at = 0;
    while at < bytes.len() {
        let unit = code_unit(bytes, &mut at)?;
        if (0xD800..0xDC00).contains(&unit) {
            // High surrogate: must pair with an immediately following low surrogate
            let low = code_unit(bytes, &mut at)?;
            if !(0xDC00..0xE000).contains(&low) {
                return None;
            }
            let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            out.push(char::from_u32(combined)?);
        } else if (0xDC00..0xE000).contains(&unit) {
            // Unpaired low surrogate
            return None;
        } else {
            out.push(char::from_u32(unit)?);
        }
    }
    Some(out)
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn embedded_null() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(
            decode_modified_utf8(&[97, 192, 128, 97]).unwrap(),
            "a\x00a".to_string()
        );
    }

    #[test]
    fn ascii() {
        assert_eq!(encode_modified_utf8("Object"), b"Object".to_vec());
        assert_eq!(decode_modified_utf8(b"Object").unwrap(), "Object");
    }

    #[test]
    fn two_and_three_byte_forms() {
        for s in ["héllo", "π≈3", "日本語"] {
            let encoded = encode_modified_utf8(s);
            assert_eq!(decode_modified_utf8(&encoded).unwrap(), s);
        }
    }

    #[test]
    fn supplementary_characters() {
        // U+1D11E musical G clef: six bytes in modified UTF-8, not the four of real UTF-8
        let encoded = encode_modified_utf8("𝄞");
        assert_eq!(encoded, vec![0xED, 0xA0, 0xB4, 0xED, 0xB4, 0x9E]);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "𝄞");
        assert_eq!(modified_utf8_len('𝄞'), 6);
    }

    #[test]
    fn rejects_raw_zero_and_truncation() {
        assert_eq!(decode_modified_utf8(&[0]), None);
        assert_eq!(decode_modified_utf8(&[0xC3]), None);
        assert_eq!(decode_modified_utf8(&[0xED, 0xA0, 0x80]), None); // unpaired surrogate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.get_utf8("java/lang/Object");
        let b = pool.get_utf8("java/lang/Object");
        assert_eq!(a, b);

        let c1 = pool.get_class("java/lang/Object");
        let c2 = pool.get_class("java/lang/Object");
        assert_eq!(c1, c2);

        let m1 = pool.get_method_ref("A", "f", "()V");
        let m2 = pool.get_method_ref("A", "f", "()V");
        assert_eq!(m1, m2);

        // Same bits, same entry; different zero signs, different entries
        assert_eq!(pool.get_float(1.5), pool.get_float(1.5));
        assert_ne!(pool.get_float(0.0), pool.get_float(-0.0));

        // Class and method ref share the underlying utf8/class entries: 8 entries total
        // (Object utf8, Object class, "A" utf8, A class, "f", "()V", NameAndType, MethodRef)
        // plus the three numeric ones
        assert_eq!(pool.len(), 11);
    }

    #[test]
    fn priority_entries_are_numbered_first() {
        let mut pool = ConstantPool::new();
        let long = pool.get_long(1 << 40);
        let class = pool.get_class("A");
        let string = pool.get_string("hello");
        let int = pool.get_integer(42);
        pool.assign_indices().unwrap();

        let long_index = pool.index_of(long).unwrap();
        let class_index = pool.index_of(class).unwrap();
        let string_index = pool.index_of(string).unwrap();
        let int_index = pool.index_of(int).unwrap();

        assert!(string_index < long_index);
        assert!(int_index < long_index);
        assert!(string_index < class_index);
        assert_eq!(string_index, 1);
        assert_eq!(int_index, 2);
    }

    #[test]
    fn long_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.get_long(7);
        let class = pool.get_class("A");
        let utf8 = pool.get_utf8("A");
        pool.assign_indices().unwrap();

        let long_index = pool.index_of(long).unwrap();
        let next_index = pool
            .index_of(class)
            .unwrap()
            .min(pool.index_of(utf8).unwrap());
        assert_eq!(next_index, long_index + 2);
    }

    #[test]
    fn assignment_is_incremental() {
        let mut pool = ConstantPool::new();
        let first = pool.get_integer(1);
        pool.assign_indices().unwrap();
        let first_index = pool.index_of(first).unwrap();

        let second = pool.get_integer(2);
        pool.assign_indices().unwrap();
        assert_eq!(pool.index_of(first).unwrap(), first_index);
        assert!(pool.index_of(second).unwrap() > first_index);
    }

    #[test]
    fn pool_overflow() {
        let mut pool = ConstantPool::new();
        for value in 0..40_000i64 {
            pool.get_long(value);
        }
        match pool.assign_indices() {
            Err(Error::ConstantPoolOverflow { .. }) => (),
            other => panic!("expected constant pool overflow, got {:?}", other.err()),
        }
    }

    #[test]
    fn serialize_and_read_back() {
        let mut pool = ConstantPool::new();
        pool.get_string("hello");
        pool.get_integer(-7);
        pool.get_double(2.5);
        let field_ref = pool.get_field_ref("A", "x", "I");
        pool.get_interface_method_ref("I", "m", "()V");
        pool.assign_indices().unwrap();

        let mut buffer: Vec<u8> = vec![];
        pool.serialize(&mut buffer).unwrap();

        let loaded = LoadedPool::read(&mut &buffer[..]).unwrap();
        assert_eq!(loaded.pool.len(), pool.len());

        let field_index = pool.index_of(field_ref).unwrap();
        assert_eq!(
            loaded.member_ref(field_index).unwrap(),
            ("A", "x", "I")
        );
    }

    #[test]
    fn read_rejects_bad_tag() {
        // count = 2, then a bogus tag byte
        let buffer = [0x00u8, 0x02, 0xFF];
        match LoadedPool::read(&mut &buffer[..]) {
            Err(Error::InvalidConstantTag(0xFF)) => (),
            other => panic!("expected invalid tag, got {:?}", other.err()),
        }
    }

    #[test]
    fn read_rejects_dangling_reference() {
        // count = 2, a Class entry pointing at slot 9 which does not exist
        let buffer = [0x00u8, 0x02, 7, 0x00, 0x09];
        assert!(matches!(
            LoadedPool::read(&mut &buffer[..]),
            Err(Error::InvalidConstantReference { index: 9 })
        ));
    }
}
