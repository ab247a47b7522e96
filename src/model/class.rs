use crate::access_flags::{ClassAccessFlags, InnerClassAccessFlags};
use crate::binary_format::{Deserialize, Serialize};
use crate::errors::{Error, Result};
use crate::model::{
    read_attribute, Attribute, AttributeRegistry, Field, InnerClassEntry, Method, Version,
};
use crate::names::{BinaryName, Name};
use crate::pool::{ConstantPool, LoadedPool};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const MAGIC: u32 = 0xCAFE_BABE;

/// One declared type, held symbolically
///
/// The constant pool is deliberately not part of the class: it is passed in explicitly wherever
/// it is needed, and method bodies must have been assembled against the same pool the class is
/// later serialized with.
pub struct Class {
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub this_class: BinaryName,

    /// `None` only for `java/lang/Object`
    pub super_class: Option<BinaryName>,

    pub interfaces: Vec<BinaryName>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,

    /// Nested classes created through [`Class::add_nested_class`]; serialized as separate units
    pub nested: Vec<Class>,

    pub enclosing: Option<BinaryName>,
    pub short_name: Option<String>,

    /// Ordinal counter for anonymous nested classes, owned by this class
    next_anonymous: u16,
}

impl Class {
    pub fn new(
        access_flags: ClassAccessFlags,
        this_class: BinaryName,
        super_class: Option<BinaryName>,
    ) -> Class {
        Class {
            version: Version::JAVA5,
            access_flags,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            nested: vec![],
            enclosing: None,
            short_name: None,
            next_anonymous: 0,
        }
    }

    /// Add an implemented interface (duplicates by name are dropped)
    pub fn add_interface(&mut self, interface: BinaryName) {
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn add_method(&mut self, method: Method) {
        self.methods.push(method);
    }

    /// Create a nested class, registering the matching `InnerClasses` entry on both sides
    ///
    /// A `None` short name makes an anonymous class, named by an ordinal counter owned by this
    /// class (`Outer$1`, `Outer$2`, ...).
    pub fn add_nested_class(
        &mut self,
        short_name: Option<&str>,
        access_flags: ClassAccessFlags,
    ) -> &mut Class {
        let nested_name = match short_name {
            Some(short_name) => self.this_class.nested(short_name),
            None => {
                self.next_anonymous += 1;
                self.this_class.nested(&self.next_anonymous.to_string())
            }
        };
        let entry = InnerClassEntry {
            inner: nested_name.clone(),
            outer: short_name.map(|_| self.this_class.clone()),
            short_name: short_name.map(String::from),
            access_flags: InnerClassAccessFlags::from_bits_truncate(access_flags.bits()),
        };

        let mut nested = Class::new(access_flags, nested_name, Some(BinaryName::OBJECT));
        nested.enclosing = Some(self.this_class.clone());
        nested.short_name = short_name.map(String::from);
        nested.inner_classes_mut().push(entry.clone());
        self.inner_classes_mut().push(entry);

        self.nested.push(nested);
        self.nested
            .last_mut()
            .unwrap_or_else(|| unreachable!("a class was just pushed"))
    }

    fn inner_classes_mut(&mut self) -> &mut Vec<InnerClassEntry> {
        let position = self
            .attributes
            .iter()
            .position(|attribute| matches!(attribute, Attribute::InnerClasses(_)));
        let at = match position {
            Some(at) => at,
            None => {
                self.attributes.push(Attribute::InnerClasses(vec![]));
                self.attributes.len() - 1
            }
        };
        match &mut self.attributes[at] {
            Attribute::InnerClasses(entries) => entries,
            _ => unreachable!("position matched an InnerClasses attribute"),
        }
    }

    fn check_section(section: &'static str, count: usize) -> Result<u16> {
        u16::try_from(count).map_err(|_| Error::SectionCountOverflow { section, count })
    }

    /// Serialize this class (not its nested classes) into a class file stream
    ///
    /// Runs in three phases: intern every structural constant, assign pool indices, then write.
    /// Pool mutation is confined to the first two phases, which is what lets method bodies be
    /// resolved (and re-resolved) against an immutable pool.
    pub fn serialize<W: WriteBytesExt>(
        &self,
        pool: &mut ConstantPool,
        writer: &mut W,
    ) -> Result<()> {
        pool.get_class(self.this_class.as_str());
        if let Some(super_class) = &self.super_class {
            pool.get_class(super_class.as_str());
        }
        for interface in &self.interfaces {
            pool.get_class(interface.as_str());
        }
        for field in &self.fields {
            field.intern(pool)?;
        }
        for method in &self.methods {
            method.intern(pool)?;
        }
        for attribute in &self.attributes {
            attribute.intern(pool)?;
        }

        pool.assign_indices()?;

        MAGIC.serialize(writer)?;
        self.version.serialize(writer)?;
        pool.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        pool.class_index(self.this_class.as_str())?
            .serialize(writer)?;
        match &self.super_class {
            Some(super_class) => pool.class_index(super_class.as_str())?,
            None => 0,
        }
        .serialize(writer)?;

        Class::check_section("interfaces", self.interfaces.len())?.serialize(writer)?;
        for interface in &self.interfaces {
            pool.class_index(interface.as_str())?.serialize(writer)?;
        }
        Class::check_section("fields", self.fields.len())?.serialize(writer)?;
        for field in &self.fields {
            field.serialize(pool, writer)?;
        }
        Class::check_section("methods", self.methods.len())?.serialize(writer)?;
        for method in &self.methods {
            method.serialize(pool, writer)?;
        }
        Class::check_section("attributes", self.attributes.len())?.serialize(writer)?;
        for attribute in &self.attributes {
            attribute.serialize(pool, writer)?;
        }
        Ok(())
    }

    /// Write this class and every nested class under `directory`, one `.class` file each
    pub fn save_to_path(&self, pool: &mut ConstantPool, directory: &Path) -> Result<()> {
        let path = directory.join(format!("{}.class", self.this_class.as_str()));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        self.serialize(pool, &mut file)?;
        for nested in &self.nested {
            nested.save_to_path(pool, directory)?;
        }
        Ok(())
    }

    /// Read one class file; nested classes stored in other units are not followed
    /// (see [`Class::read_tree`])
    pub fn read<R: ReadBytesExt>(
        reader: &mut R,
        registry: &AttributeRegistry,
    ) -> Result<(Class, LoadedPool)> {
        let magic = u32::deserialize(reader)?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::deserialize(reader)?;
        let pool = LoadedPool::read(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;

        let this_class = read_class_name(reader, &pool)?;
        let super_index = u16::deserialize(reader)?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(binary_name(pool.class_name(super_index)?)?)
        };

        let interface_count = u16::deserialize(reader)?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(read_class_name(reader, &pool)?);
        }

        let field_count = u16::deserialize(reader)?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(Field::read(reader, &pool, registry)?);
        }

        let method_count = u16::deserialize(reader)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(Method::read(reader, &pool, registry)?);
        }

        let attribute_count = u16::deserialize(reader)?;
        let mut attributes = Vec::with_capacity(attribute_count as usize);
        for _ in 0..attribute_count {
            attributes.push(read_attribute(reader, &pool, registry)?);
        }

        let mut class = Class {
            version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
            nested: vec![],
            enclosing: None,
            short_name: None,
            next_anonymous: 0,
        };
        let own_entry = class
            .inner_class_entries()
            .iter()
            .find(|entry| entry.inner == class.this_class)
            .map(|entry| (entry.outer.clone(), entry.short_name.clone()));
        if let Some((outer, short_name)) = own_entry {
            class.enclosing = outer;
            class.short_name = short_name;
        }
        Ok((class, pool))
    }

    /// Read a class and, following its `InnerClasses` entries, every nested class the source can
    /// provide, into one tree
    ///
    /// An already-loaded name set guards against reference cycles in malformed input. Nested
    /// classes the source cannot provide are skipped.
    pub fn read_tree(
        source: &mut dyn ClassDataSource,
        root: &str,
        registry: &AttributeRegistry,
    ) -> Result<LoadedClass> {
        let mut loaded_names = HashSet::new();
        let bytes = source.class_bytes(root)?.ok_or_else(|| {
            Error::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no class data for {}", root),
            ))
        })?;
        read_unit(source, root, &bytes, registry, &mut loaded_names)
    }

    fn inner_class_entries(&self) -> &[InnerClassEntry] {
        for attribute in &self.attributes {
            if let Attribute::InnerClasses(entries) = attribute {
                return entries;
            }
        }
        &[]
    }
}

fn binary_name(name: &str) -> Result<BinaryName> {
    BinaryName::from_string(name.to_string()).map_err(Error::InvalidName)
}

fn read_class_name<R: ReadBytesExt>(reader: &mut R, pool: &LoadedPool) -> Result<BinaryName> {
    let index = u16::deserialize(reader)?;
    binary_name(pool.class_name(index)?)
}

fn read_unit(
    source: &mut dyn ClassDataSource,
    name: &str,
    bytes: &[u8],
    registry: &AttributeRegistry,
    loaded_names: &mut HashSet<String>,
) -> Result<LoadedClass> {
    loaded_names.insert(name.to_string());
    let (class, pool) = Class::read(&mut &bytes[..], registry)?;

    let nested_names: Vec<String> = class
        .inner_class_entries()
        .iter()
        .filter(|entry| entry.outer.as_ref() == Some(&class.this_class))
        .map(|entry| entry.inner.as_str().to_string())
        .collect();

    let mut nested = vec![];
    for nested_name in nested_names {
        if loaded_names.contains(&nested_name) {
            continue;
        }
        match source.class_bytes(&nested_name)? {
            Some(nested_bytes) => {
                nested.push(read_unit(
                    source,
                    &nested_name,
                    &nested_bytes,
                    registry,
                    loaded_names,
                )?);
            }
            None => log::warn!("nested class {} has no class data, skipping", nested_name),
        }
    }

    Ok(LoadedClass {
        class,
        pool,
        nested,
    })
}

/// A class read from a class file, next to the pool its code attributes reference
pub struct LoadedClass {
    pub class: Class,
    pub pool: LoadedPool,
    pub nested: Vec<LoadedClass>,
}

/// External provider of class file bytes, consulted when following nested classes across units
pub trait ClassDataSource {
    /// Bytes of the class file for `name`, or `None` if this source does not have it
    fn class_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>>;
}

impl ClassDataSource for std::collections::HashMap<String, Vec<u8>> {
    fn class_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_flags::FieldAccessFlags;
    use crate::descriptors::FieldType;
    use crate::names::UnqualifiedName;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn sample_class() -> Class {
        let mut class = Class::new(
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            BinaryName::from_static("com/example/Widget"),
            Some(BinaryName::OBJECT),
        );
        class.add_interface(BinaryName::from_static("java/io/Serializable"));
        class.add_field(Field::new(
            FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
            UnqualifiedName::from_static("count"),
            FieldType::int(),
        ));
        class.attributes.push(Attribute::SourceFile("Widget.java".to_string()));
        class
    }

    fn round_trip(class: &Class) -> Class {
        let mut pool = ConstantPool::new();
        let mut buffer: Vec<u8> = vec![];
        class.serialize(&mut pool, &mut buffer).unwrap();
        let registry = AttributeRegistry::standard();
        let (read_back, _) = Class::read(&mut &buffer[..], &registry).unwrap();
        read_back
    }

    #[test]
    fn serialize_read_round_trip() {
        let class = sample_class();
        let read_back = round_trip(&class);
        assert_eq!(read_back.version, Version::JAVA5);
        assert_eq!(read_back.access_flags, class.access_flags);
        assert_eq!(read_back.this_class, class.this_class);
        assert_eq!(read_back.super_class, class.super_class);
        assert_eq!(read_back.interfaces, class.interfaces);
        assert_eq!(read_back.fields.len(), 1);
        assert_eq!(read_back.fields[0].name, class.fields[0].name);
        assert_eq!(read_back.fields[0].descriptor, class.fields[0].descriptor);
        assert_eq!(read_back.attributes, class.attributes);
    }

    #[test]
    fn interface_add_deduplicates() {
        let mut class = sample_class();
        class.add_interface(BinaryName::from_static("java/io/Serializable"));
        assert_eq!(class.interfaces.len(), 1);
    }

    #[test]
    fn nested_class_registered_on_both_sides() {
        let mut class = sample_class();
        class.add_nested_class(Some("Inner"), ClassAccessFlags::PUBLIC);

        let expected = InnerClassEntry {
            inner: BinaryName::from_static("com/example/Widget$Inner"),
            outer: Some(BinaryName::from_static("com/example/Widget")),
            short_name: Some("Inner".to_string()),
            access_flags: InnerClassAccessFlags::PUBLIC,
        };
        assert_eq!(class.inner_class_entries(), &[expected.clone()]);
        assert_eq!(class.nested[0].inner_class_entries(), &[expected]);
        assert_eq!(
            class.nested[0].enclosing,
            Some(BinaryName::from_static("com/example/Widget")),
        );
    }

    #[test]
    fn anonymous_nested_classes_get_ordinals() {
        let mut class = sample_class();
        let first = class.add_nested_class(None, ClassAccessFlags::empty()).this_class.clone();
        let second = class.add_nested_class(None, ClassAccessFlags::empty()).this_class.clone();
        assert_eq!(first, BinaryName::from_static("com/example/Widget$1"));
        assert_eq!(second, BinaryName::from_static("com/example/Widget$2"));
        let entries = class.inner_class_entries();
        assert_eq!(entries[0].outer, None);
        assert_eq!(entries[0].short_name, None);
    }

    #[test]
    fn read_tree_follows_nested_units() {
        let mut outer = sample_class();
        outer.add_nested_class(Some("Inner"), ClassAccessFlags::PUBLIC);

        let mut units: HashMap<String, Vec<u8>> = HashMap::new();
        let mut pool = ConstantPool::new();
        let mut outer_bytes: Vec<u8> = vec![];
        outer.serialize(&mut pool, &mut outer_bytes).unwrap();
        units.insert("com/example/Widget".to_string(), outer_bytes);
        let mut inner_pool = ConstantPool::new();
        let mut inner_bytes: Vec<u8> = vec![];
        outer.nested[0]
            .serialize(&mut inner_pool, &mut inner_bytes)
            .unwrap();
        units.insert("com/example/Widget$Inner".to_string(), inner_bytes);

        let registry = AttributeRegistry::standard();
        let tree = Class::read_tree(&mut units, "com/example/Widget", &registry).unwrap();
        assert_eq!(tree.class.this_class, BinaryName::from_static("com/example/Widget"));
        assert_eq!(tree.nested.len(), 1);
        assert_eq!(
            tree.nested[0].class.this_class,
            BinaryName::from_static("com/example/Widget$Inner"),
        );
        assert_eq!(tree.nested[0].class.short_name, Some("Inner".to_string()));
    }

    #[test]
    fn read_tree_skips_missing_units() {
        let mut outer = sample_class();
        outer.add_nested_class(Some("Inner"), ClassAccessFlags::PUBLIC);
        let mut units: HashMap<String, Vec<u8>> = HashMap::new();
        let mut pool = ConstantPool::new();
        let mut outer_bytes: Vec<u8> = vec![];
        outer.serialize(&mut pool, &mut outer_bytes).unwrap();
        units.insert("com/example/Widget".to_string(), outer_bytes);

        let registry = AttributeRegistry::standard();
        let tree = Class::read_tree(&mut units, "com/example/Widget", &registry).unwrap();
        assert_eq!(tree.nested.len(), 0);
    }

    #[test]
    fn bad_magic_rejected() {
        let registry = AttributeRegistry::standard();
        let result = Class::read(&mut &[0u8, 1, 2, 3, 4, 5, 6, 7][..], &registry);
        assert!(matches!(result, Err(Error::BadMagic(0x00010203))));
    }
}
