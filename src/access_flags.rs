use crate::binary_format::{Deserialize, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

bitflags::bitflags! {
    pub struct ClassAccessFlags: u16 {
        /// Declared `public` (may be accessed from outside its package)
        const PUBLIC = 0x0001;
        /// Declared `final` (no subclasses allowed)
        const FINAL = 0x0010;
        /// Treat superclass methods specially when dispatching `invokespecial`
        const SUPER = 0x0020;
        /// Is an interface, not a class
        const INTERFACE = 0x0200;
        /// Declared `abstract` (must not be instantiated)
        const ABSTRACT = 0x0400;
        /// Declared synthetic (not present in the source code)
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an `enum` class
        const ENUM = 0x4000;
        /// Is a module, not a class or interface
        const MODULE = 0x8000;
    }
}

bitflags::bitflags! {
    pub struct FieldAccessFlags: u16 {
        /// Declared `public` (may be accessed from outside its package)
        const PUBLIC = 0x0001;
        /// Declared `private` (accessible only within the defining class and other classes
        /// belonging to the same nest)
        const PRIVATE = 0x0002;
        /// Declared `protected` (may be accessed within subclasses)
        const PROTECTED = 0x0004;
        /// Declared `static`
        const STATIC = 0x0008;
        /// Declared `final` (never directly assigned to after object construction)
        const FINAL = 0x0010;
        /// Declared `volatile` (cannot be cached)
        const VOLATILE = 0x0040;
        /// Declared `transient` (not written or read by a persistent object manager)
        const TRANSIENT = 0x0080;
        /// Declared synthetic (not present in the source code)
        const SYNTHETIC = 0x1000;
        /// Declared as an element of an `enum` class
        const ENUM = 0x4000;
    }
}

bitflags::bitflags! {
    pub struct MethodAccessFlags: u16 {
        /// Declared `public` (may be accessed from outside its package)
        const PUBLIC = 0x0001;
        /// Declared `private` (accessible only within the defining class and other classes
        /// belonging to the same nest)
        const PRIVATE = 0x0002;
        /// Declared `protected` (may be accessed within subclasses)
        const PROTECTED = 0x0004;
        /// Declared `static`
        const STATIC = 0x0008;
        /// Declared `final` (must not be overridden)
        const FINAL = 0x0010;
        /// Declared `synchronized` (invocation is wrapped by a monitor use)
        const SYNCHRONIZED = 0x0020;
        /// A bridge method, generated by the compiler
        const BRIDGE = 0x0040;
        /// Declared with variable number of arguments
        const VARARGS = 0x0080;
        /// Declared `native` (implemented in a language other than Java)
        const NATIVE = 0x0100;
        /// Declared `abstract` (no implementation is provided)
        const ABSTRACT = 0x0400;
        /// Declared `strictfp` (floating-point mode is FP-strict)
        const STRICT = 0x0800;
        /// Declared synthetic (not present in the source code)
        const SYNTHETIC = 0x1000;
    }
}

bitflags::bitflags! {
    pub struct InnerClassAccessFlags: u16 {
        /// Marked or implicitly `public` in source
        const PUBLIC = 0x0001;
        /// Marked `private` in source
        const PRIVATE = 0x0002;
        /// Marked `protected` in source
        const PROTECTED = 0x0004;
        /// Marked or implicitly `static` in source
        const STATIC = 0x0008;
        /// Marked or implicitly `final` in source
        const FINAL = 0x0010;
        /// Was an `interface` in source
        const INTERFACE = 0x0200;
        /// Marked or implicitly `abstract` in source
        const ABSTRACT = 0x0400;
        /// Declared synthetic (not present in the source code)
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an `enum` class
        const ENUM = 0x4000;
    }
}

macro_rules! flags_binary_format_impls {
    ($flags:ty) => {
        impl Serialize for $flags {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                self.bits().serialize(writer)
            }
        }

        impl Deserialize for $flags {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                // Bits we don't model are dropped rather than rejected; the format reserves them
                u16::deserialize(reader).map(Self::from_bits_truncate)
            }
        }
    };
}

flags_binary_format_impls!(ClassAccessFlags);
flags_binary_format_impls!(FieldAccessFlags);
flags_binary_format_impls!(MethodAccessFlags);
flags_binary_format_impls!(InnerClassAccessFlags);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_bits() {
        let mut buf: Vec<u8> = vec![];
        (ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER)
            .serialize(&mut buf)
            .unwrap();
        assert_eq!(buf, vec![0x00, 0x21]);

        let read_back = MethodAccessFlags::deserialize(&mut &[0x00u8, 0x09][..]).unwrap();
        assert_eq!(
            read_back,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC
        );
    }
}
