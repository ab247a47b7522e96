//! Assembler and disassembler for JVM class files
//!
//! A class is modeled structurally ([`model::Class`], [`model::Field`], [`model::Method`]) with
//! method bodies built through the typed instruction verbs of [`code::InstructionSink`]. The
//! [`code::CodeBuilder`] picks compact encodings and resolves branch layout and stack depths;
//! [`model::Class::serialize`] writes the class file against a shared [`pool::ConstantPool`].
//! Reading goes the other way: [`model::Class::read`] produces the structural model plus a
//! [`pool::LoadedPool`], and [`disasm`] decodes method bodies back into verbs for printing or
//! re-assembly.

pub mod access_flags;
pub mod binary_format;
pub mod code;
pub mod descriptors;
pub mod disasm;
pub mod errors;
pub mod model;
pub mod names;
pub mod pool;
pub mod util;
