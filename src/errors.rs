use crate::code::{ArithOp, Label, LocalId, NumericKind, PrimitiveTarget, ValueKind};
use crate::descriptors::FieldType;
use crate::names::BinaryName;
use crate::pool::PoolHandle;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    InvalidName(String),
    InvalidDescriptor(String),

    /// An arithmetic/logical verb was asked to combine an operation with a numeric kind that has
    /// no corresponding opcode (eg. bitwise `and` on floats)
    InvalidArithmetic(ArithOp, NumericKind),

    /// `compare` only exists for long, float, and double operands
    InvalidComparison(NumericKind),

    /// No conversion opcode exists between these kinds (eg. long to byte)
    InvalidConversion(NumericKind, PrimitiveTarget),

    /// A load/store verb named a kind incompatible with the variable's declared type
    LocalKindMismatch {
        var: LocalId,
        declared: FieldType<BinaryName>,
        requested: ValueKind,
    },

    /// `increment_local` on a variable that is not an int
    IncrementNonIntLocal(LocalId),

    /// `load_this` inside a static method
    NoThisVariable,

    /// Switch construction saw the same case value twice
    DuplicateSwitchCase(i32),

    /// Two `place_label` calls for the same label (indicates a bug in the caller)
    DuplicateLabel(Label),

    /// At the end of assembly, a jump referred to a label that was never placed
    UnplacedLabel(Label),

    /// The constant pool cannot fit all interned entries in 65535 slots
    ConstantPoolOverflow {
        used: usize,
    },

    /// A constant handle was consulted for its index before index assignment ran
    UnassignedConstant(PoolHandle),

    /// The writing phase of serialization looked up a constant the interning phase never saw
    ConstantNotInterned {
        kind: &'static str,
        value: String,
    },

    /// Flow analysis reached the same instruction at two different operand stack depths
    InconsistentStackDepth {
        at: usize,
        expected: u16,
        found: u16,
    },

    /// Flow analysis computed a negative operand stack depth
    StackUnderflow {
        at: usize,
    },

    /// The operand stack cannot be deeper than 65535
    MethodStackOverflow {
        at: usize,
        depth: i32,
    },

    /// `ret` reached outside of any subroutine body
    RetOutsideSubroutine {
        at: usize,
    },

    /// A subroutine's rets disagree on the subroutine's net stack effect
    InconsistentSubroutine {
        entry: Label,
    },

    /// Flow analysis ran past the last instruction without hitting a return or throw
    CodeFallsOffEnd,

    /// The laid-out method body exceeds what 16-bit program counters can address
    MethodCodeOverflow(usize),

    /// Local variables do not fit in 65535 slots
    MethodLocalsOverflow(usize),

    /// A length-prefixed section has more entries than its 16-bit count can record
    SectionCountOverflow {
        section: &'static str,
        count: usize,
    },

    /// A code attribute read from a class file cannot be re-serialized directly; it must be
    /// re-assembled against the output pool first (see `disasm::reassemble`)
    CodeNotReassembled,

    /// Input does not start with `0xCAFEBABE`
    BadMagic(u32),

    /// Unknown constant pool tag byte
    InvalidConstantTag(u8),

    /// A constant pool entry refers to a slot that is absent, of the wrong kind, or part of a
    /// reference cycle
    InvalidConstantReference {
        index: u16,
    },

    /// A structure expected its index to point at a particular kind of pool entry
    WrongConstantKind {
        index: u16,
        expected: &'static str,
    },

    /// A constant pool string is not valid modified UTF-8
    MalformedUtf8 {
        index: u16,
    },

    /// Unknown or truncated instruction encountered while scanning a method body
    InvalidOpcode {
        at: usize,
        opcode: u8,
    },

    /// A jump or switch in decoded code targets an address outside the method, or one that is not
    /// an instruction boundary
    InvalidJumpTarget {
        at: usize,
        target: i64,
    },

    /// An attribute's contents do not match its declared layout
    MalformedAttribute {
        name: String,
    },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
