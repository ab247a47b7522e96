//! The instruction acceptor interface
//!
//! Every consumer of instruction streams implements [`InstructionSink`]: [`CodeBuilder`] turns
//! verbs into arena nodes, [`CodePrinter`] turns them into a listing, and the disassembler drives
//! either one from decoded bytecode.
//!
//! [`CodeBuilder`]: crate::code::CodeBuilder
//! [`CodePrinter`]: crate::disasm::CodePrinter

use crate::code::{Label, LocalId};
use crate::descriptors::{FieldType, MethodDescriptor, RefType, RenderDescriptor};
use crate::errors::Result;
use crate::names::{BinaryName, UnqualifiedName};
use crate::util::Width;
use std::ops::Not;

/// Kinds of values the typed load/store/return opcode families distinguish
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// Offset of this kind within an opcode family (`iload`, `lload`, `fload`, ...)
    pub(crate) fn family_index(&self) -> u8 {
        match self {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => 4,
        }
    }

    pub(crate) fn from_field_type<C>(ty: &FieldType<C>) -> ValueKind {
        use crate::descriptors::BaseType;
        match ty {
            FieldType::Base(BaseType::Long) => ValueKind::Long,
            FieldType::Base(BaseType::Double) => ValueKind::Double,
            FieldType::Base(BaseType::Float) => ValueKind::Float,
            FieldType::Base(_) => ValueKind::Int,
            FieldType::Ref(_) => ValueKind::Reference,
        }
    }
}

impl Width for ValueKind {
    fn width(&self) -> usize {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }
}

/// Numeric operand kinds of the arithmetic opcode families
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumericKind {
    pub(crate) fn family_index(&self) -> u8 {
        match self {
            NumericKind::Int => 0,
            NumericKind::Long => 1,
            NumericKind::Float => 2,
            NumericKind::Double => 3,
        }
    }

    pub(crate) fn is_integral(&self) -> bool {
        matches!(self, NumericKind::Int | NumericKind::Long)
    }
}

impl Width for NumericKind {
    fn width(&self) -> usize {
        match self {
            NumericKind::Long | NumericKind::Double => 2,
            _ => 1,
        }
    }
}

impl From<NumericKind> for ValueKind {
    fn from(kind: NumericKind) -> ValueKind {
        match kind {
            NumericKind::Int => ValueKind::Int,
            NumericKind::Long => ValueKind::Long,
            NumericKind::Float => ValueKind::Float,
            NumericKind::Double => ValueKind::Double,
        }
    }
}

/// Targets of the conversion opcodes (`i2l`, `f2i`, `i2b`, ...)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum PrimitiveTarget {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
}

impl Width for PrimitiveTarget {
    fn width(&self) -> usize {
        match self {
            PrimitiveTarget::Long | PrimitiveTarget::Double => 2,
            _ => 1,
        }
    }
}

/// Arithmetic, logical, and shift operations
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    /// Shifts and bitwise operations only exist for the integral kinds
    pub(crate) fn integral_only(&self) -> bool {
        matches!(
            self,
            ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr | ArithOp::And | ArithOp::Or | ArithOp::Xor
        )
    }
}

/// Raw operand stack shuffles
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

/// Element kinds of the typed array load/store opcode families
///
/// `boolean[]` and `byte[]` elements share opcodes, but they are distinct for `newarray`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    pub(crate) fn family_index(&self) -> u8 {
        match self {
            ArrayKind::Int => 0,
            ArrayKind::Long => 1,
            ArrayKind::Float => 2,
            ArrayKind::Double => 3,
            ArrayKind::Reference => 4,
            ArrayKind::Byte => 5,
            ArrayKind::Char => 6,
            ArrayKind::Short => 7,
        }
    }

    pub(crate) fn element_width(&self) -> i16 {
        match self {
            ArrayKind::Long | ArrayKind::Double => 2,
            _ => 1,
        }
    }
}

/// Ways of comparing integral numbers or comparing against zero
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OrdComparison {
    /// equal
    EQ,
    /// not equal
    NE,
    /// less than
    LT,
    /// greater than or equal
    GE,
    /// greater than
    GT,
    /// less than or equal
    LE,
}

impl Not for OrdComparison {
    type Output = OrdComparison;

    fn not(self) -> OrdComparison {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::NE => OrdComparison::EQ,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
        }
    }
}

/// Ways of comparing references (or comparing against null)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = EqComparison;

    fn not(self) -> EqComparison {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Whether a floating point comparison treats NaN as the greatest or least value
/// (`fcmpg` vs `fcmpl`)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompareMode {
    G,
    L,
}

/// Symbolic reference to a field
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

impl FieldRef {
    pub fn new(class: BinaryName, name: UnqualifiedName, descriptor: FieldType<BinaryName>) -> FieldRef {
        FieldRef {
            class,
            name,
            descriptor,
        }
    }

    pub fn rendered_descriptor(&self) -> String {
        self.descriptor.render()
    }
}

/// Symbolic reference to a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

impl MethodRef {
    pub fn new(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodRef {
        MethodRef {
            class,
            name,
            descriptor,
        }
    }

    pub fn rendered_descriptor(&self) -> String {
        self.descriptor.render()
    }
}

/// Verb-oriented interface for accepting a stream of instructions
///
/// The caller speaks in terms of typed operations; the implementation decides on encodings. The
/// assembler ([`crate::code::CodeBuilder`]) picks the most compact forms and defers all layout;
/// the printer renders one line per verb; the disassembler folds decoded opcode families back
/// into these verbs, which is what makes round-trip re-encoding possible.
pub trait InstructionSink {
    /// Allocate a label that can be jumped to before it is placed
    fn fresh_label(&mut self) -> Label;

    /// Pin a label to the current position (each label is placed exactly once)
    fn place_label(&mut self, label: Label) -> Result<()>;

    /// Declare a local variable; its slot is chosen at resolution time
    fn new_local(&mut self, ty: FieldType<BinaryName>, name: Option<&str>) -> Result<LocalId>;

    /// Variables holding `this` (for instance methods) and the parameters, in slot order
    fn parameters(&self) -> &[LocalId];

    /// Forget a variable's declared type, turning it into an untyped object reference
    ///
    /// The disassembler calls this when a slot is reused at incompatible types.
    fn widen_local(&mut self, var: LocalId) -> Result<()>;

    fn load_this(&mut self) -> Result<()>;
    fn load_local(&mut self, kind: ValueKind, var: LocalId) -> Result<()>;
    fn store_local(&mut self, kind: ValueKind, var: LocalId) -> Result<()>;
    fn increment_local(&mut self, var: LocalId, amount: i16) -> Result<()>;

    fn push_null(&mut self) -> Result<()>;
    fn push_int(&mut self, value: i32) -> Result<()>;
    fn push_long(&mut self, value: i64) -> Result<()>;
    fn push_float(&mut self, value: f32) -> Result<()>;
    fn push_double(&mut self, value: f64) -> Result<()>;

    /// Push a string constant
    ///
    /// Strings too long for a single `CONSTANT_Utf8` entry are split on code point boundaries
    /// and reassembled at runtime, so there is no length restriction here.
    fn push_string(&mut self, value: &str) -> Result<()>;

    fn arith(&mut self, op: ArithOp, kind: NumericKind) -> Result<()>;

    /// Three-way comparison (`lcmp`, `fcmpl`/`fcmpg`, `dcmpl`/`dcmpg`); not valid for ints
    fn compare(&mut self, kind: NumericKind, nan_bias: CompareMode) -> Result<()>;

    fn convert(&mut self, from: NumericKind, to: PrimitiveTarget) -> Result<()>;
    fn stack_op(&mut self, op: StackOp) -> Result<()>;

    fn get_field(&mut self, field: &FieldRef) -> Result<()>;
    fn put_field(&mut self, field: &FieldRef) -> Result<()>;
    fn get_static(&mut self, field: &FieldRef) -> Result<()>;
    fn put_static(&mut self, field: &FieldRef) -> Result<()>;

    fn invoke_virtual(&mut self, method: &MethodRef) -> Result<()>;
    fn invoke_special(&mut self, method: &MethodRef) -> Result<()>;

    /// `invokespecial` dispatch to a superclass method
    fn invoke_super(&mut self, method: &MethodRef) -> Result<()>;

    fn invoke_static(&mut self, method: &MethodRef) -> Result<()>;
    fn invoke_interface(&mut self, method: &MethodRef) -> Result<()>;

    /// Allocate an uninitialized instance (`new`); constructors run via `invoke_special`
    fn new_object(&mut self, class: &BinaryName) -> Result<()>;

    /// Allocate a one-dimensional array of the given element type
    fn new_array(&mut self, element: &FieldType<BinaryName>) -> Result<()>;

    /// Allocate `dimensions` dimensions of a multi-dimensional array type at once
    fn new_multi_array(&mut self, ty: &RefType<BinaryName>, dimensions: u8) -> Result<()>;

    fn array_load(&mut self, kind: ArrayKind) -> Result<()>;
    fn array_store(&mut self, kind: ArrayKind) -> Result<()>;
    fn array_length(&mut self) -> Result<()>;

    fn check_cast(&mut self, ty: &RefType<BinaryName>) -> Result<()>;
    fn instance_of(&mut self, ty: &RefType<BinaryName>) -> Result<()>;

    fn monitor_enter(&mut self) -> Result<()>;
    fn monitor_exit(&mut self) -> Result<()>;
    fn nop(&mut self) -> Result<()>;

    /// Unconditional jump
    fn jump(&mut self, target: Label) -> Result<()>;

    /// Compare an int against zero and jump
    fn branch_if(&mut self, comparison: OrdComparison, target: Label) -> Result<()>;

    /// Compare two ints and jump
    fn branch_if_icmp(&mut self, comparison: OrdComparison, target: Label) -> Result<()>;

    /// Compare two references and jump
    fn branch_if_acmp(&mut self, comparison: EqComparison, target: Label) -> Result<()>;

    /// Compare a reference against null and jump (`EQ` is `ifnull`)
    fn branch_if_null(&mut self, comparison: EqComparison, target: Label) -> Result<()>;

    /// Multi-way branch on an int; the encoding (dense table or sorted pairs) is chosen by
    /// computed size, and duplicate case values are rejected here
    fn switch(&mut self, default: Label, cases: &[(i32, Label)]) -> Result<()>;

    /// `jsr`: push the return address and jump to a subroutine
    fn call_subroutine(&mut self, target: Label) -> Result<()>;

    /// `ret`: return from a subroutine through the given variable
    fn return_subroutine(&mut self, var: LocalId) -> Result<()>;

    /// Return from the method (`None` for `void`)
    fn return_value(&mut self, kind: Option<ValueKind>) -> Result<()>;

    /// `athrow`
    fn throw(&mut self) -> Result<()>;

    /// Register an exception handler; registration order is the order handlers are consulted in
    fn exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<()>;

    /// Associate the next instruction with a source line
    fn line_number(&mut self, line: u16) -> Result<()>;
}
