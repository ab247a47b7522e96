//! Arena node forms for unresolved instructions
//!
//! Each node knows its fixed byte pattern (or how to derive one once offsets, local slots, and
//! pool indices exist) and its operand stack delta. Branches carry labels; nothing in here is a
//! byte offset.

use crate::code::sink::{EqComparison, OrdComparison, ValueKind};
use crate::code::{Label, LocalId};
use crate::pool::PoolHandle;
use crate::util::Width;

/// Opcode bytes used by the assembler and the disassembler
pub(crate) mod op {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_0: u8 = 0x03;
    pub const LCONST_0: u8 = 0x09;
    pub const FCONST_0: u8 = 0x0b;
    pub const DCONST_0: u8 = 0x0e;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;

    pub const ILOAD: u8 = 0x15; // ..through ALOAD = 0x19
    pub const ILOAD_0: u8 = 0x1a; // ..through ALOAD_3 = 0x2d
    pub const IALOAD: u8 = 0x2e; // ..through SALOAD = 0x35
    pub const ISTORE: u8 = 0x36; // ..through ASTORE = 0x3a
    pub const ISTORE_0: u8 = 0x3b; // ..through ASTORE_3 = 0x4e
    pub const IASTORE: u8 = 0x4f; // ..through SASTORE = 0x56

    pub const POP: u8 = 0x57;
    pub const POP2: u8 = 0x58;
    pub const DUP: u8 = 0x59;
    pub const DUP_X1: u8 = 0x5a;
    pub const DUP_X2: u8 = 0x5b;
    pub const DUP2: u8 = 0x5c;
    pub const DUP2_X1: u8 = 0x5d;
    pub const DUP2_X2: u8 = 0x5e;
    pub const SWAP: u8 = 0x5f;

    pub const IADD: u8 = 0x60; // ..DADD = 0x63
    pub const ISUB: u8 = 0x64;
    pub const IMUL: u8 = 0x68;
    pub const IDIV: u8 = 0x6c;
    pub const IREM: u8 = 0x70;
    pub const INEG: u8 = 0x74;
    pub const ISHL: u8 = 0x78;
    pub const ISHR: u8 = 0x7a;
    pub const IUSHR: u8 = 0x7c;
    pub const IAND: u8 = 0x7e;
    pub const IOR: u8 = 0x80;
    pub const IXOR: u8 = 0x82;
    pub const IINC: u8 = 0x84;

    pub const I2L: u8 = 0x85;
    pub const I2F: u8 = 0x86;
    pub const I2D: u8 = 0x87;
    pub const L2I: u8 = 0x88;
    pub const L2F: u8 = 0x89;
    pub const L2D: u8 = 0x8a;
    pub const F2I: u8 = 0x8b;
    pub const F2L: u8 = 0x8c;
    pub const F2D: u8 = 0x8d;
    pub const D2I: u8 = 0x8e;
    pub const D2L: u8 = 0x8f;
    pub const D2F: u8 = 0x90;
    pub const I2B: u8 = 0x91;
    pub const I2C: u8 = 0x92;
    pub const I2S: u8 = 0x93;

    pub const LCMP: u8 = 0x94;
    pub const FCMPL: u8 = 0x95;
    pub const FCMPG: u8 = 0x96;
    pub const DCMPL: u8 = 0x97;
    pub const DCMPG: u8 = 0x98;

    pub const IFEQ: u8 = 0x99; // ..IFLE = 0x9e
    pub const IF_ICMPEQ: u8 = 0x9f; // ..IF_ICMPLE = 0xa4
    pub const IF_ACMPEQ: u8 = 0xa5;
    pub const IF_ACMPNE: u8 = 0xa6;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac; // ..ARETURN = 0xb0
    pub const RETURN: u8 = 0xb1;

    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;

    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const ARRAYLENGTH: u8 = 0xbe;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const MONITORENTER: u8 = 0xc2;
    pub const MONITOREXIT: u8 = 0xc3;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
}

/// A fixed byte pattern of at most three bytes
#[derive(Copy, Clone, Debug)]
pub(crate) struct Fixed {
    bytes: [u8; 3],
    len: u8,
}

impl Fixed {
    pub fn one(opcode: u8) -> Fixed {
        Fixed {
            bytes: [opcode, 0, 0],
            len: 1,
        }
    }

    pub fn two(opcode: u8, operand: u8) -> Fixed {
        Fixed {
            bytes: [opcode, operand, 0],
            len: 2,
        }
    }

    pub fn three(opcode: u8, operands: [u8; 2]) -> Fixed {
        Fixed {
            bytes: [opcode, operands[0], operands[1]],
            len: 3,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl Width for Fixed {
    fn width(&self) -> usize {
        self.len as usize
    }
}

/// Extra operand bytes following a pool index operand
#[derive(Copy, Clone, Debug)]
pub(crate) enum PoolRefTail {
    None,
    /// `invokeinterface`'s argument slot count and the mandatory zero byte
    InterfaceCount(u8),
    /// `multianewarray`'s dimension count
    Dimensions(u8),
}

impl PoolRefTail {
    pub fn len(&self) -> usize {
        match self {
            PoolRefTail::None => 0,
            PoolRefTail::InterfaceCount(_) => 2,
            PoolRefTail::Dimensions(_) => 1,
        }
    }
}

/// Conditional and unconditional jumps (everything that takes a single label operand)
#[derive(Copy, Clone, Debug)]
pub(crate) enum BranchKind {
    /// Compare an int against zero
    If(OrdComparison),
    /// Compare two ints
    IfICmp(OrdComparison),
    /// Compare two references
    IfACmp(EqComparison),
    /// Compare a reference against null (`EQ` is `ifnull`)
    IfNull(EqComparison),
    Goto,
}

impl BranchKind {
    pub fn opcode(&self) -> u8 {
        fn ord_offset(comparison: OrdComparison) -> u8 {
            match comparison {
                OrdComparison::EQ => 0,
                OrdComparison::NE => 1,
                OrdComparison::LT => 2,
                OrdComparison::GE => 3,
                OrdComparison::GT => 4,
                OrdComparison::LE => 5,
            }
        }
        match self {
            BranchKind::If(comparison) => op::IFEQ + ord_offset(*comparison),
            BranchKind::IfICmp(comparison) => op::IF_ICMPEQ + ord_offset(*comparison),
            BranchKind::IfACmp(EqComparison::EQ) => op::IF_ACMPEQ,
            BranchKind::IfACmp(EqComparison::NE) => op::IF_ACMPNE,
            BranchKind::IfNull(EqComparison::EQ) => op::IFNULL,
            BranchKind::IfNull(EqComparison::NE) => op::IFNONNULL,
            BranchKind::Goto => op::GOTO,
        }
    }

    /// Values popped before either edge is taken
    pub fn pops(&self) -> i16 {
        match self {
            BranchKind::If(_) | BranchKind::IfNull(_) => 1,
            BranchKind::IfICmp(_) | BranchKind::IfACmp(_) => 2,
            BranchKind::Goto => 0,
        }
    }

    pub fn falls_through(&self) -> bool {
        !matches!(self, BranchKind::Goto)
    }

    /// Opposite condition, used when widening a conditional jump past the 16-bit range
    pub fn negate(&self) -> Option<BranchKind> {
        Some(match self {
            BranchKind::If(comparison) => BranchKind::If(!*comparison),
            BranchKind::IfICmp(comparison) => BranchKind::IfICmp(!*comparison),
            BranchKind::IfACmp(comparison) => BranchKind::IfACmp(!*comparison),
            BranchKind::IfNull(comparison) => BranchKind::IfNull(!*comparison),
            BranchKind::Goto => return None,
        })
    }
}

/// Operations on a local variable; the slot number is patched in at resolution
#[derive(Copy, Clone, Debug)]
pub(crate) enum LocalInsn {
    Load(ValueKind),
    Store(ValueKind),
    Iinc(i16),
}

/// An instruction arena node
///
/// Stack deltas are computed when the verb is accepted and stored on the node; flow analysis only
/// propagates them. `Branch`/`Jsr` nodes start in the 16-bit encoding and may be widened by the
/// layout pass (widening is one-way).
#[derive(Clone, Debug)]
pub(crate) enum Insn {
    /// Fixed byte pattern with a known stack delta
    Plain {
        bytes: Fixed,
        stack: i16,
        /// Instruction ends the flow (returns, `athrow`)
        terminal: bool,
    },

    /// Opcode followed by a 16-bit constant pool index (plus possibly a tail)
    PoolRef {
        opcode: u8,
        constant: PoolHandle,
        tail: PoolRefTail,
        stack: i16,
    },

    /// Constant load whose form (`ldc`/`ldc_w`/`ldc2_w`) depends on the assigned pool index
    LoadConst {
        constant: PoolHandle,
        two_slots: bool,
    },

    /// Zero-width label marker
    Mark(Label),

    Branch {
        kind: BranchKind,
        target: Label,
    },

    /// Subroutine call; pushes the return address
    Jsr {
        target: Label,
    },

    /// Subroutine return through a local variable
    Ret {
        var: LocalId,
    },

    /// Multi-way branch; `dense` selects `tableswitch` over `lookupswitch` and was chosen by
    /// computed byte size at construction. `cases` are sorted and duplicate-free.
    Switch {
        default: Label,
        cases: Vec<(i32, Label)>,
        dense: bool,
    },

    /// Typed load/store/increment of a local variable
    Local {
        insn: LocalInsn,
        var: LocalId,
    },
}

impl Insn {
    /// Operand stack delta, for every node whose delta does not depend on flow context
    /// (`Jsr`/`Ret` are special-cased by flow analysis)
    pub fn stack_delta(&self) -> Option<i16> {
        Some(match self {
            Insn::Plain { stack, .. } | Insn::PoolRef { stack, .. } => *stack,
            Insn::LoadConst { two_slots, .. } => {
                if *two_slots {
                    2
                } else {
                    1
                }
            }
            Insn::Mark(_) => 0,
            Insn::Local { insn, .. } => match insn {
                LocalInsn::Load(kind) => kind.width() as i16,
                LocalInsn::Store(kind) => -(kind.width() as i16),
                LocalInsn::Iinc(_) => 0,
            },
            Insn::Branch { .. } | Insn::Switch { .. } | Insn::Jsr { .. } | Insn::Ret { .. } => {
                return None
            }
        })
    }
}
