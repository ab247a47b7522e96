//! Instruction assembly engine
//!
//! Code is built up by calling the verb methods of [`InstructionSink`] on a [`CodeBuilder`].
//! Instructions accumulate in a flat arena ([`Insn`] nodes addressed by position); labels are
//! zero-width marker nodes, so inserting a jump target never shifts anything. Nothing has a byte
//! offset until [`Code::resolve`] runs the two resolution passes (stack depth flow analysis, then
//! the byte layout fixed point) and produces a serialized-form [`CodeBody`].

mod builder;
mod flow;
mod insn;
mod layout;
mod sink;

pub use builder::CodeBuilder;
pub use sink::{
    ArithOp, ArrayKind, CompareMode, EqComparison, FieldRef, InstructionSink, MethodRef,
    NumericKind, OrdComparison, PrimitiveTarget, StackOp, ValueKind,
};

pub(crate) use insn::op;
pub(crate) use insn::{BranchKind, Fixed, Insn, LocalInsn};

use crate::descriptors::FieldType;
use crate::errors::{Error, Result};
use crate::model::Attribute;
use crate::names::BinaryName;
use crate::pool::ConstantPool;
use crate::util::Width;

/// Jump target handle
///
/// Labels are allocated by the instruction acceptor ([`InstructionSink::fresh_label`]) and become
/// positions only when placed. Jumps may refer to labels that have not been placed yet.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(pub(crate) u32);

/// Local variable handle
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LocalId(pub(crate) u32);

#[derive(Clone, Debug)]
pub(crate) struct LocalVar {
    pub ty: FieldType<BinaryName>,
    pub name: Option<String>,

    /// Fixed for `this` and parameters; everything else gets a slot at resolution
    pub fixed_slot: Option<u16>,
}

/// An exception handler registered during assembly (labels, not yet byte offsets)
#[derive(Clone, Debug)]
pub(crate) struct HandlerSpec {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<BinaryName>,
}

/// Finished (but unresolved) method body
///
/// Produced by [`CodeBuilder::finish`]; turned into a [`CodeBody`] by [`Code::resolve`] once the
/// constant pool it was built against has had indices assigned.
#[derive(Debug)]
pub struct Code {
    pub(crate) insns: Vec<Insn>,

    /// One entry per label: the arena position of its marker node (`None` until placed)
    pub(crate) label_nodes: Vec<Option<usize>>,

    pub(crate) locals: Vec<LocalVar>,

    /// Slots occupied by `this` and the parameters
    pub(crate) param_slots: u16,

    pub(crate) handlers: Vec<HandlerSpec>,

    /// `(arena position, line)` pairs recorded by `line_number`
    pub(crate) line_numbers: Vec<(usize, u16)>,
}

impl Code {
    pub(crate) fn node_of(&self, label: Label) -> usize {
        self.label_nodes[label.0 as usize]
            .unwrap_or_else(|| unreachable!("labels are all placed when `finish` succeeds"))
    }

    /// Run the resolution passes and produce the serialized form of the body
    ///
    /// `pool` must be the pool the code was built against, after index assignment. Resolution
    /// does not mutate the code, so it can be re-run (eg. to serialize the same class twice).
    pub fn resolve(&self, pool: &ConstantPool) -> Result<CodeBody> {
        let (slots, max_locals) = self.assign_slots()?;
        let max_stack = flow::max_stack(self)?;
        let layout = layout::layout(self, pool, &slots)?;
        let bytecode = layout::emit(self, &layout, pool, &slots)?;

        let mut handlers = Vec::with_capacity(self.handlers.len());
        for spec in &self.handlers {
            handlers.push(ExceptionHandler {
                start_pc: layout.offsets[self.node_of(spec.start)] as u16,
                end_pc: layout.offsets[self.node_of(spec.end)] as u16,
                handler_pc: layout.offsets[self.node_of(spec.handler)] as u16,
                catch_type: spec.catch_type.clone(),
            });
        }

        let mut attributes = vec![];
        if !self.line_numbers.is_empty() {
            let table = self
                .line_numbers
                .iter()
                .map(|&(node, line)| {
                    let pc = if node < self.insns.len() {
                        layout.offsets[node] as u16
                    } else {
                        layout.total as u16
                    };
                    (pc, line)
                })
                .collect();
            attributes.push(Attribute::LineNumberTable(table));
        }
        let named_locals: Vec<crate::model::LocalVariableEntry> = self
            .locals
            .iter()
            .enumerate()
            .filter_map(|(at, local)| {
                local.name.as_ref().map(|name| crate::model::LocalVariableEntry {
                    start_pc: 0,
                    length: layout.total as u16,
                    name: name.clone(),
                    descriptor: local.ty.clone(),
                    slot: slots[at],
                })
            })
            .collect();
        if !named_locals.is_empty() {
            attributes.push(Attribute::LocalVariableTable(named_locals));
        }

        Ok(CodeBody {
            max_stack,
            max_locals,
            bytecode,
            handlers,
            attributes,
        })
    }

    /// Give every local a slot: `this`/parameters keep their fixed slots, the rest get
    /// monotonically increasing fresh slots in declaration order (slots are never reused)
    fn assign_slots(&self) -> Result<(Vec<u16>, u16)> {
        let mut slots = Vec::with_capacity(self.locals.len());
        let mut next_free = self.param_slots as usize;
        for local in &self.locals {
            match local.fixed_slot {
                Some(slot) => slots.push(slot),
                None => {
                    slots.push(next_free as u16);
                    next_free += local.ty.width();
                    if next_free > u16::MAX as usize + 1 {
                        return Err(Error::MethodLocalsOverflow(next_free));
                    }
                }
            }
        }
        Ok((slots, next_free as u16))
    }
}

/// Serialized form of a method body: the contents of a `Code` attribute
///
/// This is what reading a class file recovers and what [`Code::resolve`] produces. The bytecode
/// references constant pool indices, so a body is only meaningful next to the pool it was
/// resolved against (or decoded with).
#[derive(Clone, Debug, PartialEq)]
pub struct CodeBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytecode: Vec<u8>,
    pub handlers: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

/// One entry of a `Code` attribute's exception table, with the catch type kept symbolic
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,

    /// `None` catches everything (the `finally` encoding)
    pub catch_type: Option<BinaryName>,
}
