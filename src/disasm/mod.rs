//! Decoding bytecode back into instruction verbs
//!
//! The disassembler drives any [`InstructionSink`]: a [`CodePrinter`] for listings, or a fresh
//! [`CodeBuilder`] to re-assemble a read method body against a new constant pool (which is the
//! only way a read class becomes serializable again).

mod printer;

pub use printer::CodePrinter;

use crate::code::op;
use crate::code::{
    ArithOp, ArrayKind, Code, CodeBody, CodeBuilder, CompareMode, EqComparison, FieldRef,
    InstructionSink, Label, LocalId, MethodRef, NumericKind, OrdComparison, PrimitiveTarget,
    StackOp, ValueKind,
};
use crate::descriptors::{
    BaseType, FieldType, MethodDescriptor, ParseDescriptor, RefType,
};
use crate::errors::{Error, Result};
use crate::model::{Attribute, Class, Field, LoadedClass, Method};
use crate::names::{BinaryName, Name, UnqualifiedName};
use crate::pool::{ConstantPool, LoadedPool, PoolEntry};
use crate::util::Width;
use std::collections::{HashMap, HashSet};

/// Decodes one method body at a time into sink verbs
///
/// The decode cursor and the label map are fields, so one `Disassembler` must not be used from
/// two threads at once; concurrent disassembly needs separate instances.
pub struct Disassembler {
    targets: HashSet<u32>,
    labels: HashMap<u32, Label>,
    slots: HashMap<u16, SlotRecord>,
    cursor: usize,
}

enum SlotRecord {
    Known { var: LocalId, kind: ValueKind },
    Widened { var: LocalId },
}

impl Default for Disassembler {
    fn default() -> Disassembler {
        Disassembler::new()
    }
}

impl Disassembler {
    pub fn new() -> Disassembler {
        Disassembler {
            targets: HashSet::new(),
            labels: HashMap::new(),
            slots: HashMap::new(),
            cursor: 0,
        }
    }

    /// Decode `body` in address order, reporting every instruction to `sink`
    ///
    /// `descriptor` and `has_this` must describe the method the body belongs to; the sink must
    /// have been constructed for the same method so the parameter variables line up.
    pub fn disassemble<S: InstructionSink>(
        &mut self,
        body: &CodeBody,
        pool: &LoadedPool,
        descriptor: &MethodDescriptor<BinaryName>,
        has_this: bool,
        sink: &mut S,
    ) -> Result<()> {
        self.targets.clear();
        self.labels.clear();
        self.slots.clear();
        self.cursor = 0;

        self.seed_parameters(descriptor, has_this, sink);
        let named_slots = named_slot_table(body);
        let line_table = line_number_table(body);

        self.collect_targets(body)?;

        let mut handlers_by_pc: HashMap<u32, Vec<usize>> = HashMap::new();
        for (at, handler) in body.handlers.iter().enumerate() {
            handlers_by_pc
                .entry(handler.handler_pc as u32)
                .or_default()
                .push(at);
        }

        while self.cursor < body.bytecode.len() {
            let at = self.cursor as u32;
            if self.targets.contains(&at) {
                let label = self.label_at(at, sink);
                sink.place_label(label)?;
            }
            if let Some(handler_indices) = handlers_by_pc.remove(&at) {
                for handler_index in handler_indices {
                    let handler = &body.handlers[handler_index];
                    let start = self.label_at(handler.start_pc as u32, sink);
                    let end = self.label_at(handler.end_pc as u32, sink);
                    let catch = self.label_at(handler.handler_pc as u32, sink);
                    sink.exception_handler(start, end, catch, handler.catch_type.as_ref())?;
                }
            }
            if let Some(lines) = line_table.get(&at) {
                for &line in lines {
                    sink.line_number(line)?;
                }
            }
            self.decode_insn(body, pool, &named_slots, sink)?;
        }

        // Handler end boundaries may sit one past the last instruction
        let end = body.bytecode.len() as u32;
        if self.targets.contains(&end) {
            let label = self.label_at(end, sink);
            sink.place_label(label)?;
        }

        // A catch address the cursor never landed on points inside an instruction
        if let Some(&pc) = handlers_by_pc.keys().min() {
            return Err(Error::InvalidJumpTarget {
                at: pc as usize,
                target: pc as i64,
            });
        }
        Ok(())
    }

    fn seed_parameters<S: InstructionSink>(
        &mut self,
        descriptor: &MethodDescriptor<BinaryName>,
        has_this: bool,
        sink: &mut S,
    ) {
        let params = sink.parameters().to_vec();
        let mut vars = params.into_iter();
        let mut slot = 0u16;
        if has_this {
            if let Some(var) = vars.next() {
                self.slots.insert(
                    slot,
                    SlotRecord::Known {
                        var,
                        kind: ValueKind::Reference,
                    },
                );
            }
            slot += 1;
        }
        for parameter in &descriptor.parameters {
            let kind = ValueKind::from_field_type(parameter);
            if let Some(var) = vars.next() {
                self.slots.insert(slot, SlotRecord::Known { var, kind });
            }
            slot += parameter.width() as u16;
        }
    }

    fn label_at<S: InstructionSink>(&mut self, address: u32, sink: &mut S) -> Label {
        if let Some(&label) = self.labels.get(&address) {
            return label;
        }
        let label = sink.fresh_label();
        self.labels.insert(address, label);
        label
    }

    /// Variable for a slot access, reconciling the slot's previously seen kind
    ///
    /// A single-slot kind conflict widens the variable to an untyped object placeholder; a width
    /// conflict means the slot was reused for an unrelated value and gets a fresh variable.
    fn local_for<S: InstructionSink>(
        &mut self,
        slot: u16,
        kind: ValueKind,
        named_slots: &HashMap<u16, (String, FieldType<BinaryName>)>,
        sink: &mut S,
    ) -> Result<LocalId> {
        match self.slots.get(&slot) {
            Some(SlotRecord::Widened { var }) if kind.width() == 1 => Ok(*var),
            Some(SlotRecord::Known { var, kind: seen }) if *seen == kind => Ok(*var),
            Some(SlotRecord::Known { var, kind: seen })
                if seen.width() == 1 && kind.width() == 1 =>
            {
                let var = *var;
                sink.widen_local(var)?;
                self.slots.insert(slot, SlotRecord::Widened { var });
                Ok(var)
            }
            _ => self.declare_slot(slot, kind, named_slots, sink),
        }
    }

    fn declare_slot<S: InstructionSink>(
        &mut self,
        slot: u16,
        kind: ValueKind,
        named_slots: &HashMap<u16, (String, FieldType<BinaryName>)>,
        sink: &mut S,
    ) -> Result<LocalId> {
        let var = match named_slots.get(&slot) {
            Some((name, ty)) if ValueKind::from_field_type(ty) == kind => {
                sink.new_local(ty.clone(), Some(name))?
            }
            _ => sink.new_local(placeholder_type(kind), None)?,
        };
        self.slots.insert(slot, SlotRecord::Known { var, kind });
        Ok(var)
    }

    /// Scan 1: find every byte offset that is a branch/switch target or handler boundary
    fn collect_targets(&mut self, body: &CodeBody) -> Result<()> {
        for handler in &body.handlers {
            self.targets.insert(handler.start_pc as u32);
            self.targets.insert(handler.end_pc as u32);
            self.targets.insert(handler.handler_pc as u32);
        }

        let mut reader = ByteReader::new(&body.bytecode);
        while !reader.at_end() {
            let at = reader.position() as i64;
            let opcode = reader.read_u8()?;
            match opcode {
                op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL => {
                    let target = at + reader.read_i16()? as i64;
                    self.targets.insert(self.checked_target(at, target)?);
                }
                op::GOTO_W | op::JSR_W => {
                    let target = at + reader.read_i32()? as i64;
                    self.targets.insert(self.checked_target(at, target)?);
                }
                op::TABLESWITCH => {
                    reader.skip_padding()?;
                    let default = at + reader.read_i32()? as i64;
                    self.targets.insert(self.checked_target(at, default)?);
                    let low = reader.read_i32()? as i64;
                    let high = reader.read_i32()? as i64;
                    for _ in low..=high {
                        let target = at + reader.read_i32()? as i64;
                        self.targets.insert(self.checked_target(at, target)?);
                    }
                }
                op::LOOKUPSWITCH => {
                    reader.skip_padding()?;
                    let default = at + reader.read_i32()? as i64;
                    self.targets.insert(self.checked_target(at, default)?);
                    let npairs = reader.read_i32()?;
                    for _ in 0..npairs {
                        reader.read_i32()?;
                        let target = at + reader.read_i32()? as i64;
                        self.targets.insert(self.checked_target(at, target)?);
                    }
                }
                op::WIDE => {
                    let sub = reader.read_u8()?;
                    reader.skip(if sub == op::IINC { 4 } else { 2 })?;
                }
                other => {
                    let operands = fixed_operand_len(other).ok_or(Error::InvalidOpcode {
                        at: at as usize,
                        opcode: other,
                    })?;
                    reader.skip(operands)?;
                }
            }
        }
        Ok(())
    }

    fn checked_target(&self, at: i64, target: i64) -> Result<u32> {
        if target < 0 || target > u16::MAX as i64 {
            return Err(Error::InvalidJumpTarget {
                at: at as usize,
                target,
            });
        }
        Ok(target as u32)
    }

    fn decode_insn<S: InstructionSink>(
        &mut self,
        body: &CodeBody,
        pool: &LoadedPool,
        named_slots: &HashMap<u16, (String, FieldType<BinaryName>)>,
        sink: &mut S,
    ) -> Result<()> {
        let mut reader = ByteReader::new(&body.bytecode);
        reader.seek(self.cursor);
        let at = reader.position() as i64;
        let opcode = reader.read_u8()?;

        match opcode {
            op::NOP => sink.nop()?,
            op::ACONST_NULL => sink.push_null()?,
            op::ICONST_M1..=0x08 => sink.push_int(opcode as i32 - op::ICONST_0 as i32)?,
            op::LCONST_0 | 0x0a => sink.push_long((opcode - op::LCONST_0) as i64)?,
            op::FCONST_0..=0x0d => sink.push_float((opcode - op::FCONST_0) as f32)?,
            op::DCONST_0 | 0x0f => sink.push_double((opcode - op::DCONST_0) as f64)?,
            op::BIPUSH => sink.push_int(reader.read_i8()? as i32)?,
            op::SIPUSH => sink.push_int(reader.read_i16()? as i32)?,
            op::LDC => {
                let index = reader.read_u8()? as u16;
                self.push_constant(pool, index, false, sink)?;
            }
            op::LDC_W => {
                let index = reader.read_u16()?;
                self.push_constant(pool, index, false, sink)?;
            }
            op::LDC2_W => {
                let index = reader.read_u16()?;
                self.push_constant(pool, index, true, sink)?;
            }
            op::ILOAD..=0x19 => {
                let kind = value_kind(opcode - op::ILOAD);
                let slot = reader.read_u8()? as u16;
                let var = self.local_for(slot, kind, named_slots, sink)?;
                sink.load_local(kind, var)?;
            }
            op::ILOAD_0..=0x2d => {
                let kind = value_kind((opcode - op::ILOAD_0) / 4);
                let slot = ((opcode - op::ILOAD_0) % 4) as u16;
                let var = self.local_for(slot, kind, named_slots, sink)?;
                sink.load_local(kind, var)?;
            }
            op::IALOAD..=0x35 => sink.array_load(array_kind(opcode - op::IALOAD))?,
            op::ISTORE..=0x3a => {
                let kind = value_kind(opcode - op::ISTORE);
                let slot = reader.read_u8()? as u16;
                let var = self.local_for(slot, kind, named_slots, sink)?;
                sink.store_local(kind, var)?;
            }
            op::ISTORE_0..=0x4e => {
                let kind = value_kind((opcode - op::ISTORE_0) / 4);
                let slot = ((opcode - op::ISTORE_0) % 4) as u16;
                let var = self.local_for(slot, kind, named_slots, sink)?;
                sink.store_local(kind, var)?;
            }
            op::IASTORE..=0x56 => sink.array_store(array_kind(opcode - op::IASTORE))?,
            op::POP => sink.stack_op(StackOp::Pop)?,
            op::POP2 => sink.stack_op(StackOp::Pop2)?,
            op::DUP => sink.stack_op(StackOp::Dup)?,
            op::DUP_X1 => sink.stack_op(StackOp::DupX1)?,
            op::DUP_X2 => sink.stack_op(StackOp::DupX2)?,
            op::DUP2 => sink.stack_op(StackOp::Dup2)?,
            op::DUP2_X1 => sink.stack_op(StackOp::Dup2X1)?,
            op::DUP2_X2 => sink.stack_op(StackOp::Dup2X2)?,
            op::SWAP => sink.stack_op(StackOp::Swap)?,
            op::IADD..=0x77 => {
                let index = opcode - op::IADD;
                const OPS: [ArithOp; 6] = [
                    ArithOp::Add,
                    ArithOp::Sub,
                    ArithOp::Mul,
                    ArithOp::Div,
                    ArithOp::Rem,
                    ArithOp::Neg,
                ];
                sink.arith(OPS[(index / 4) as usize], numeric_kind(index % 4))?;
            }
            op::ISHL..=0x7d => {
                let index = opcode - op::ISHL;
                const OPS: [ArithOp; 3] = [ArithOp::Shl, ArithOp::Shr, ArithOp::Ushr];
                sink.arith(OPS[(index / 2) as usize], numeric_kind(index % 2))?;
            }
            op::IAND..=0x83 => {
                let index = opcode - op::IAND;
                const OPS: [ArithOp; 3] = [ArithOp::And, ArithOp::Or, ArithOp::Xor];
                sink.arith(OPS[(index / 2) as usize], numeric_kind(index % 2))?;
            }
            op::IINC => {
                let slot = reader.read_u8()? as u16;
                let amount = reader.read_i8()? as i16;
                let var = self.local_for(slot, ValueKind::Int, named_slots, sink)?;
                sink.increment_local(var, amount)?;
            }
            op::I2L..=op::I2S => {
                let (from, to) = conversion(opcode);
                sink.convert(from, to)?;
            }
            op::LCMP => sink.compare(NumericKind::Long, CompareMode::L)?,
            op::FCMPL => sink.compare(NumericKind::Float, CompareMode::L)?,
            op::FCMPG => sink.compare(NumericKind::Float, CompareMode::G)?,
            op::DCMPL => sink.compare(NumericKind::Double, CompareMode::L)?,
            op::DCMPG => sink.compare(NumericKind::Double, CompareMode::G)?,
            op::IFEQ..=0x9e => {
                let target = self.branch_target(at, reader.read_i16()? as i64, sink)?;
                sink.branch_if(ord_comparison(opcode - op::IFEQ), target)?;
            }
            op::IF_ICMPEQ..=0xa4 => {
                let target = self.branch_target(at, reader.read_i16()? as i64, sink)?;
                sink.branch_if_icmp(ord_comparison(opcode - op::IF_ICMPEQ), target)?;
            }
            op::IF_ACMPEQ | op::IF_ACMPNE => {
                let target = self.branch_target(at, reader.read_i16()? as i64, sink)?;
                let comparison = if opcode == op::IF_ACMPEQ {
                    EqComparison::EQ
                } else {
                    EqComparison::NE
                };
                sink.branch_if_acmp(comparison, target)?;
            }
            op::GOTO => {
                let target = self.branch_target(at, reader.read_i16()? as i64, sink)?;
                sink.jump(target)?;
            }
            op::JSR => {
                let target = self.branch_target(at, reader.read_i16()? as i64, sink)?;
                sink.call_subroutine(target)?;
            }
            op::RET => {
                let slot = reader.read_u8()? as u16;
                let var = self.local_for(slot, ValueKind::Reference, named_slots, sink)?;
                sink.return_subroutine(var)?;
            }
            op::TABLESWITCH => {
                reader.skip_padding()?;
                let default_offset = reader.read_i32()? as i64;
                let default = self.branch_target(at, default_offset, sink)?;
                let low = reader.read_i32()?;
                let high = reader.read_i32()?;
                let mut cases = vec![];
                for value in low as i64..=high as i64 {
                    let offset = reader.read_i32()? as i64;
                    // Filler entries in a dense table are just the default again
                    if offset != default_offset {
                        let target = self.branch_target(at, offset, sink)?;
                        cases.push((value as i32, target));
                    }
                }
                sink.switch(default, &cases)?;
            }
            op::LOOKUPSWITCH => {
                reader.skip_padding()?;
                let default = self.branch_target(at, reader.read_i32()? as i64, sink)?;
                let npairs = reader.read_i32()?;
                let mut cases = Vec::with_capacity(npairs as usize);
                for _ in 0..npairs {
                    let value = reader.read_i32()?;
                    let target = self.branch_target(at, reader.read_i32()? as i64, sink)?;
                    cases.push((value, target));
                }
                sink.switch(default, &cases)?;
            }
            op::IRETURN..=0xb0 => {
                sink.return_value(Some(value_kind(opcode - op::IRETURN)))?
            }
            op::RETURN => sink.return_value(None)?,
            op::GETSTATIC => {
                let field = field_ref(pool, reader.read_u16()?)?;
                sink.get_static(&field)?;
            }
            op::PUTSTATIC => {
                let field = field_ref(pool, reader.read_u16()?)?;
                sink.put_static(&field)?;
            }
            op::GETFIELD => {
                let field = field_ref(pool, reader.read_u16()?)?;
                sink.get_field(&field)?;
            }
            op::PUTFIELD => {
                let field = field_ref(pool, reader.read_u16()?)?;
                sink.put_field(&field)?;
            }
            op::INVOKEVIRTUAL => {
                let method = method_ref(pool, reader.read_u16()?)?;
                sink.invoke_virtual(&method)?;
            }
            op::INVOKESPECIAL => {
                let method = method_ref(pool, reader.read_u16()?)?;
                sink.invoke_special(&method)?;
            }
            op::INVOKESTATIC => {
                let method = method_ref(pool, reader.read_u16()?)?;
                sink.invoke_static(&method)?;
            }
            op::INVOKEINTERFACE => {
                let method = method_ref(pool, reader.read_u16()?)?;
                reader.skip(2)?; // count and the zero byte
                sink.invoke_interface(&method)?;
            }
            op::NEW => {
                let class = binary_name(pool.class_name(reader.read_u16()?)?)?;
                sink.new_object(&class)?;
            }
            op::NEWARRAY => {
                let code = reader.read_u8()?;
                let base = BaseType::from_newarray_code(code).ok_or(Error::InvalidOpcode {
                    at: at as usize,
                    opcode: code,
                })?;
                sink.new_array(&FieldType::Base(base))?;
            }
            op::ANEWARRAY => {
                let element = parse_ref_type(pool.class_name(reader.read_u16()?)?)?;
                sink.new_array(&FieldType::Ref(element))?;
            }
            op::ARRAYLENGTH => sink.array_length()?,
            op::ATHROW => sink.throw()?,
            op::CHECKCAST => {
                let ty = parse_ref_type(pool.class_name(reader.read_u16()?)?)?;
                sink.check_cast(&ty)?;
            }
            op::INSTANCEOF => {
                let ty = parse_ref_type(pool.class_name(reader.read_u16()?)?)?;
                sink.instance_of(&ty)?;
            }
            op::MONITORENTER => sink.monitor_enter()?,
            op::MONITOREXIT => sink.monitor_exit()?,
            op::WIDE => {
                let sub = reader.read_u8()?;
                match sub {
                    op::ILOAD..=0x19 => {
                        let kind = value_kind(sub - op::ILOAD);
                        let slot = reader.read_u16()?;
                        let var = self.local_for(slot, kind, named_slots, sink)?;
                        sink.load_local(kind, var)?;
                    }
                    op::ISTORE..=0x3a => {
                        let kind = value_kind(sub - op::ISTORE);
                        let slot = reader.read_u16()?;
                        let var = self.local_for(slot, kind, named_slots, sink)?;
                        sink.store_local(kind, var)?;
                    }
                    op::IINC => {
                        let slot = reader.read_u16()?;
                        let amount = reader.read_i16()?;
                        let var = self.local_for(slot, ValueKind::Int, named_slots, sink)?;
                        sink.increment_local(var, amount)?;
                    }
                    op::RET => {
                        let slot = reader.read_u16()?;
                        let var =
                            self.local_for(slot, ValueKind::Reference, named_slots, sink)?;
                        sink.return_subroutine(var)?;
                    }
                    other => {
                        return Err(Error::InvalidOpcode {
                            at: at as usize,
                            opcode: other,
                        })
                    }
                }
            }
            op::MULTIANEWARRAY => {
                let ty = parse_ref_type(pool.class_name(reader.read_u16()?)?)?;
                let dimensions = reader.read_u8()?;
                sink.new_multi_array(&ty, dimensions)?;
            }
            op::IFNULL | op::IFNONNULL => {
                let target = self.branch_target(at, reader.read_i16()? as i64, sink)?;
                let comparison = if opcode == op::IFNULL {
                    EqComparison::EQ
                } else {
                    EqComparison::NE
                };
                sink.branch_if_null(comparison, target)?;
            }
            op::GOTO_W => {
                let target = self.branch_target(at, reader.read_i32()? as i64, sink)?;
                sink.jump(target)?;
            }
            op::JSR_W => {
                let target = self.branch_target(at, reader.read_i32()? as i64, sink)?;
                sink.call_subroutine(target)?;
            }
            other => {
                return Err(Error::InvalidOpcode {
                    at: at as usize,
                    opcode: other,
                })
            }
        }

        self.cursor = reader.position();
        Ok(())
    }

    fn branch_target<S: InstructionSink>(
        &mut self,
        at: i64,
        offset: i64,
        sink: &mut S,
    ) -> Result<Label> {
        let address = self.checked_target(at, at + offset)?;
        Ok(self.label_at(address, sink))
    }

    fn push_constant<S: InstructionSink>(
        &mut self,
        pool: &LoadedPool,
        index: u16,
        two_slots: bool,
        sink: &mut S,
    ) -> Result<()> {
        match (pool.entry(index)?, two_slots) {
            (PoolEntry::Integer(value), false) => sink.push_int(*value),
            (PoolEntry::Float(value), false) => sink.push_float(*value),
            (PoolEntry::Str(utf8), false) => {
                let text = pool.pool.utf8_text(*utf8).to_string();
                sink.push_string(&text)
            }
            (PoolEntry::Long(value), true) => sink.push_long(*value),
            (PoolEntry::Double(value), true) => sink.push_double(*value),
            _ => Err(Error::WrongConstantKind {
                index,
                expected: "a loadable constant",
            }),
        }
    }
}

/// Re-assemble a read method body against `out_pool`, producing a body that serializes again
pub fn reassemble(
    body: &CodeBody,
    pool: &LoadedPool,
    this_class: Option<&BinaryName>,
    descriptor: &MethodDescriptor<BinaryName>,
    out_pool: &mut ConstantPool,
) -> Result<Code> {
    let mut builder = CodeBuilder::new(out_pool, this_class, descriptor);
    let mut disassembler = Disassembler::new();
    disassembler.disassemble(body, pool, descriptor, this_class.is_some(), &mut builder)?;
    builder.finish()
}

/// Turn a read class tree back into a writable [`Class`], re-assembling every method body
/// against `out_pool`
pub fn reassemble_class(loaded: &LoadedClass, out_pool: &mut ConstantPool) -> Result<Class> {
    let source = &loaded.class;
    let mut class = Class::new(
        source.access_flags,
        source.this_class.clone(),
        source.super_class.clone(),
    );
    class.version = source.version;
    class.enclosing = source.enclosing.clone();
    class.short_name = source.short_name.clone();
    for interface in &source.interfaces {
        class.add_interface(interface.clone());
    }
    for field in &source.fields {
        let mut copy = Field::new(
            field.access_flags,
            field.name.clone(),
            field.descriptor.clone(),
        );
        copy.attributes = field.attributes.clone();
        class.add_field(copy);
    }
    for method in &source.methods {
        class.add_method(reassemble_method(method, source, &loaded.pool, out_pool)?);
    }
    class.attributes = source.attributes.clone();
    for nested in &loaded.nested {
        class.nested.push(reassemble_class(nested, out_pool)?);
    }
    Ok(class)
}

fn reassemble_method(
    method: &Method,
    class: &Class,
    pool: &LoadedPool,
    out_pool: &mut ConstantPool,
) -> Result<Method> {
    let mut copy = Method::new(
        method.access_flags,
        method.name.clone(),
        method.descriptor.clone(),
    );
    let this_class = if method.is_static() {
        None
    } else {
        Some(&class.this_class)
    };
    for attribute in &method.attributes {
        match attribute {
            Attribute::Code(body) => {
                copy.code = Some(reassemble(
                    body,
                    pool,
                    this_class,
                    &method.descriptor,
                    out_pool,
                )?);
            }
            other => copy.attributes.push(other.clone()),
        }
    }
    Ok(copy)
}

/// Name and declared type per slot, from any `LocalVariableTable` attached to the body
fn named_slot_table(body: &CodeBody) -> HashMap<u16, (String, FieldType<BinaryName>)> {
    let mut table = HashMap::new();
    for attribute in &body.attributes {
        if let Attribute::LocalVariableTable(entries) = attribute {
            for entry in entries {
                table
                    .entry(entry.slot)
                    .or_insert_with(|| (entry.name.clone(), entry.descriptor.clone()));
            }
        }
    }
    table
}

fn line_number_table(body: &CodeBody) -> HashMap<u32, Vec<u16>> {
    let mut table: HashMap<u32, Vec<u16>> = HashMap::new();
    for attribute in &body.attributes {
        if let Attribute::LineNumberTable(entries) = attribute {
            for &(start_pc, line) in entries {
                table.entry(start_pc as u32).or_default().push(line);
            }
        }
    }
    table
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> ByteReader<'a> {
        ByteReader { bytes, position: 0 }
    }

    fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn position(&self) -> usize {
        self.position
    }

    fn at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.position + count > self.bytes.len() {
            return Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "bytecode ends mid-instruction",
            )));
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    /// Skip a switch's alignment padding (operands begin on a 4-byte boundary)
    fn skip_padding(&mut self) -> Result<()> {
        self.skip((4 - (self.position % 4)) % 4)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn value_kind(family: u8) -> ValueKind {
    match family {
        0 => ValueKind::Int,
        1 => ValueKind::Long,
        2 => ValueKind::Float,
        3 => ValueKind::Double,
        _ => ValueKind::Reference,
    }
}

fn numeric_kind(family: u8) -> NumericKind {
    match family {
        0 => NumericKind::Int,
        1 => NumericKind::Long,
        2 => NumericKind::Float,
        _ => NumericKind::Double,
    }
}

fn array_kind(family: u8) -> ArrayKind {
    match family {
        0 => ArrayKind::Int,
        1 => ArrayKind::Long,
        2 => ArrayKind::Float,
        3 => ArrayKind::Double,
        4 => ArrayKind::Reference,
        5 => ArrayKind::Byte,
        6 => ArrayKind::Char,
        _ => ArrayKind::Short,
    }
}

fn ord_comparison(offset: u8) -> OrdComparison {
    match offset {
        0 => OrdComparison::EQ,
        1 => OrdComparison::NE,
        2 => OrdComparison::LT,
        3 => OrdComparison::GE,
        4 => OrdComparison::GT,
        _ => OrdComparison::LE,
    }
}

fn conversion(opcode: u8) -> (NumericKind, PrimitiveTarget) {
    match opcode {
        op::I2L => (NumericKind::Int, PrimitiveTarget::Long),
        op::I2F => (NumericKind::Int, PrimitiveTarget::Float),
        op::I2D => (NumericKind::Int, PrimitiveTarget::Double),
        op::L2I => (NumericKind::Long, PrimitiveTarget::Int),
        op::L2F => (NumericKind::Long, PrimitiveTarget::Float),
        op::L2D => (NumericKind::Long, PrimitiveTarget::Double),
        op::F2I => (NumericKind::Float, PrimitiveTarget::Int),
        op::F2L => (NumericKind::Float, PrimitiveTarget::Long),
        op::F2D => (NumericKind::Float, PrimitiveTarget::Double),
        op::D2I => (NumericKind::Double, PrimitiveTarget::Int),
        op::D2L => (NumericKind::Double, PrimitiveTarget::Long),
        op::D2F => (NumericKind::Double, PrimitiveTarget::Float),
        op::I2B => (NumericKind::Int, PrimitiveTarget::Byte),
        op::I2C => (NumericKind::Int, PrimitiveTarget::Char),
        _ => (NumericKind::Int, PrimitiveTarget::Short),
    }
}

fn placeholder_type(kind: ValueKind) -> FieldType<BinaryName> {
    match kind {
        ValueKind::Int => FieldType::Base(BaseType::Int),
        ValueKind::Long => FieldType::Base(BaseType::Long),
        ValueKind::Float => FieldType::Base(BaseType::Float),
        ValueKind::Double => FieldType::Base(BaseType::Double),
        ValueKind::Reference => FieldType::object(BinaryName::OBJECT),
    }
}

fn binary_name(name: &str) -> Result<BinaryName> {
    BinaryName::from_string(name.to_string()).map_err(Error::InvalidName)
}

fn parse_ref_type(class_info: &str) -> Result<RefType<BinaryName>> {
    RefType::parse_class_info(class_info)
        .map_err(|err| Error::InvalidDescriptor(err.to_string()))
}

fn field_ref(pool: &LoadedPool, index: u16) -> Result<FieldRef> {
    let (class, name, descriptor) = pool.member_ref(index)?;
    Ok(FieldRef {
        class: binary_name(class)?,
        name: UnqualifiedName::from_string(name.to_string()).map_err(Error::InvalidName)?,
        descriptor: FieldType::parse(descriptor)
            .map_err(|err| Error::InvalidDescriptor(err.to_string()))?,
    })
}

fn method_ref(pool: &LoadedPool, index: u16) -> Result<MethodRef> {
    let (class, name, descriptor) = pool.member_ref(index)?;
    Ok(MethodRef {
        class: binary_name(class)?,
        name: UnqualifiedName::from_string(name.to_string()).map_err(Error::InvalidName)?,
        descriptor: MethodDescriptor::parse(descriptor)
            .map_err(|err| Error::InvalidDescriptor(err.to_string()))?,
    })
}

/// Operand byte count for opcodes whose length does not depend on their position
fn fixed_operand_len(opcode: u8) -> Option<usize> {
    Some(match opcode {
        op::BIPUSH | op::LDC | op::NEWARRAY | op::RET => 1,
        op::ILOAD..=0x19 | op::ISTORE..=0x3a => 1,
        op::SIPUSH | op::LDC_W | op::LDC2_W | op::IINC => 2,
        op::GETSTATIC..=op::INVOKESTATIC => 2,
        op::NEW | op::ANEWARRAY | op::CHECKCAST | op::INSTANCEOF => 2,
        op::MULTIANEWARRAY => 3,
        op::INVOKEINTERFACE => 4,
        op::NOP..=0x0f | op::ILOAD_0..=0x35 | op::ISTORE_0..=op::SWAP => 0,
        op::IADD..=0x83 | op::I2L..=op::DCMPG => 0,
        op::IRETURN..=op::RETURN | op::ARRAYLENGTH | op::ATHROW => 0,
        op::MONITORENTER | op::MONITOREXIT => 0,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::ExceptionHandler;
    use pretty_assertions::assert_eq;

    fn loaded_pool() -> LoadedPool {
        let pool = ConstantPool::new();
        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        LoadedPool::read(&mut &bytes[..]).unwrap()
    }

    fn void_descriptor() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        }
    }

    fn body(bytecode: Vec<u8>) -> CodeBody {
        CodeBody {
            max_stack: 2,
            max_locals: 2,
            bytecode,
            handlers: vec![],
            attributes: vec![],
        }
    }

    fn listing(body: &CodeBody, descriptor: &MethodDescriptor<BinaryName>) -> String {
        let pool = loaded_pool();
        let mut printer = CodePrinter::new(vec![], None, descriptor);
        Disassembler::new()
            .disassemble(body, &pool, descriptor, false, &mut printer)
            .unwrap();
        String::from_utf8(printer.into_inner()).unwrap()
    }

    fn round_trip(original: &CodeBody, descriptor: &MethodDescriptor<BinaryName>) -> CodeBody {
        let pool = loaded_pool();
        let mut out_pool = ConstantPool::new();
        let code = reassemble(original, &pool, None, descriptor, &mut out_pool).unwrap();
        out_pool.assign_indices().unwrap();
        code.resolve(&out_pool).unwrap()
    }

    #[test]
    fn forward_branch_listing() {
        // iconst_0; ifne +4; nop; return
        let text = listing(
            &body(vec![0x03, 0x9a, 0x00, 0x04, 0x00, 0xb1]),
            &void_descriptor(),
        );
        assert_eq!(
            text,
            "  push int 0\n  ifne L0\n  nop\nL0:\n  return\n"
        );
    }

    #[test]
    fn arithmetic_round_trip() {
        // bipush 100; iconst_2; imul; pop; return
        let original = body(vec![0x10, 100, 0x05, 0x68, 0x57, 0xb1]);
        let rebuilt = round_trip(&original, &void_descriptor());
        assert_eq!(rebuilt.bytecode, original.bytecode);
        assert_eq!(rebuilt.max_stack, 2);
    }

    #[test]
    fn backward_jump_round_trip() {
        // nop; goto -1
        let original = body(vec![0x00, 0xa7, 0xff, 0xff]);
        let rebuilt = round_trip(&original, &void_descriptor());
        assert_eq!(rebuilt.bytecode, original.bytecode);
    }

    #[test]
    fn slot_reuse_widens_the_local() {
        // iconst_0; istore_0; aconst_null; astore_0; return
        let original = body(vec![0x03, 0x3b, 0x01, 0x4b, 0xb1]);
        let rebuilt = round_trip(&original, &void_descriptor());
        assert_eq!(rebuilt.bytecode, original.bytecode);
    }

    #[test]
    fn parameters_map_to_sink_parameters() {
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::Base(BaseType::Long), FieldType::int()],
            return_type: Some(FieldType::int()),
        };
        // iload_2; ireturn (the long parameter takes slots 0 and 1)
        let text = listing(&body(vec![0x1c, 0xac]), &descriptor);
        assert_eq!(text, "  load int arg1\n  return int\n");
    }

    #[test]
    fn table_switch_round_trip() {
        let pool = loaded_pool();
        let mut out_pool = ConstantPool::new();
        let descriptor = void_descriptor();
        let mut builder = CodeBuilder::new(&mut out_pool, None, &descriptor);
        let default = builder.fresh_label();
        let one = builder.fresh_label();
        let two = builder.fresh_label();
        builder.push_int(1).unwrap();
        builder.switch(default, &[(1, one), (2, two)]).unwrap();
        builder.place_label(one).unwrap();
        builder.nop().unwrap();
        builder.place_label(two).unwrap();
        builder.nop().unwrap();
        builder.place_label(default).unwrap();
        builder.return_value(None).unwrap();
        let code = builder.finish().unwrap();
        out_pool.assign_indices().unwrap();
        let original = code.resolve(&out_pool).unwrap();

        let mut second_pool = ConstantPool::new();
        let rebuilt = reassemble(&original, &pool, None, &descriptor, &mut second_pool)
            .unwrap();
        second_pool.assign_indices().unwrap();
        let rebuilt = rebuilt.resolve(&second_pool).unwrap();
        assert_eq!(rebuilt.bytecode, original.bytecode);
    }

    #[test]
    fn handlers_reemitted_at_catch_address() {
        // nop; return | athrow, with [0, 1) -> 2 catching everything
        let mut original = body(vec![0x00, 0xb1, 0xbf]);
        original.max_stack = 1;
        original.handlers.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 1,
            handler_pc: 2,
            catch_type: None,
        });
        let rebuilt = round_trip(&original, &void_descriptor());
        assert_eq!(rebuilt.bytecode, original.bytecode);
        assert_eq!(rebuilt.handlers, original.handlers);
    }

    #[test]
    fn handler_inside_an_instruction_is_rejected() {
        // sipush 7; pop; return, with a catch address in the middle of the sipush
        let mut original = body(vec![0x11, 0x00, 0x07, 0x57, 0xb1]);
        original.handlers.push(ExceptionHandler {
            start_pc: 0,
            end_pc: 4,
            handler_pc: 1,
            catch_type: None,
        });
        let pool = loaded_pool();
        let mut out_pool = ConstantPool::new();
        let err = reassemble(&original, &pool, None, &void_descriptor(), &mut out_pool)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidJumpTarget { at: 1, target: 1 }));
    }

    #[test]
    fn line_numbers_follow_instructions() {
        let mut original = body(vec![0x00, 0xb1]);
        original
            .attributes
            .push(Attribute::LineNumberTable(vec![(0, 10), (1, 11)]));
        let text = listing(&original, &void_descriptor());
        assert_eq!(text, "  .line 10\n  nop\n  .line 11\n  return\n");
    }

    #[test]
    fn invalid_opcode_is_reported() {
        let pool = loaded_pool();
        let descriptor = void_descriptor();
        let mut printer = CodePrinter::new(vec![], None, &descriptor);
        let err = Disassembler::new()
            .disassemble(&body(vec![0xba, 0x00, 0x00]), &pool, &descriptor, false, &mut printer)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOpcode { at: 0, opcode: 0xba }));
    }

    #[test]
    fn truncated_bytecode_is_reported() {
        let pool = loaded_pool();
        let descriptor = void_descriptor();
        let mut printer = CodePrinter::new(vec![], None, &descriptor);
        let err = Disassembler::new()
            .disassemble(&body(vec![0x10]), &pool, &descriptor, false, &mut printer)
            .unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    #[test]
    fn jump_outside_the_method_is_reported() {
        let pool = loaded_pool();
        let descriptor = void_descriptor();
        let mut printer = CodePrinter::new(vec![], None, &descriptor);
        // goto -10 from offset 0
        let err = Disassembler::new()
            .disassemble(
                &body(vec![0xa7, 0xff, 0xf6, 0xb1]),
                &pool,
                &descriptor,
                false,
                &mut printer,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidJumpTarget { at: 0, target: -10 }));
    }
}
