//! The assembler half of [`InstructionSink`]

use crate::code::insn::{op, BranchKind, Fixed, Insn, LocalInsn, PoolRefTail};
use crate::code::sink::{
    ArithOp, ArrayKind, CompareMode, EqComparison, FieldRef, InstructionSink, MethodRef,
    NumericKind, OrdComparison, PrimitiveTarget, StackOp, ValueKind,
};
use crate::code::{Code, HandlerSpec, Label, LocalId, LocalVar};
use crate::descriptors::{FieldType, MethodDescriptor, RefType, RenderDescriptor};
use crate::errors::{Error, Result};
use crate::names::{BinaryName, Name, UnqualifiedName};
use crate::pool::{modified_utf8_len, ConstantPool};
use crate::util::Width;

/// Assembles instruction verbs into an unresolved [`Code`] body
///
/// The builder holds the constant pool mutably for its whole lifetime: every constant a verb
/// mentions is interned the moment the verb is accepted, so by the time [`CodeBuilder::finish`]
/// returns, resolution only ever needs to look indices up.
pub struct CodeBuilder<'p> {
    pool: &'p mut ConstantPool,
    insns: Vec<Insn>,
    label_nodes: Vec<Option<usize>>,
    locals: Vec<LocalVar>,

    /// Tracks which locals lost their declared type to `widen_local`
    widened: Vec<bool>,

    /// `this` (if any) followed by the parameters
    params: Vec<LocalId>,
    has_this: bool,
    param_slots: u16,
    handlers: Vec<HandlerSpec>,
    line_numbers: Vec<(usize, u16)>,
}

impl<'p> CodeBuilder<'p> {
    /// Start assembling the body of a method with the given receiver class and descriptor
    ///
    /// `this_class` is `None` for static methods. `this` and the parameters get their slots
    /// immediately and are available through [`InstructionSink::parameters`].
    pub fn new(
        pool: &'p mut ConstantPool,
        this_class: Option<&BinaryName>,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> CodeBuilder<'p> {
        pool.get_utf8("Code");
        let mut builder = CodeBuilder {
            pool,
            insns: vec![],
            label_nodes: vec![],
            locals: vec![],
            widened: vec![],
            params: vec![],
            has_this: this_class.is_some(),
            param_slots: 0,
            handlers: vec![],
            line_numbers: vec![],
        };
        if let Some(class) = this_class {
            builder.declare_param(FieldType::object(class.clone()));
        }
        for parameter in &descriptor.parameters {
            builder.declare_param(parameter.clone());
        }
        builder
    }

    fn declare_param(&mut self, ty: FieldType<BinaryName>) {
        let id = LocalId(self.locals.len() as u32);
        let width = ty.width() as u16;
        self.locals.push(LocalVar {
            ty,
            name: None,
            fixed_slot: Some(self.param_slots),
        });
        self.widened.push(false);
        self.param_slots += width;
        self.params.push(id);
    }

    /// Check that every label some instruction or handler refers to got placed, then hand the
    /// accumulated body over for resolution
    pub fn finish(self) -> Result<Code> {
        let mut check = |label: Label| -> Result<()> {
            if self.label_nodes[label.0 as usize].is_none() {
                Err(Error::UnplacedLabel(label))
            } else {
                Ok(())
            }
        };
        for insn in &self.insns {
            match insn {
                Insn::Branch { target, .. } | Insn::Jsr { target } => check(*target)?,
                Insn::Switch { default, cases, .. } => {
                    check(*default)?;
                    for &(_, label) in cases {
                        check(label)?;
                    }
                }
                _ => (),
            }
        }
        for handler in &self.handlers {
            check(handler.start)?;
            check(handler.end)?;
            check(handler.handler)?;
        }
        Ok(Code {
            insns: self.insns,
            label_nodes: self.label_nodes,
            locals: self.locals,
            param_slots: self.param_slots,
            handlers: self.handlers,
            line_numbers: self.line_numbers,
        })
    }

    fn plain(&mut self, bytes: Fixed, stack: i16) -> Result<()> {
        self.insns.push(Insn::Plain {
            bytes,
            stack,
            terminal: false,
        });
        Ok(())
    }

    fn terminal(&mut self, opcode: u8, stack: i16) -> Result<()> {
        self.insns.push(Insn::Plain {
            bytes: Fixed::one(opcode),
            stack,
            terminal: true,
        });
        Ok(())
    }

    fn pool_ref(&mut self, opcode: u8, constant: impl Into<crate::pool::PoolHandle>, tail: PoolRefTail, stack: i16) -> Result<()> {
        self.insns.push(Insn::PoolRef {
            opcode,
            constant: constant.into(),
            tail,
            stack,
        });
        Ok(())
    }

    fn branch(&mut self, kind: BranchKind, target: Label) -> Result<()> {
        self.insns.push(Insn::Branch { kind, target });
        Ok(())
    }

    /// Check a load/store verb against the variable's declared type
    ///
    /// A widened variable has no declared type anymore and accepts any single-slot kind.
    fn check_local(&self, var: LocalId, requested: ValueKind) -> Result<()> {
        let local = &self.locals[var.0 as usize];
        if self.widened[var.0 as usize] {
            if requested.width() == 1 {
                return Ok(());
            }
        } else if ValueKind::from_field_type(&local.ty) == requested {
            return Ok(());
        }
        Err(Error::LocalKindMismatch {
            var,
            declared: local.ty.clone(),
            requested,
        })
    }

    fn invoke(&mut self, opcode: u8, method: &MethodRef, has_this_arg: bool) -> Result<()> {
        let popped = method.descriptor.parameter_length(has_this_arg) as i16;
        let pushed = method
            .descriptor
            .return_type
            .as_ref()
            .map_or(0, |ret| ret.width()) as i16;
        let constant = self.pool.get_method_ref(
            method.class.as_str(),
            method.name.as_str(),
            &method.rendered_descriptor(),
        );
        self.pool_ref(opcode, constant, PoolRefTail::None, pushed - popped)
    }

    /// Build `value` at runtime out of chunks that each fit a `CONSTANT_Utf8` entry
    fn push_assembled_string(&mut self, value: &str) -> Result<()> {
        let append = MethodRef::new(
            BinaryName::STRINGBUILDER,
            UnqualifiedName::from_static("append"),
            MethodDescriptor {
                parameters: vec![FieldType::object(BinaryName::STRING)],
                return_type: Some(FieldType::object(BinaryName::STRINGBUILDER)),
            },
        );
        self.new_object(&BinaryName::STRINGBUILDER)?;
        self.stack_op(StackOp::Dup)?;
        self.invoke_special(&MethodRef::new(
            BinaryName::STRINGBUILDER,
            UnqualifiedName::INIT,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        ))?;

        let mut rest = value;
        while !rest.is_empty() {
            let mut encoded = 0;
            let mut take = 0;
            for c in rest.chars() {
                let len = modified_utf8_len(c);
                if encoded + len > u16::MAX as usize {
                    break;
                }
                encoded += len;
                take += c.len_utf8();
            }
            let (chunk, tail) = rest.split_at(take);
            self.push_string(chunk)?;
            self.invoke_virtual(&append)?;
            rest = tail;
        }

        self.invoke_virtual(&MethodRef::new(
            BinaryName::STRINGBUILDER,
            UnqualifiedName::from_static("toString"),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            },
        ))
    }
}

impl InstructionSink for CodeBuilder<'_> {
    fn fresh_label(&mut self) -> Label {
        let label = Label(self.label_nodes.len() as u32);
        self.label_nodes.push(None);
        label
    }

    fn place_label(&mut self, label: Label) -> Result<()> {
        let node = &mut self.label_nodes[label.0 as usize];
        if node.is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        *node = Some(self.insns.len());
        self.insns.push(Insn::Mark(label));
        Ok(())
    }

    fn new_local(&mut self, ty: FieldType<BinaryName>, name: Option<&str>) -> Result<LocalId> {
        if let Some(name) = name {
            self.pool.get_utf8("LocalVariableTable");
            self.pool.get_utf8(name);
            self.pool.get_utf8(&ty.render());
        }
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(LocalVar {
            ty,
            name: name.map(String::from),
            fixed_slot: None,
        });
        self.widened.push(false);
        Ok(id)
    }

    fn parameters(&self) -> &[LocalId] {
        &self.params
    }

    fn widen_local(&mut self, var: LocalId) -> Result<()> {
        let local = &mut self.locals[var.0 as usize];
        local.ty = FieldType::object(BinaryName::OBJECT);
        local.name = None;
        self.widened[var.0 as usize] = true;
        Ok(())
    }

    fn load_this(&mut self) -> Result<()> {
        if !self.has_this {
            return Err(Error::NoThisVariable);
        }
        let this = self.params[0];
        self.load_local(ValueKind::Reference, this)
    }

    fn load_local(&mut self, kind: ValueKind, var: LocalId) -> Result<()> {
        self.check_local(var, kind)?;
        self.insns.push(Insn::Local {
            insn: LocalInsn::Load(kind),
            var,
        });
        Ok(())
    }

    fn store_local(&mut self, kind: ValueKind, var: LocalId) -> Result<()> {
        self.check_local(var, kind)?;
        self.insns.push(Insn::Local {
            insn: LocalInsn::Store(kind),
            var,
        });
        Ok(())
    }

    fn increment_local(&mut self, var: LocalId, amount: i16) -> Result<()> {
        let declared = &self.locals[var.0 as usize].ty;
        if self.widened[var.0 as usize] || ValueKind::from_field_type(declared) != ValueKind::Int {
            return Err(Error::IncrementNonIntLocal(var));
        }
        self.insns.push(Insn::Local {
            insn: LocalInsn::Iinc(amount),
            var,
        });
        Ok(())
    }

    fn push_null(&mut self) -> Result<()> {
        self.plain(Fixed::one(op::ACONST_NULL), 1)
    }

    fn push_int(&mut self, value: i32) -> Result<()> {
        if (-1..=5).contains(&value) {
            self.plain(Fixed::one((op::ICONST_0 as i32 + value) as u8), 1)
        } else if let Ok(byte) = i8::try_from(value) {
            self.plain(Fixed::two(op::BIPUSH, byte as u8), 1)
        } else if let Ok(short) = i16::try_from(value) {
            self.plain(Fixed::three(op::SIPUSH, short.to_be_bytes()), 1)
        } else {
            let constant = self.pool.get_integer(value);
            self.insns.push(Insn::LoadConst {
                constant,
                two_slots: false,
            });
            Ok(())
        }
    }

    fn push_long(&mut self, value: i64) -> Result<()> {
        if value == 0 || value == 1 {
            self.plain(Fixed::one(op::LCONST_0 + value as u8), 2)
        } else {
            let constant = self.pool.get_long(value);
            self.insns.push(Insn::LoadConst {
                constant,
                two_slots: true,
            });
            Ok(())
        }
    }

    fn push_float(&mut self, value: f32) -> Result<()> {
        // Bit comparison, so -0.0 and NaN go through the pool
        for small in 0..=2u8 {
            if value.to_bits() == (small as f32).to_bits() {
                return self.plain(Fixed::one(op::FCONST_0 + small), 1);
            }
        }
        let constant = self.pool.get_float(value);
        self.insns.push(Insn::LoadConst {
            constant,
            two_slots: false,
        });
        Ok(())
    }

    fn push_double(&mut self, value: f64) -> Result<()> {
        for small in 0..=1u8 {
            if value.to_bits() == (small as f64).to_bits() {
                return self.plain(Fixed::one(op::DCONST_0 + small), 2);
            }
        }
        let constant = self.pool.get_double(value);
        self.insns.push(Insn::LoadConst {
            constant,
            two_slots: true,
        });
        Ok(())
    }

    fn push_string(&mut self, value: &str) -> Result<()> {
        let encoded: usize = value.chars().map(modified_utf8_len).sum();
        if encoded > u16::MAX as usize {
            return self.push_assembled_string(value);
        }
        let constant = self.pool.get_string(value);
        self.insns.push(Insn::LoadConst {
            constant,
            two_slots: false,
        });
        Ok(())
    }

    fn arith(&mut self, op_: ArithOp, kind: NumericKind) -> Result<()> {
        if op_.integral_only() && !kind.is_integral() {
            return Err(Error::InvalidArithmetic(op_, kind));
        }
        let base = match op_ {
            ArithOp::Add => op::IADD,
            ArithOp::Sub => op::ISUB,
            ArithOp::Mul => op::IMUL,
            ArithOp::Div => op::IDIV,
            ArithOp::Rem => op::IREM,
            ArithOp::Neg => op::INEG,
            ArithOp::Shl => op::ISHL,
            ArithOp::Shr => op::ISHR,
            ArithOp::Ushr => op::IUSHR,
            ArithOp::And => op::IAND,
            ArithOp::Or => op::IOR,
            ArithOp::Xor => op::IXOR,
        };
        let stack = match op_ {
            ArithOp::Neg => 0,
            // Shift amounts are always ints
            ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr => -1,
            _ => -(kind.width() as i16),
        };
        self.plain(Fixed::one(base + kind.family_index()), stack)
    }

    fn compare(&mut self, kind: NumericKind, nan_bias: CompareMode) -> Result<()> {
        let opcode = match (kind, nan_bias) {
            (NumericKind::Int, _) => return Err(Error::InvalidComparison(kind)),
            (NumericKind::Long, _) => op::LCMP,
            (NumericKind::Float, CompareMode::L) => op::FCMPL,
            (NumericKind::Float, CompareMode::G) => op::FCMPG,
            (NumericKind::Double, CompareMode::L) => op::DCMPL,
            (NumericKind::Double, CompareMode::G) => op::DCMPG,
        };
        // Two operands collapse to one int
        self.plain(Fixed::one(opcode), 1 - 2 * kind.width() as i16)
    }

    fn convert(&mut self, from: NumericKind, to: PrimitiveTarget) -> Result<()> {
        use NumericKind as N;
        use PrimitiveTarget as T;
        let opcode = match (from, to) {
            (N::Int, T::Long) => op::I2L,
            (N::Int, T::Float) => op::I2F,
            (N::Int, T::Double) => op::I2D,
            (N::Int, T::Byte) => op::I2B,
            (N::Int, T::Char) => op::I2C,
            (N::Int, T::Short) => op::I2S,
            (N::Long, T::Int) => op::L2I,
            (N::Long, T::Float) => op::L2F,
            (N::Long, T::Double) => op::L2D,
            (N::Float, T::Int) => op::F2I,
            (N::Float, T::Long) => op::F2L,
            (N::Float, T::Double) => op::F2D,
            (N::Double, T::Int) => op::D2I,
            (N::Double, T::Long) => op::D2L,
            (N::Double, T::Float) => op::D2F,
            _ => return Err(Error::InvalidConversion(from, to)),
        };
        let stack = to.width() as i16 - from.width() as i16;
        self.plain(Fixed::one(opcode), stack)
    }

    fn stack_op(&mut self, op_: StackOp) -> Result<()> {
        let (opcode, stack) = match op_ {
            StackOp::Pop => (op::POP, -1),
            StackOp::Pop2 => (op::POP2, -2),
            StackOp::Dup => (op::DUP, 1),
            StackOp::DupX1 => (op::DUP_X1, 1),
            StackOp::DupX2 => (op::DUP_X2, 1),
            StackOp::Dup2 => (op::DUP2, 2),
            StackOp::Dup2X1 => (op::DUP2_X1, 2),
            StackOp::Dup2X2 => (op::DUP2_X2, 2),
            StackOp::Swap => (op::SWAP, 0),
        };
        self.plain(Fixed::one(opcode), stack)
    }

    fn get_field(&mut self, field: &FieldRef) -> Result<()> {
        let width = field.descriptor.width() as i16;
        let constant = self.pool.get_field_ref(
            field.class.as_str(),
            field.name.as_str(),
            &field.rendered_descriptor(),
        );
        self.pool_ref(op::GETFIELD, constant, PoolRefTail::None, width - 1)
    }

    fn put_field(&mut self, field: &FieldRef) -> Result<()> {
        let width = field.descriptor.width() as i16;
        let constant = self.pool.get_field_ref(
            field.class.as_str(),
            field.name.as_str(),
            &field.rendered_descriptor(),
        );
        self.pool_ref(op::PUTFIELD, constant, PoolRefTail::None, -1 - width)
    }

    fn get_static(&mut self, field: &FieldRef) -> Result<()> {
        let width = field.descriptor.width() as i16;
        let constant = self.pool.get_field_ref(
            field.class.as_str(),
            field.name.as_str(),
            &field.rendered_descriptor(),
        );
        self.pool_ref(op::GETSTATIC, constant, PoolRefTail::None, width)
    }

    fn put_static(&mut self, field: &FieldRef) -> Result<()> {
        let width = field.descriptor.width() as i16;
        let constant = self.pool.get_field_ref(
            field.class.as_str(),
            field.name.as_str(),
            &field.rendered_descriptor(),
        );
        self.pool_ref(op::PUTSTATIC, constant, PoolRefTail::None, -width)
    }

    fn invoke_virtual(&mut self, method: &MethodRef) -> Result<()> {
        self.invoke(op::INVOKEVIRTUAL, method, true)
    }

    fn invoke_special(&mut self, method: &MethodRef) -> Result<()> {
        self.invoke(op::INVOKESPECIAL, method, true)
    }

    fn invoke_super(&mut self, method: &MethodRef) -> Result<()> {
        self.invoke(op::INVOKESPECIAL, method, true)
    }

    fn invoke_static(&mut self, method: &MethodRef) -> Result<()> {
        self.invoke(op::INVOKESTATIC, method, false)
    }

    fn invoke_interface(&mut self, method: &MethodRef) -> Result<()> {
        let popped = method.descriptor.parameter_length(true);
        let pushed = method
            .descriptor
            .return_type
            .as_ref()
            .map_or(0, |ret| ret.width()) as i16;
        let constant = self.pool.get_interface_method_ref(
            method.class.as_str(),
            method.name.as_str(),
            &method.rendered_descriptor(),
        );
        self.pool_ref(
            op::INVOKEINTERFACE,
            constant,
            PoolRefTail::InterfaceCount(popped as u8),
            pushed - popped as i16,
        )
    }

    fn new_object(&mut self, class: &BinaryName) -> Result<()> {
        let constant = self.pool.get_class(class.as_str());
        self.pool_ref(op::NEW, constant, PoolRefTail::None, 1)
    }

    fn new_array(&mut self, element: &FieldType<BinaryName>) -> Result<()> {
        match element {
            FieldType::Base(base) => {
                self.plain(Fixed::two(op::NEWARRAY, base.newarray_code()), 0)
            }
            FieldType::Ref(ref_type) => {
                let constant = self.pool.get_class(&ref_type.render_class_info());
                self.pool_ref(op::ANEWARRAY, constant, PoolRefTail::None, 0)
            }
        }
    }

    fn new_multi_array(&mut self, ty: &RefType<BinaryName>, dimensions: u8) -> Result<()> {
        let constant = self.pool.get_class(&ty.render_class_info());
        self.pool_ref(
            op::MULTIANEWARRAY,
            constant,
            PoolRefTail::Dimensions(dimensions),
            1 - dimensions as i16,
        )
    }

    fn array_load(&mut self, kind: ArrayKind) -> Result<()> {
        self.plain(
            Fixed::one(op::IALOAD + kind.family_index()),
            kind.element_width() - 2,
        )
    }

    fn array_store(&mut self, kind: ArrayKind) -> Result<()> {
        self.plain(
            Fixed::one(op::IASTORE + kind.family_index()),
            -2 - kind.element_width(),
        )
    }

    fn array_length(&mut self) -> Result<()> {
        self.plain(Fixed::one(op::ARRAYLENGTH), 0)
    }

    fn check_cast(&mut self, ty: &RefType<BinaryName>) -> Result<()> {
        let constant = self.pool.get_class(&ty.render_class_info());
        self.pool_ref(op::CHECKCAST, constant, PoolRefTail::None, 0)
    }

    fn instance_of(&mut self, ty: &RefType<BinaryName>) -> Result<()> {
        let constant = self.pool.get_class(&ty.render_class_info());
        self.pool_ref(op::INSTANCEOF, constant, PoolRefTail::None, 0)
    }

    fn monitor_enter(&mut self) -> Result<()> {
        self.plain(Fixed::one(op::MONITORENTER), -1)
    }

    fn monitor_exit(&mut self) -> Result<()> {
        self.plain(Fixed::one(op::MONITOREXIT), -1)
    }

    fn nop(&mut self) -> Result<()> {
        self.plain(Fixed::one(op::NOP), 0)
    }

    fn jump(&mut self, target: Label) -> Result<()> {
        self.branch(BranchKind::Goto, target)
    }

    fn branch_if(&mut self, comparison: OrdComparison, target: Label) -> Result<()> {
        self.branch(BranchKind::If(comparison), target)
    }

    fn branch_if_icmp(&mut self, comparison: OrdComparison, target: Label) -> Result<()> {
        self.branch(BranchKind::IfICmp(comparison), target)
    }

    fn branch_if_acmp(&mut self, comparison: EqComparison, target: Label) -> Result<()> {
        self.branch(BranchKind::IfACmp(comparison), target)
    }

    fn branch_if_null(&mut self, comparison: EqComparison, target: Label) -> Result<()> {
        self.branch(BranchKind::IfNull(comparison), target)
    }

    fn switch(&mut self, default: Label, cases: &[(i32, Label)]) -> Result<()> {
        let mut sorted = cases.to_vec();
        sorted.sort_by_key(|&(value, _)| value);
        for window in sorted.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(Error::DuplicateSwitchCase(window[0].0));
            }
        }
        let dense = if sorted.is_empty() {
            false
        } else {
            let range = sorted[sorted.len() - 1].0 as i64 - sorted[0].0 as i64 + 1;
            3 + range <= 2 + 2 * sorted.len() as i64
        };
        self.insns.push(Insn::Switch {
            default,
            cases: sorted,
            dense,
        });
        Ok(())
    }

    fn call_subroutine(&mut self, target: Label) -> Result<()> {
        self.insns.push(Insn::Jsr { target });
        Ok(())
    }

    fn return_subroutine(&mut self, var: LocalId) -> Result<()> {
        self.insns.push(Insn::Ret { var });
        Ok(())
    }

    fn return_value(&mut self, kind: Option<ValueKind>) -> Result<()> {
        match kind {
            None => self.terminal(op::RETURN, 0),
            Some(kind) => self.terminal(
                op::IRETURN + kind.family_index(),
                -(kind.width() as i16),
            ),
        }
    }

    fn throw(&mut self) -> Result<()> {
        self.terminal(op::ATHROW, -1)
    }

    fn exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<()> {
        if let Some(class) = catch_type {
            self.pool.get_class(class.as_str());
        }
        self.handlers.push(HandlerSpec {
            start,
            end,
            handler,
            catch_type: catch_type.cloned(),
        });
        Ok(())
    }

    fn line_number(&mut self, line: u16) -> Result<()> {
        self.pool.get_utf8("LineNumberTable");
        self.line_numbers.push((self.insns.len(), line));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeBody;
    use crate::descriptors::BaseType;
    use pretty_assertions::assert_eq;

    fn assemble(build: impl FnOnce(&mut CodeBuilder) -> Result<()>) -> Result<CodeBody> {
        let mut pool = ConstantPool::new();
        let descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let mut builder = CodeBuilder::new(&mut pool, None, &descriptor);
        build(&mut builder)?;
        let code = builder.finish()?;
        pool.assign_indices()?;
        code.resolve(&pool)
    }

    #[test]
    fn compact_int_constants() {
        let body = assemble(|asm| {
            for value in [-1, 5, 100, 30000, 100000] {
                asm.push_int(value)?;
                asm.stack_op(StackOp::Pop)?;
            }
            asm.return_value(None)
        })
        .unwrap();
        assert_eq!(
            body.bytecode,
            vec![
                0x02, 0x57, // iconst_m1
                0x08, 0x57, // iconst_5
                0x10, 100, 0x57, // bipush
                0x11, 0x75, 0x30, 0x57, // sipush
                0x12, 1, 0x57, // ldc
                0xb1,
            ],
        );
        assert_eq!(body.max_stack, 1);
        assert_eq!(body.max_locals, 0);
    }

    #[test]
    fn forward_conditional_branch() {
        let body = assemble(|asm| {
            let target = asm.fresh_label();
            asm.push_int(0)?;
            asm.branch_if(OrdComparison::NE, target)?;
            asm.nop()?;
            asm.place_label(target)?;
            asm.return_value(None)
        })
        .unwrap();
        assert_eq!(body.bytecode, vec![0x03, 0x9a, 0x00, 0x04, 0x00, 0xb1]);
    }

    #[test]
    fn backward_jump() {
        let body = assemble(|asm| {
            let top = asm.fresh_label();
            asm.place_label(top)?;
            asm.nop()?;
            asm.jump(top)
        })
        .unwrap();
        assert_eq!(body.bytecode, vec![0x00, 0xa7, 0xff, 0xff]);
    }

    #[test]
    fn dense_switch_uses_tableswitch() {
        let body = assemble(|asm| {
            let default = asm.fresh_label();
            let case = asm.fresh_label();
            asm.push_int(1)?;
            asm.switch(default, &[(0, case), (1, case), (2, case)])?;
            asm.place_label(case)?;
            asm.place_label(default)?;
            asm.return_value(None)
        })
        .unwrap();
        assert_eq!(body.bytecode[1], 0xaa);
        // opcode, 2 padding bytes, default, low = 0, high = 2, 3 offsets, return
        assert_eq!(body.bytecode.len(), 1 + 1 + 2 + 4 * 6 + 1);
    }

    #[test]
    fn sparse_switch_uses_lookupswitch() {
        let body = assemble(|asm| {
            let default = asm.fresh_label();
            let case = asm.fresh_label();
            asm.push_int(1)?;
            asm.switch(default, &[(0, case), (10_000, case)])?;
            asm.place_label(case)?;
            asm.place_label(default)?;
            asm.return_value(None)
        })
        .unwrap();
        assert_eq!(body.bytecode[1], 0xab);
    }

    #[test]
    fn duplicate_switch_case_rejected() {
        let result = assemble(|asm| {
            let default = asm.fresh_label();
            asm.push_int(1)?;
            asm.switch(default, &[(7, default), (7, default)])?;
            asm.place_label(default)?;
            asm.return_value(None)
        });
        assert!(matches!(result, Err(Error::DuplicateSwitchCase(7))));
    }

    #[test]
    fn locals_get_slots_in_declaration_order() {
        let body = assemble(|asm| {
            let a = asm.new_local(FieldType::Base(BaseType::Long), None)?;
            let b = asm.new_local(FieldType::int(), None)?;
            asm.push_long(1)?;
            asm.store_local(ValueKind::Long, a)?;
            asm.push_int(1)?;
            asm.store_local(ValueKind::Int, b)?;
            asm.return_value(None)
        })
        .unwrap();
        // lstore_0 then istore_2: the long takes two slots
        assert_eq!(body.bytecode, vec![0x0a, 0x3f, 0x04, 0x3d, 0xb1]);
        assert_eq!(body.max_locals, 3);
    }

    #[test]
    fn local_kind_mismatch_rejected() {
        let result = assemble(|asm| {
            let var = asm.new_local(FieldType::int(), None)?;
            asm.push_long(0)?;
            asm.store_local(ValueKind::Long, var)
        });
        assert!(matches!(result, Err(Error::LocalKindMismatch { .. })));
    }

    #[test]
    fn widened_local_accepts_single_slot_kinds() {
        assemble(|asm| {
            let var = asm.new_local(FieldType::int(), None)?;
            asm.push_int(3)?;
            asm.store_local(ValueKind::Int, var)?;
            asm.widen_local(var)?;
            asm.push_null()?;
            asm.store_local(ValueKind::Reference, var)?;
            asm.return_value(None)
        })
        .unwrap();
    }

    #[test]
    fn unplaced_label_rejected_at_finish() {
        let result = assemble(|asm| {
            let nowhere = asm.fresh_label();
            asm.jump(nowhere)
        });
        assert!(matches!(result, Err(Error::UnplacedLabel(_))));
    }

    #[test]
    fn load_this_in_static_method_rejected() {
        let result = assemble(|asm| asm.load_this());
        assert!(matches!(result, Err(Error::NoThisVariable)));
    }

    #[test]
    fn this_and_parameters_get_fixed_slots() {
        let mut pool = ConstantPool::new();
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::Base(BaseType::Double), FieldType::int()],
            return_type: Some(FieldType::int()),
        };
        let this_class = BinaryName::from_static("com/example/Widget");
        let mut asm = CodeBuilder::new(&mut pool, Some(&this_class), &descriptor);
        assert_eq!(asm.parameters().len(), 3);
        let arg = asm.parameters()[2];
        asm.load_local(ValueKind::Int, arg).unwrap();
        asm.return_value(Some(ValueKind::Int)).unwrap();
        let code = asm.finish().unwrap();
        pool.assign_indices().unwrap();
        let body = code.resolve(&pool).unwrap();
        // `this` in slot 0, the double in 1-2, the int in 3
        assert_eq!(body.bytecode, vec![0x1a + 3, 0xac]);
        assert_eq!(body.max_locals, 4);
    }

    fn interned_strings(pool: &ConstantPool) -> Vec<String> {
        use crate::pool::{PoolEntry, PoolHandle};
        (0..pool.len() as u32)
            .filter_map(|at| match pool.entry(PoolHandle(at)) {
                PoolEntry::Str(utf8) => Some(pool.utf8_text(*utf8).to_string()),
                _ => None,
            })
            .collect()
    }

    fn string_chunks(value: &str) -> (CodeBody, Vec<String>) {
        let mut pool = ConstantPool::new();
        let descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let mut builder = CodeBuilder::new(&mut pool, None, &descriptor);
        builder.push_string(value).unwrap();
        builder.stack_op(StackOp::Pop).unwrap();
        builder.return_value(None).unwrap();
        let code = builder.finish().unwrap();
        pool.assign_indices().unwrap();
        let body = code.resolve(&pool).unwrap();
        let chunks = interned_strings(&pool);
        (body, chunks)
    }

    #[test]
    fn long_string_assembled_from_chunks() {
        let long: String = "x".repeat(70_000);
        let (body, chunks) = string_chunks(&long);
        // new StringBuilder, dup, <init>, two (ldc, append) pairs, toString
        assert_eq!(body.bytecode[0], 0xbb);
        assert_eq!(body.bytecode[3], 0x59);
        assert_eq!(body.bytecode[4], 0xb7);
        let appends = body.bytecode.iter().filter(|&&b| b == 0xb6).count();
        assert_eq!(appends, 3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), long);
        for chunk in &chunks {
            let encoded: usize = chunk.chars().map(modified_utf8_len).sum();
            assert!(encoded <= u16::MAX as usize);
        }
    }

    #[test]
    fn chunk_split_never_divides_a_code_point() {
        // 65532 single-byte chars leave 3 bytes of room; the supplementary character needs 6
        // (a surrogate pair in modified UTF-8), so it must move whole into the next chunk
        let mut value = "x".repeat(65_532);
        value.push('\u{1F600}');
        value.push_str("tail");
        let (_, chunks) = string_chunks(&value);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "x".repeat(65_532));
        assert!(chunks[1].starts_with('\u{1F600}'));
        assert_eq!(chunks.concat(), value);
    }

    #[test]
    fn interface_invoke_carries_argument_count() {
        let body = assemble(|asm| {
            asm.push_null()?;
            asm.push_int(0)?;
            asm.invoke_interface(&MethodRef::new(
                BinaryName::from_static("java/util/List"),
                UnqualifiedName::from_static("get"),
                MethodDescriptor {
                    parameters: vec![FieldType::int()],
                    return_type: Some(FieldType::object(BinaryName::OBJECT)),
                },
            ))?;
            asm.stack_op(StackOp::Pop)?;
            asm.return_value(None)
        })
        .unwrap();
        // aconst_null, iconst_0, invokeinterface index count 0, pop, return
        assert_eq!(body.bytecode.len(), 2 + 5 + 2);
        assert_eq!(body.bytecode[2], 0xb9);
        assert_eq!(body.bytecode[5], 2);
        assert_eq!(body.bytecode[6], 0);
    }

    #[test]
    fn exception_handler_offsets_resolved() {
        let body = assemble(|asm| {
            let start = asm.fresh_label();
            let end = asm.fresh_label();
            let handler = asm.fresh_label();
            asm.place_label(start)?;
            asm.nop()?;
            asm.place_label(end)?;
            asm.return_value(None)?;
            asm.place_label(handler)?;
            asm.stack_op(StackOp::Pop)?;
            asm.return_value(None)?;
            asm.exception_handler(start, end, handler, Some(&BinaryName::THROWABLE))
        })
        .unwrap();
        assert_eq!(body.handlers.len(), 1);
        assert_eq!(body.handlers[0].start_pc, 0);
        assert_eq!(body.handlers[0].end_pc, 1);
        assert_eq!(body.handlers[0].handler_pc, 2);
        assert_eq!(
            body.handlers[0].catch_type,
            Some(BinaryName::THROWABLE),
        );
    }

    #[test]
    fn inconsistent_depths_at_join_rejected() {
        let result = assemble(|asm| {
            let join = asm.fresh_label();
            asm.push_int(0)?;
            asm.branch_if(OrdComparison::EQ, join)?;
            asm.push_int(1)?;
            asm.place_label(join)?;
            asm.return_value(None)
        });
        assert!(matches!(
            result,
            Err(Error::InconsistentStackDepth { .. }),
        ));
    }

    #[test]
    fn stack_underflow_rejected() {
        let result = assemble(|asm| {
            asm.stack_op(StackOp::Pop)?;
            asm.return_value(None)
        });
        assert!(matches!(result, Err(Error::StackUnderflow { at: 0 })));
    }

    #[test]
    fn code_falling_off_the_end_rejected() {
        let result = assemble(|asm| asm.nop());
        assert!(matches!(result, Err(Error::CodeFallsOffEnd)));
    }

    #[test]
    fn subroutine_depths_balance() {
        let body = assemble(|asm| {
            let sub = asm.fresh_label();
            asm.call_subroutine(sub)?;
            asm.return_value(None)?;
            asm.place_label(sub)?;
            let ret_addr = asm.new_local(FieldType::object(BinaryName::OBJECT), None)?;
            asm.store_local(ValueKind::Reference, ret_addr)?;
            asm.return_subroutine(ret_addr)
        })
        .unwrap();
        // jsr, return, astore_0, ret 0
        assert_eq!(body.bytecode, vec![0xa8, 0x00, 0x04, 0xb1, 0x4b, 0xa9, 0x00]);
        assert_eq!(body.max_stack, 1);
    }

    #[test]
    fn wide_iinc_for_large_amount() {
        let body = assemble(|asm| {
            let var = asm.new_local(FieldType::int(), None)?;
            asm.push_int(0)?;
            asm.store_local(ValueKind::Int, var)?;
            asm.increment_local(var, 1000)?;
            asm.return_value(None)
        })
        .unwrap();
        assert_eq!(
            body.bytecode,
            vec![0x03, 0x3b, 0xc4, 0x84, 0x00, 0x00, 0x03, 0xe8, 0xb1],
        );
    }
}
