use crate::code::{
    ArithOp, ArrayKind, CompareMode, EqComparison, FieldRef, InstructionSink, Label, LocalId,
    MethodRef, NumericKind, OrdComparison, PrimitiveTarget, StackOp, ValueKind,
};
use crate::descriptors::{FieldType, MethodDescriptor, RefType, RenderDescriptor};
use crate::errors::Result;
use crate::names::{BinaryName, Name};
use std::io::Write;

/// [`InstructionSink`] that renders one listing line per verb
///
/// Labels print as `L0`, `L1`, .. and unnamed locals as `v0`, `v1`, .. in allocation order; the
/// counters behind both are fields of the printer, so independent printers never share numbering.
pub struct CodePrinter<W> {
    writer: W,
    next_label: u32,
    locals: Vec<String>,
    params: Vec<LocalId>,
}

impl<W: Write> CodePrinter<W> {
    /// Printer for a method with the given receiver and descriptor (`this_class` is `None` for
    /// static methods)
    pub fn new(
        writer: W,
        this_class: Option<&BinaryName>,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> CodePrinter<W> {
        let mut printer = CodePrinter {
            writer,
            next_label: 0,
            locals: vec![],
            params: vec![],
        };
        if this_class.is_some() {
            let var = printer.intern_local(Some("this"));
            printer.params.push(var);
        }
        for at in 0..descriptor.parameters.len() {
            let var = printer.intern_local(Some(&format!("arg{}", at)));
            printer.params.push(var);
        }
        printer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn intern_local(&mut self, name: Option<&str>) -> LocalId {
        let id = self.locals.len() as u32;
        let display = match name {
            Some(name) => name.to_string(),
            None => format!("v{}", id),
        };
        self.locals.push(display);
        LocalId(id)
    }

    fn local(&self, var: LocalId) -> &str {
        &self.locals[var.0 as usize]
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) -> Result<()> {
        writeln!(self.writer, "  {}", text)?;
        Ok(())
    }
}

fn kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Int => "int",
        ValueKind::Long => "long",
        ValueKind::Float => "float",
        ValueKind::Double => "double",
        ValueKind::Reference => "ref",
    }
}

fn numeric_name(kind: NumericKind) -> &'static str {
    match kind {
        NumericKind::Int => "int",
        NumericKind::Long => "long",
        NumericKind::Float => "float",
        NumericKind::Double => "double",
    }
}

fn target_name(target: PrimitiveTarget) -> &'static str {
    match target {
        PrimitiveTarget::Int => "int",
        PrimitiveTarget::Long => "long",
        PrimitiveTarget::Float => "float",
        PrimitiveTarget::Double => "double",
        PrimitiveTarget::Byte => "byte",
        PrimitiveTarget::Char => "char",
        PrimitiveTarget::Short => "short",
    }
}

fn arith_name(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "add",
        ArithOp::Sub => "sub",
        ArithOp::Mul => "mul",
        ArithOp::Div => "div",
        ArithOp::Rem => "rem",
        ArithOp::Neg => "neg",
        ArithOp::Shl => "shl",
        ArithOp::Shr => "shr",
        ArithOp::Ushr => "ushr",
        ArithOp::And => "and",
        ArithOp::Or => "or",
        ArithOp::Xor => "xor",
    }
}

fn array_kind_name(kind: ArrayKind) -> &'static str {
    match kind {
        ArrayKind::Int => "int",
        ArrayKind::Long => "long",
        ArrayKind::Float => "float",
        ArrayKind::Double => "double",
        ArrayKind::Reference => "ref",
        ArrayKind::Byte => "byte",
        ArrayKind::Char => "char",
        ArrayKind::Short => "short",
    }
}

fn stack_op_name(op: StackOp) -> &'static str {
    match op {
        StackOp::Pop => "pop",
        StackOp::Pop2 => "pop2",
        StackOp::Dup => "dup",
        StackOp::DupX1 => "dup_x1",
        StackOp::DupX2 => "dup_x2",
        StackOp::Dup2 => "dup2",
        StackOp::Dup2X1 => "dup2_x1",
        StackOp::Dup2X2 => "dup2_x2",
        StackOp::Swap => "swap",
    }
}

fn ord_name(comparison: OrdComparison) -> &'static str {
    match comparison {
        OrdComparison::EQ => "eq",
        OrdComparison::NE => "ne",
        OrdComparison::LT => "lt",
        OrdComparison::GE => "ge",
        OrdComparison::GT => "gt",
        OrdComparison::LE => "le",
    }
}

fn eq_name(comparison: EqComparison) -> &'static str {
    match comparison {
        EqComparison::EQ => "eq",
        EqComparison::NE => "ne",
    }
}

fn label_name(label: Label) -> String {
    format!("L{}", label.0)
}

fn member(class: &BinaryName, name: &str, descriptor: &str) -> String {
    format!("{}.{}:{}", class.as_str(), name, descriptor)
}

impl<W: Write> InstructionSink for CodePrinter<W> {
    fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn place_label(&mut self, label: Label) -> Result<()> {
        writeln!(self.writer, "{}:", label_name(label))?;
        Ok(())
    }

    fn new_local(&mut self, ty: FieldType<BinaryName>, name: Option<&str>) -> Result<LocalId> {
        let var = self.intern_local(name);
        let display = self.local(var).to_string();
        self.line(format_args!(".local {} {}", display, ty.render()))?;
        Ok(var)
    }

    fn parameters(&self) -> &[LocalId] {
        &self.params
    }

    fn widen_local(&mut self, var: LocalId) -> Result<()> {
        let display = self.local(var).to_string();
        self.line(format_args!(".widen {}", display))
    }

    fn load_this(&mut self) -> Result<()> {
        self.line(format_args!("load ref this"))
    }

    fn load_local(&mut self, kind: ValueKind, var: LocalId) -> Result<()> {
        let display = self.local(var).to_string();
        self.line(format_args!("load {} {}", kind_name(kind), display))
    }

    fn store_local(&mut self, kind: ValueKind, var: LocalId) -> Result<()> {
        let display = self.local(var).to_string();
        self.line(format_args!("store {} {}", kind_name(kind), display))
    }

    fn increment_local(&mut self, var: LocalId, amount: i16) -> Result<()> {
        let display = self.local(var).to_string();
        self.line(format_args!("inc {} {}", display, amount))
    }

    fn push_null(&mut self) -> Result<()> {
        self.line(format_args!("push null"))
    }

    fn push_int(&mut self, value: i32) -> Result<()> {
        self.line(format_args!("push int {}", value))
    }

    fn push_long(&mut self, value: i64) -> Result<()> {
        self.line(format_args!("push long {}", value))
    }

    fn push_float(&mut self, value: f32) -> Result<()> {
        self.line(format_args!("push float {}", value))
    }

    fn push_double(&mut self, value: f64) -> Result<()> {
        self.line(format_args!("push double {}", value))
    }

    fn push_string(&mut self, value: &str) -> Result<()> {
        self.line(format_args!("push string {:?}", value))
    }

    fn arith(&mut self, op: ArithOp, kind: NumericKind) -> Result<()> {
        self.line(format_args!("{} {}", arith_name(op), numeric_name(kind)))
    }

    fn compare(&mut self, kind: NumericKind, nan_bias: CompareMode) -> Result<()> {
        let suffix = match nan_bias {
            CompareMode::G => "g",
            CompareMode::L => "l",
        };
        self.line(format_args!("cmp{} {}", suffix, numeric_name(kind)))
    }

    fn convert(&mut self, from: NumericKind, to: PrimitiveTarget) -> Result<()> {
        self.line(format_args!(
            "convert {} {}",
            numeric_name(from),
            target_name(to)
        ))
    }

    fn stack_op(&mut self, op: StackOp) -> Result<()> {
        self.line(format_args!("{}", stack_op_name(op)))
    }

    fn get_field(&mut self, field: &FieldRef) -> Result<()> {
        let descriptor = field.rendered_descriptor();
        self.line(format_args!(
            "getfield {}",
            member(&field.class, field.name.as_str(), &descriptor)
        ))
    }

    fn put_field(&mut self, field: &FieldRef) -> Result<()> {
        let descriptor = field.rendered_descriptor();
        self.line(format_args!(
            "putfield {}",
            member(&field.class, field.name.as_str(), &descriptor)
        ))
    }

    fn get_static(&mut self, field: &FieldRef) -> Result<()> {
        let descriptor = field.rendered_descriptor();
        self.line(format_args!(
            "getstatic {}",
            member(&field.class, field.name.as_str(), &descriptor)
        ))
    }

    fn put_static(&mut self, field: &FieldRef) -> Result<()> {
        let descriptor = field.rendered_descriptor();
        self.line(format_args!(
            "putstatic {}",
            member(&field.class, field.name.as_str(), &descriptor)
        ))
    }

    fn invoke_virtual(&mut self, method: &MethodRef) -> Result<()> {
        let descriptor = method.rendered_descriptor();
        self.line(format_args!(
            "invokevirtual {}",
            member(&method.class, method.name.as_str(), &descriptor)
        ))
    }

    fn invoke_special(&mut self, method: &MethodRef) -> Result<()> {
        let descriptor = method.rendered_descriptor();
        self.line(format_args!(
            "invokespecial {}",
            member(&method.class, method.name.as_str(), &descriptor)
        ))
    }

    fn invoke_super(&mut self, method: &MethodRef) -> Result<()> {
        self.invoke_special(method)
    }

    fn invoke_static(&mut self, method: &MethodRef) -> Result<()> {
        let descriptor = method.rendered_descriptor();
        self.line(format_args!(
            "invokestatic {}",
            member(&method.class, method.name.as_str(), &descriptor)
        ))
    }

    fn invoke_interface(&mut self, method: &MethodRef) -> Result<()> {
        let descriptor = method.rendered_descriptor();
        self.line(format_args!(
            "invokeinterface {}",
            member(&method.class, method.name.as_str(), &descriptor)
        ))
    }

    fn new_object(&mut self, class: &BinaryName) -> Result<()> {
        self.line(format_args!("new {}", class.as_str()))
    }

    fn new_array(&mut self, element: &FieldType<BinaryName>) -> Result<()> {
        self.line(format_args!("newarray {}", element.render()))
    }

    fn new_multi_array(&mut self, ty: &RefType<BinaryName>, dimensions: u8) -> Result<()> {
        self.line(format_args!(
            "multianewarray {} {}",
            ty.render_class_info(),
            dimensions
        ))
    }

    fn array_load(&mut self, kind: ArrayKind) -> Result<()> {
        self.line(format_args!("array_load {}", array_kind_name(kind)))
    }

    fn array_store(&mut self, kind: ArrayKind) -> Result<()> {
        self.line(format_args!("array_store {}", array_kind_name(kind)))
    }

    fn array_length(&mut self) -> Result<()> {
        self.line(format_args!("arraylength"))
    }

    fn check_cast(&mut self, ty: &RefType<BinaryName>) -> Result<()> {
        self.line(format_args!("checkcast {}", ty.render_class_info()))
    }

    fn instance_of(&mut self, ty: &RefType<BinaryName>) -> Result<()> {
        self.line(format_args!("instanceof {}", ty.render_class_info()))
    }

    fn monitor_enter(&mut self) -> Result<()> {
        self.line(format_args!("monitorenter"))
    }

    fn monitor_exit(&mut self) -> Result<()> {
        self.line(format_args!("monitorexit"))
    }

    fn nop(&mut self) -> Result<()> {
        self.line(format_args!("nop"))
    }

    fn jump(&mut self, target: Label) -> Result<()> {
        self.line(format_args!("goto {}", label_name(target)))
    }

    fn branch_if(&mut self, comparison: OrdComparison, target: Label) -> Result<()> {
        self.line(format_args!(
            "if{} {}",
            ord_name(comparison),
            label_name(target)
        ))
    }

    fn branch_if_icmp(&mut self, comparison: OrdComparison, target: Label) -> Result<()> {
        self.line(format_args!(
            "if_icmp{} {}",
            ord_name(comparison),
            label_name(target)
        ))
    }

    fn branch_if_acmp(&mut self, comparison: EqComparison, target: Label) -> Result<()> {
        self.line(format_args!(
            "if_acmp{} {}",
            eq_name(comparison),
            label_name(target)
        ))
    }

    fn branch_if_null(&mut self, comparison: EqComparison, target: Label) -> Result<()> {
        let verb = match comparison {
            EqComparison::EQ => "ifnull",
            EqComparison::NE => "ifnonnull",
        };
        self.line(format_args!("{} {}", verb, label_name(target)))
    }

    fn switch(&mut self, default: Label, cases: &[(i32, Label)]) -> Result<()> {
        self.line(format_args!("switch default {}", label_name(default)))?;
        for &(value, target) in cases {
            self.line(format_args!("  case {} -> {}", value, label_name(target)))?;
        }
        Ok(())
    }

    fn call_subroutine(&mut self, target: Label) -> Result<()> {
        self.line(format_args!("jsr {}", label_name(target)))
    }

    fn return_subroutine(&mut self, var: LocalId) -> Result<()> {
        let display = self.local(var).to_string();
        self.line(format_args!("ret {}", display))
    }

    fn return_value(&mut self, kind: Option<ValueKind>) -> Result<()> {
        match kind {
            Some(kind) => self.line(format_args!("return {}", kind_name(kind))),
            None => self.line(format_args!("return")),
        }
    }

    fn throw(&mut self) -> Result<()> {
        self.line(format_args!("athrow"))
    }

    fn exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<()> {
        let catch = match catch_type {
            Some(class) => class.as_str().to_string(),
            None => "all".to_string(),
        };
        self.line(format_args!(
            ".handler {}..{} catch {} -> {}",
            label_name(start),
            label_name(end),
            catch,
            label_name(handler)
        ))
    }

    fn line_number(&mut self, line: u16) -> Result<()> {
        self.line(format_args!(".line {}", line))
    }
}
