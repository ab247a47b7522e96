//! End-to-end write/read/re-assemble cycles over whole class files

use jclass::access_flags::{ClassAccessFlags, MethodAccessFlags};
use jclass::code::{CodeBuilder, InstructionSink, OrdComparison, StackOp, ValueKind};
use jclass::descriptors::{FieldType, MethodDescriptor};
use jclass::disasm::{reassemble_class, CodePrinter, Disassembler};
use jclass::errors::Result;
use jclass::model::{Attribute, AttributeRegistry, Class, LoadedClass, Method};
use jclass::names::{BinaryName, Name, UnqualifiedName};
use jclass::pool::ConstantPool;
use pretty_assertions::assert_eq;

fn static_method(
    pool: &mut ConstantPool,
    name: &str,
    descriptor: MethodDescriptor<BinaryName>,
    build: impl FnOnce(&mut CodeBuilder) -> Result<()>,
) -> Method {
    let mut builder = CodeBuilder::new(pool, None, &descriptor);
    build(&mut builder).unwrap();
    let code = builder.finish().unwrap();
    let mut method = Method::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        UnqualifiedName::from_string(name.to_string()).unwrap(),
        descriptor,
    );
    method.code = Some(code);
    method
}

/// `demo/Counter` with a counting loop and a string constant
fn sample_class(pool: &mut ConstantPool) -> Class {
    let mut class = Class::new(
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        BinaryName::from_string("demo/Counter".to_string()).unwrap(),
        Some(BinaryName::OBJECT),
    );

    let sum_descriptor = MethodDescriptor {
        parameters: vec![FieldType::int()],
        return_type: Some(FieldType::int()),
    };
    class.add_method(static_method(pool, "sumUpTo", sum_descriptor, |asm| {
        let n = asm.parameters()[0];
        let total = asm.new_local(FieldType::int(), Some("total"))?;
        let i = asm.new_local(FieldType::int(), Some("i"))?;
        asm.push_int(0)?;
        asm.store_local(ValueKind::Int, total)?;
        asm.push_int(0)?;
        asm.store_local(ValueKind::Int, i)?;

        let check = asm.fresh_label();
        let done = asm.fresh_label();
        asm.place_label(check)?;
        asm.load_local(ValueKind::Int, i)?;
        asm.load_local(ValueKind::Int, n)?;
        asm.branch_if_icmp(OrdComparison::GE, done)?;
        asm.load_local(ValueKind::Int, total)?;
        asm.load_local(ValueKind::Int, i)?;
        asm.arith(jclass::code::ArithOp::Add, jclass::code::NumericKind::Int)?;
        asm.store_local(ValueKind::Int, total)?;
        asm.increment_local(i, 1)?;
        asm.jump(check)?;
        asm.place_label(done)?;
        asm.load_local(ValueKind::Int, total)?;
        asm.return_value(Some(ValueKind::Int))
    }));

    let greeting_descriptor = MethodDescriptor {
        parameters: vec![],
        return_type: Some(FieldType::object(BinaryName::STRING)),
    };
    class.add_method(static_method(pool, "greeting", greeting_descriptor, |asm| {
        asm.push_string("hello, world")?;
        asm.return_value(Some(ValueKind::Reference))
    }));

    class
}

fn serialized(class: &Class, pool: &mut ConstantPool) -> Vec<u8> {
    let mut bytes = vec![];
    class.serialize(pool, &mut bytes).unwrap();
    bytes
}

#[test]
fn write_read_reassemble_write() {
    let mut pool = ConstantPool::new();
    let class = sample_class(&mut pool);
    let first = serialized(&class, &mut pool);

    let registry = AttributeRegistry::standard();
    let (read_class, read_pool) = Class::read(&mut &first[..], &registry).unwrap();
    assert_eq!(read_class.this_class.as_str(), "demo/Counter");
    assert_eq!(read_class.methods.len(), 2);

    let loaded = LoadedClass {
        class: read_class,
        pool: read_pool,
        nested: vec![],
    };
    let mut second_pool = ConstantPool::new();
    let rebuilt = reassemble_class(&loaded, &mut second_pool).unwrap();
    let second = serialized(&rebuilt, &mut second_pool);
    assert_eq!(second, first);
}

#[test]
fn printed_listing_uses_table_names() {
    let mut pool = ConstantPool::new();
    let class = sample_class(&mut pool);
    let bytes = serialized(&class, &mut pool);

    let registry = AttributeRegistry::standard();
    let (read_class, read_pool) = Class::read(&mut &bytes[..], &registry).unwrap();
    let method = &read_class.methods[0];
    let body = read_class.methods[0]
        .attributes
        .iter()
        .find_map(|attribute| match attribute {
            Attribute::Code(body) => Some(body),
            _ => None,
        })
        .unwrap();

    let mut printer = CodePrinter::new(vec![], None, &method.descriptor);
    Disassembler::new()
        .disassemble(body, &read_pool, &method.descriptor, false, &mut printer)
        .unwrap();
    let listing = String::from_utf8(printer.into_inner()).unwrap();

    // Local names survive through the LocalVariableTable
    assert!(listing.contains("store int total"), "{}", listing);
    assert!(listing.contains("inc i 1"), "{}", listing);
    assert!(listing.contains("if_icmpge "), "{}", listing);
    assert!(listing.contains("load int arg0"), "{}", listing);
}

#[test]
fn oversized_branch_widens_and_round_trips() {
    let mut pool = ConstantPool::new();
    let descriptor = MethodDescriptor {
        parameters: vec![],
        return_type: None,
    };
    let mut builder = CodeBuilder::new(&mut pool, None, &descriptor);
    let end = builder.fresh_label();
    builder.push_int(0).unwrap();
    builder.branch_if(OrdComparison::NE, end).unwrap();
    // 12000 sipush/pop pairs put the target about 48000 bytes away
    for _ in 0..12_000 {
        builder.push_int(500).unwrap();
        builder.stack_op(StackOp::Pop).unwrap();
    }
    builder.place_label(end).unwrap();
    builder.return_value(None).unwrap();
    let code = builder.finish().unwrap();
    pool.assign_indices().unwrap();
    let body = code.resolve(&pool).unwrap();

    // The conditional is negated around a goto_w
    assert_eq!(body.bytecode[1], 0x99); // ifeq over the wide jump
    assert_eq!(&body.bytecode[2..4], &[0x00, 0x08]);
    assert_eq!(body.bytecode[4], 0xc8); // goto_w
    assert_eq!(body.bytecode.len(), 1 + 8 + 12_000 * 4 + 1);

    let mut raw = vec![];
    ConstantPool::new().serialize(&mut raw).unwrap();
    let empty_pool = jclass::pool::LoadedPool::read(&mut &raw[..]).unwrap();
    let mut second_pool = ConstantPool::new();
    let rebuilt =
        jclass::disasm::reassemble(&body, &empty_pool, None, &descriptor, &mut second_pool)
            .unwrap();
    second_pool.assign_indices().unwrap();
    let rebuilt = rebuilt.resolve(&second_pool).unwrap();
    assert_eq!(rebuilt.bytecode, body.bytecode);
}
