mod common;

use common::{idx, ClassBuilder, TestProvider};
use tovm::classfile::defs::{
    ACC_ABSTRACT, ACC_FINAL, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC,
};
use tovm::runtime::opcodes as op;
use tovm::{Error, Provider, Value};

#[test]
fn static_initializer_runs_at_load_time() {
    let mut builder = ClassBuilder::new("com/demo/Init", "java/lang/Object");
    builder.add_field(ACC_STATIC, "X", "I");
    let x_ref = builder.add_field_ref("com/demo/Init", "X", "I");
    let mut code = vec![op::BIPUSH, 42, op::PUTSTATIC];
    code.extend_from_slice(&idx(x_ref));
    code.push(op::RETURN);
    builder.add_method(ACC_STATIC, "<clinit>", "()V", 1, 0, code, vec![]);

    let provider = TestProvider::new();
    let class = provider.load(&builder.build()).expect("class");
    assert_eq!(class.read_static_field("X", &provider).expect("X"), Value::Int(42));
    assert!(provider.loading().is_empty());
}

#[test]
fn static_initializer_can_set_final_statics() {
    let mut builder = ClassBuilder::new("com/demo/LateFinal", "java/lang/Object");
    builder.add_field(ACC_STATIC | ACC_FINAL, "F", "I");
    let f_ref = builder.add_field_ref("com/demo/LateFinal", "F", "I");
    let mut code = vec![op::BIPUSH, 7, op::PUTSTATIC];
    code.extend_from_slice(&idx(f_ref));
    code.push(op::RETURN);
    builder.add_method(ACC_STATIC, "<clinit>", "()V", 1, 0, code, vec![]);

    let provider = TestProvider::new();
    let class = provider.load(&builder.build()).expect("class");
    assert_eq!(class.read_static_field("F", &provider).expect("F"), Value::Int(7));
    // the bytecode write above went through; the public API still refuses
    assert!(matches!(
        class.write_static_field("F", Value::Int(8), &provider),
        Err(Error::FinalFieldWrite { .. })
    ));
}

#[test]
fn static_initializer_may_call_into_its_own_class() {
    let mut builder = ClassBuilder::new("com/demo/SelfRef", "java/lang/Object");
    builder.add_field(ACC_STATIC, "X", "I");
    let x_ref = builder.add_field_ref("com/demo/SelfRef", "X", "I");
    let answer_ref = builder.add_method_ref("com/demo/SelfRef", "answer", "()I");
    builder.add_method(
        ACC_STATIC,
        "answer",
        "()I",
        1,
        0,
        vec![op::BIPUSH, 42, op::IRETURN],
        vec![],
    );
    let mut code = vec![op::INVOKESTATIC];
    code.extend_from_slice(&idx(answer_ref));
    code.push(op::PUTSTATIC);
    code.extend_from_slice(&idx(x_ref));
    code.push(op::RETURN);
    builder.add_method(ACC_STATIC, "<clinit>", "()V", 1, 0, code, vec![]);

    let provider = TestProvider::new();
    let class = provider.load(&builder.build()).expect("class");
    assert_eq!(class.read_static_field("X", &provider).expect("X"), Value::Int(42));
}

#[test]
fn failed_static_initializer_aborts_the_load() {
    let mut builder = ClassBuilder::new("com/demo/Broken", "java/lang/Object");
    builder.add_method(
        ACC_STATIC,
        "<clinit>",
        "()V",
        2,
        0,
        vec![op::ICONST_1, op::ICONST_0, op::IDIV, op::POP, op::RETURN],
        vec![],
    );

    let provider = TestProvider::new();
    let result = provider.load(&builder.build());
    match result {
        Err(Error::Clinit { class, source }) => {
            assert_eq!(class, "com/demo/Broken");
            assert!(matches!(*source, Error::UncaughtException { .. }));
        }
        other => panic!("expected clinit failure, got {:?}", other.map(|c| c.name())),
    }
    // the failed class was never registered and the registry is clean
    assert!(provider.class("com/demo/Broken").is_none());
    assert!(provider.loading().is_empty());
}

#[test]
fn interfaces_are_resolved_during_parse() {
    let mut iface = ClassBuilder::new("com/demo/Iface", "java/lang/Object");
    iface.set_access_flags(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
    iface.add_codeless_method(ACC_PUBLIC | ACC_ABSTRACT, "m", "()I");

    let provider = TestProvider::new();
    provider.stage("com/demo/Iface", iface.build());

    let mut builder = ClassBuilder::new("com/demo/Impl", "java/lang/Object");
    builder.add_interface("com/demo/Iface");
    let class = provider.load(&builder.build()).expect("class");

    assert_eq!(class.interfaces(), vec!["com/demo/Iface".to_string()]);
    assert!(provider.class("com/demo/Iface").is_some());
}

#[test]
fn field_lookup_prefers_interfaces_over_the_superclass() {
    let provider = TestProvider::new();

    let mut base = ClassBuilder::new("com/demo/LBase", "java/lang/Object");
    let one = base.add_integer(1);
    base.add_const_field(ACC_STATIC | ACC_FINAL, "F", "I", one);
    base.add_field(ACC_STATIC, "ONLY_SUPER", "I");
    base.add_method(
        0,
        "base",
        "()I",
        1,
        1,
        vec![op::ICONST_1, op::IRETURN],
        vec![],
    );
    provider.load(&base.build()).expect("base");

    let mut iface = ClassBuilder::new("com/demo/LIface", "java/lang/Object");
    iface.set_access_flags(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
    let two = iface.add_integer(2);
    iface.add_const_field(ACC_STATIC | ACC_FINAL, "F", "I", two);
    iface.add_codeless_method(ACC_PUBLIC | ACC_ABSTRACT, "onlyIface", "()I");
    provider.load(&iface.build()).expect("iface");

    let mut builder = ClassBuilder::new("com/demo/LSub", "com/demo/LBase");
    builder.add_interface("com/demo/LIface");
    let class = provider.load(&builder.build()).expect("class");

    // interface constant shadows the superclass field of the same name
    assert_eq!(class.read_static_field("F", &provider).expect("F"), Value::Int(2));
    // fields fall back to the superclass when no interface declares them
    assert_eq!(
        class.read_static_field("ONLY_SUPER", &provider).expect("super"),
        Value::Int(0)
    );
    // methods search the superclass chain but never interfaces
    assert!(class.find_method("base", "()I", &provider).expect("base").is_some());
    assert!(class.find_method("onlyIface", "()I", &provider).expect("iface").is_none());
}

#[test]
fn circular_inner_class_records_do_not_recurse() {
    let provider = TestProvider::new();

    let mut inner = ClassBuilder::new("com/demo/Out$In", "java/lang/Object");
    inner.add_inner_class("com/demo/Out$In", Some("com/demo/Out"), Some("In"), 0);
    provider.stage("com/demo/Out$In", inner.build());

    let mut outer = ClassBuilder::new("com/demo/Out", "java/lang/Object");
    outer.add_inner_class("com/demo/Out$In", Some("com/demo/Out"), Some("In"), 0);
    let class = provider.load(&outer.build()).expect("outer");

    assert_eq!(class.inner_class_records().len(), 1);
    assert_eq!(class.inner_class_records()[0].inner_name(), Some("In"));
    assert!(provider.class("com/demo/Out$In").is_some());
    // only the outer class reported the linkage; the inner class was
    // mid-load when its own record came up
    assert_eq!(provider.inner_links(), vec!["com/demo/Out -> com/demo/Out$In".to_string()]);
    assert!(provider.loading().is_empty());
}

#[test]
fn mid_load_interface_references_are_skipped() {
    // an interface whose name is already mid-load is not re-resolved
    let provider = TestProvider::new();
    let guard = provider.loading().guard("com/demo/Cyclic".to_string());

    let mut builder = ClassBuilder::new("com/demo/UsesCyclic", "java/lang/Object");
    builder.add_interface("com/demo/Cyclic");
    let class = provider.load(&builder.build()).expect("class");

    assert_eq!(class.interfaces(), vec!["com/demo/Cyclic".to_string()]);
    assert!(provider.class("com/demo/Cyclic").is_none());
    drop(guard);
    assert!(provider.loading().is_empty());
}
