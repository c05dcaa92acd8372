// Common test utilities: an in-memory class-file builder and a scripted
// resolution provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tovm::classfile::class::InnerClassRecord;
use tovm::runtime::provider::ClassHandle;
use tovm::{JvmClass, LoadingNames, Provider, Result, Value};

const ATTR_CODE: &str = "Code";
const ATTR_CONSTANT_VALUE: &str = "ConstantValue";
const ATTR_INNER_CLASSES: &str = "InnerClasses";
const ATTR_SOURCE_FILE: &str = "SourceFile";

enum RawConst {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Str(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

struct FieldDef {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    constant_value: Option<(u16, u16)>,
}

struct MethodDef {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    code: Option<CodeDef>,
}

struct CodeDef {
    attr_name_index: u16,
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    catches: Vec<(u16, u16, u16, u16)>,
}

/// Assembles a class file in memory. Pool indices returned by the `add`
/// methods are the 1-based indices the finished file will use, so they can
/// be spliced into hand-written bytecode.
pub struct ClassBuilder {
    constants: Vec<RawConst>,
    utf8_cache: HashMap<String, u16>,
    next_index: u16,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    inner_classes: Vec<(u16, u16, u16, u16)>,
    inner_attr_name: Option<u16>,
    source_file: Option<(u16, u16)>,
}

impl ClassBuilder {
    pub fn new(name: &str, super_name: &str) -> Self {
        let mut builder = Self::rootless(name);
        builder.super_class = builder.add_class(super_name);
        builder
    }

    /// A class at the root of the hierarchy (superclass index 0)
    pub fn rootless(name: &str) -> Self {
        let mut builder = Self {
            constants: Vec::new(),
            utf8_cache: HashMap::new(),
            next_index: 1,
            access_flags: 0x0021, // public super
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            inner_attr_name: None,
            source_file: None,
        };
        builder.this_class = builder.add_class(name);
        builder
    }

    pub fn set_access_flags(&mut self, flags: u16) {
        self.access_flags = flags;
    }

    fn push_const(&mut self, constant: RawConst) -> u16 {
        let index = self.next_index;
        self.next_index += match constant {
            RawConst::Long(_) | RawConst::Double(_) => 2,
            _ => 1,
        };
        self.constants.push(constant);
        index
    }

    pub fn add_utf8(&mut self, text: &str) -> u16 {
        if let Some(&index) = self.utf8_cache.get(text) {
            return index;
        }
        let index = self.push_const(RawConst::Utf8(text.to_string()));
        self.utf8_cache.insert(text.to_string(), index);
        index
    }

    pub fn add_class(&mut self, name: &str) -> u16 {
        let name_index = self.add_utf8(name);
        self.push_const(RawConst::Class(name_index))
    }

    pub fn add_string(&mut self, text: &str) -> u16 {
        let value_index = self.add_utf8(text);
        self.push_const(RawConst::Str(value_index))
    }

    pub fn add_integer(&mut self, value: i32) -> u16 {
        self.push_const(RawConst::Integer(value))
    }

    pub fn add_float(&mut self, value: f32) -> u16 {
        self.push_const(RawConst::Float(value))
    }

    pub fn add_long(&mut self, value: i64) -> u16 {
        self.push_const(RawConst::Long(value))
    }

    pub fn add_double(&mut self, value: f64) -> u16 {
        self.push_const(RawConst::Double(value))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.push_const(RawConst::NameAndType(name_index, descriptor_index))
    }

    pub fn add_field_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class_name);
        let nat_index = self.add_name_and_type(name, descriptor);
        self.push_const(RawConst::FieldRef(class_index, nat_index))
    }

    pub fn add_method_ref(&mut self, class_name: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.add_class(class_name);
        let nat_index = self.add_name_and_type(name, descriptor);
        self.push_const(RawConst::MethodRef(class_index, nat_index))
    }

    pub fn add_interface_method_ref(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let class_index = self.add_class(class_name);
        let nat_index = self.add_name_and_type(name, descriptor);
        self.push_const(RawConst::InterfaceMethodRef(class_index, nat_index))
    }

    pub fn add_interface(&mut self, name: &str) {
        let index = self.add_class(name);
        self.interfaces.push(index);
    }

    pub fn add_field(&mut self, access_flags: u16, name: &str, descriptor: &str) {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.fields.push(FieldDef {
            access_flags,
            name_index,
            descriptor_index,
            constant_value: None,
        });
    }

    /// A field carrying a ConstantValue attribute referencing a pool index
    pub fn add_const_field(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        constant_index: u16,
    ) {
        let attr_name = self.add_utf8(ATTR_CONSTANT_VALUE);
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.fields.push(FieldDef {
            access_flags,
            name_index,
            descriptor_index,
            constant_value: Some((attr_name, constant_index)),
        });
    }

    pub fn add_method(
        &mut self,
        access_flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
        catches: Vec<(u16, u16, u16, u16)>,
    ) {
        let attr_name_index = self.add_utf8(ATTR_CODE);
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.methods.push(MethodDef {
            access_flags,
            name_index,
            descriptor_index,
            code: Some(CodeDef {
                attr_name_index,
                max_stack,
                max_locals,
                code,
                catches,
            }),
        });
    }

    /// A method without a Code attribute (native or abstract)
    pub fn add_codeless_method(&mut self, access_flags: u16, name: &str, descriptor: &str) {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(descriptor);
        self.methods.push(MethodDef {
            access_flags,
            name_index,
            descriptor_index,
            code: None,
        });
    }

    pub fn add_inner_class(
        &mut self,
        inner_name: &str,
        outer_name: Option<&str>,
        simple_name: Option<&str>,
        access_flags: u16,
    ) {
        let attr_name = self.add_utf8(ATTR_INNER_CLASSES);
        self.inner_attr_name = Some(attr_name);
        let inner_index = self.add_class(inner_name);
        let outer_index = outer_name.map_or(0, |name| self.add_class(name));
        let simple_index = simple_name.map_or(0, |name| self.add_utf8(name));
        self.inner_classes
            .push((inner_index, outer_index, simple_index, access_flags));
    }

    pub fn set_source_file(&mut self, file_name: &str) {
        let attr_name = self.add_utf8(ATTR_SOURCE_FILE);
        let value_index = self.add_utf8(file_name);
        self.source_file = Some((attr_name, value_index));
    }

    pub fn build(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        push_u32(&mut bytes, 0xCAFEBABE);
        push_u16(&mut bytes, 0); // minor version
        push_u16(&mut bytes, 51); // major version

        push_u16(&mut bytes, self.next_index);
        for constant in &self.constants {
            match constant {
                RawConst::Utf8(text) => {
                    bytes.push(1);
                    push_u16(&mut bytes, text.len() as u16);
                    bytes.extend_from_slice(text.as_bytes());
                }
                RawConst::Integer(value) => {
                    bytes.push(3);
                    push_u32(&mut bytes, *value as u32);
                }
                RawConst::Float(value) => {
                    bytes.push(4);
                    push_u32(&mut bytes, value.to_bits());
                }
                RawConst::Long(value) => {
                    bytes.push(5);
                    bytes.extend_from_slice(&(*value as u64).to_be_bytes());
                }
                RawConst::Double(value) => {
                    bytes.push(6);
                    bytes.extend_from_slice(&value.to_bits().to_be_bytes());
                }
                RawConst::Class(index) => {
                    bytes.push(7);
                    push_u16(&mut bytes, *index);
                }
                RawConst::Str(index) => {
                    bytes.push(8);
                    push_u16(&mut bytes, *index);
                }
                RawConst::FieldRef(class_index, nat_index) => {
                    bytes.push(9);
                    push_u16(&mut bytes, *class_index);
                    push_u16(&mut bytes, *nat_index);
                }
                RawConst::MethodRef(class_index, nat_index) => {
                    bytes.push(10);
                    push_u16(&mut bytes, *class_index);
                    push_u16(&mut bytes, *nat_index);
                }
                RawConst::InterfaceMethodRef(class_index, nat_index) => {
                    bytes.push(11);
                    push_u16(&mut bytes, *class_index);
                    push_u16(&mut bytes, *nat_index);
                }
                RawConst::NameAndType(name_index, descriptor_index) => {
                    bytes.push(12);
                    push_u16(&mut bytes, *name_index);
                    push_u16(&mut bytes, *descriptor_index);
                }
            }
        }

        push_u16(&mut bytes, self.access_flags);
        push_u16(&mut bytes, self.this_class);
        push_u16(&mut bytes, self.super_class);

        push_u16(&mut bytes, self.interfaces.len() as u16);
        for index in &self.interfaces {
            push_u16(&mut bytes, *index);
        }

        push_u16(&mut bytes, self.fields.len() as u16);
        for field in &self.fields {
            push_u16(&mut bytes, field.access_flags);
            push_u16(&mut bytes, field.name_index);
            push_u16(&mut bytes, field.descriptor_index);
            match field.constant_value {
                Some((attr_name, constant_index)) => {
                    push_u16(&mut bytes, 1);
                    push_u16(&mut bytes, attr_name);
                    push_u32(&mut bytes, 2);
                    push_u16(&mut bytes, constant_index);
                }
                None => push_u16(&mut bytes, 0),
            }
        }

        push_u16(&mut bytes, self.methods.len() as u16);
        for method in &self.methods {
            push_u16(&mut bytes, method.access_flags);
            push_u16(&mut bytes, method.name_index);
            push_u16(&mut bytes, method.descriptor_index);
            match &method.code {
                Some(code) => {
                    push_u16(&mut bytes, 1);
                    push_u16(&mut bytes, code.attr_name_index);
                    let length = 2 + 2 + 4 + code.code.len() + 2 + 8 * code.catches.len() + 2;
                    push_u32(&mut bytes, length as u32);
                    push_u16(&mut bytes, code.max_stack);
                    push_u16(&mut bytes, code.max_locals);
                    push_u32(&mut bytes, code.code.len() as u32);
                    bytes.extend_from_slice(&code.code);
                    push_u16(&mut bytes, code.catches.len() as u16);
                    for (start, end, handler, catch_type) in &code.catches {
                        push_u16(&mut bytes, *start);
                        push_u16(&mut bytes, *end);
                        push_u16(&mut bytes, *handler);
                        push_u16(&mut bytes, *catch_type);
                    }
                    push_u16(&mut bytes, 0); // no nested attributes
                }
                None => push_u16(&mut bytes, 0),
            }
        }

        let mut attribute_count = 0u16;
        if !self.inner_classes.is_empty() {
            attribute_count += 1;
        }
        if self.source_file.is_some() {
            attribute_count += 1;
        }
        push_u16(&mut bytes, attribute_count);
        if !self.inner_classes.is_empty() {
            push_u16(&mut bytes, self.inner_attr_name.expect("attr name"));
            push_u32(&mut bytes, (2 + 8 * self.inner_classes.len()) as u32);
            push_u16(&mut bytes, self.inner_classes.len() as u16);
            for (inner, outer, simple, flags) in &self.inner_classes {
                push_u16(&mut bytes, *inner);
                push_u16(&mut bytes, *outer);
                push_u16(&mut bytes, *simple);
                push_u16(&mut bytes, *flags);
            }
        }
        if let Some((attr_name, value_index)) = self.source_file {
            push_u16(&mut bytes, attr_name);
            push_u32(&mut bytes, 2);
            push_u16(&mut bytes, value_index);
        }

        bytes
    }
}

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_be_bytes());
}

/// Invoke a static method declared on the class itself
pub fn run_static(
    provider: &TestProvider,
    class: &Arc<JvmClass>,
    name: &str,
    signature: &str,
    args: &[Value],
) -> Result<Option<Value>> {
    let method = class
        .find_declared_method(name, signature)
        .unwrap_or_else(|| panic!("method {}{} not declared", name, signature));
    tovm::invoke(provider, class, None, &method, args, None, None)
}

/// Big-endian halves of a pool index, for splicing into bytecode
pub fn idx(index: u16) -> [u8; 2] {
    index.to_be_bytes()
}

pub fn be16(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}

pub fn be32(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

/// A provider backed by maps: parsed classes are cached by name, classes
/// staged as raw bytes are parsed lazily when first resolved, and native
/// invocations are recorded and answered from a script.
#[derive(Default)]
pub struct TestProvider {
    loading: LoadingNames,
    classes: Mutex<HashMap<String, Arc<JvmClass>>>,
    staged: Mutex<HashMap<String, Vec<u8>>>,
    native_calls: Mutex<Vec<String>>,
    native_results: Mutex<HashMap<String, Value>>,
    inner_links: Mutex<Vec<String>>,
}

impl TestProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, bytes: &[u8]) -> Result<Arc<JvmClass>> {
        JvmClass::parse(bytes, self)
    }

    pub fn class(&self, name: &str) -> Option<Arc<JvmClass>> {
        self.classes.lock().expect("classes").get(name).cloned()
    }

    /// Park class bytes to be parsed on first resolution by name
    pub fn stage(&self, name: &str, bytes: Vec<u8>) {
        self.staged.lock().expect("staged").insert(name.to_string(), bytes);
    }

    /// Script the result of a native invocation keyed by
    /// `class.name(signature)return`
    pub fn script_native(&self, key: &str, value: Value) {
        self.native_results
            .lock()
            .expect("script")
            .insert(key.to_string(), value);
    }

    pub fn native_calls(&self) -> Vec<String> {
        self.native_calls.lock().expect("calls").clone()
    }

    pub fn inner_links(&self) -> Vec<String> {
        self.inner_links.lock().expect("links").clone()
    }
}

impl Provider for TestProvider {
    fn resolve_class(&self, class_name: &str) -> Result<Option<ClassHandle>> {
        if let Some(class) = self.class(class_name) {
            return Ok(Some(ClassHandle::Vm(class)));
        }
        let staged = self.staged.lock().expect("staged").remove(class_name);
        match staged {
            Some(bytes) => Ok(Some(ClassHandle::Vm(JvmClass::parse(&bytes, self)?))),
            None => Ok(None),
        }
    }

    fn resolve_inner_class(&self, outer: &JvmClass, record: &InnerClassRecord) -> Result<()> {
        self.inner_links.lock().expect("links").push(format!(
            "{} -> {}",
            outer.class_name(),
            record.inner_class_name()
        ));
        let staged = self
            .staged
            .lock()
            .expect("staged")
            .remove(record.inner_class_name());
        if let Some(bytes) = staged {
            JvmClass::parse(&bytes, self)?;
        }
        Ok(())
    }

    fn register_external_class(&self, class_name: &str, class: Arc<JvmClass>) -> Result<()> {
        self.classes
            .lock()
            .expect("classes")
            .insert(class_name.to_string(), class);
        Ok(())
    }

    fn invoke_native(
        &self,
        class_name: &str,
        _receiver: Option<&Value>,
        method_name: &str,
        method_signature: &str,
        _args: &[Value],
    ) -> Result<Option<Value>> {
        let key = format!("{}.{}{}", class_name, method_name, method_signature);
        self.native_calls.lock().expect("calls").push(key.clone());
        Ok(self.native_results.lock().expect("script").get(&key).cloned())
    }

    fn loading(&self) -> &LoadingNames {
        &self.loading
    }
}
