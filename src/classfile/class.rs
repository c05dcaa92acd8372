//! Class model: parse pipeline, lookup rules, instantiation and statics
//!
//! A `JvmClass` is built by one strictly sequential pass over a class-file
//! byte stream. Superclass resolution is deferred until first use;
//! interfaces are resolved eagerly during parse so that field lookup
//! through them works for the rest of the pipeline. The name of the class
//! sits in the provider's loading registry for the whole parse, which is
//! what breaks self-referential and mutually recursive loads.

use std::collections::HashMap;
use std::sync::Arc;

use crate::classfile::constpool::ConstantPool;
use crate::classfile::defs::{
    canonical_class_name, normalize_class_name, ACC_ANNOTATION, ACC_ENUM, ACC_INTERFACE, MAGIC,
    CONSTRUCTOR_METHOD_NAME, NO_ARG_VOID_SIGNATURE, STATIC_INITIALIZER_METHOD_NAME,
};
use crate::classfile::field::JvmField;
use crate::classfile::method::{make_method_uid, JvmMethod};
use crate::classfile::reader::ClassReader;
use crate::error::{Error, Result};
use crate::runtime::interpreter;
use crate::runtime::object::JvmObject;
use crate::runtime::provider::{ClassHandle, Provider};
use crate::runtime::value::Value;

const ATTR_INNER_CLASSES: &str = "InnerClasses";
const ATTR_SOURCE_FILE: &str = "SourceFile";

/// One entry of the InnerClasses attribute, names resolved eagerly
#[derive(Debug, Clone)]
pub struct InnerClassRecord {
    inner_class_name: String,
    outer_class_name: Option<String>,
    inner_name: Option<String>,
    access_flags: u16,
}

impl InnerClassRecord {
    fn parse(reader: &mut ClassReader, pool: &ConstantPool) -> Result<Self> {
        let inner_info_index = reader.read_u16()?;
        let outer_info_index = reader.read_u16()?;
        let inner_name_index = reader.read_u16()?;
        let access_flags = reader.read_u16()?;
        Ok(Self {
            inner_class_name: pool.as_string(inner_info_index)?,
            outer_class_name: if outer_info_index == 0 {
                None
            } else {
                Some(pool.as_string(outer_info_index)?)
            },
            inner_name: if inner_name_index == 0 {
                None
            } else {
                Some(pool.as_string(inner_name_index)?)
            },
            access_flags,
        })
    }

    /// Jvm formatted name of the inner class itself
    pub fn inner_class_name(&self) -> &str {
        &self.inner_class_name
    }

    pub fn outer_class_name(&self) -> Option<&str> {
        self.outer_class_name.as_deref()
    }

    /// Simple inner name; `None` for anonymous classes
    pub fn inner_name(&self) -> Option<&str> {
        self.inner_name.as_deref()
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }
}

/// A parsed class: structure is immutable once parsing completes; static
/// field cells are the only state that keeps changing afterwards.
#[derive(Debug)]
pub struct JvmClass {
    format_version: u32,
    access_flags: u16,
    class_name: String,
    superclass_name_index: u16,
    constant_pool: ConstantPool,
    interfaces: Vec<String>,
    declared_fields: HashMap<String, Arc<JvmField>>,
    declared_methods: HashMap<String, Arc<JvmMethod>>,
    inner_classes: Vec<InnerClassRecord>,
    source_file: Option<String>,
}

impl JvmClass {
    /// Parse one class file and run its loading pipeline to completion:
    /// structure, inner-class notifications, static initializer,
    /// registration with the provider. A class is never partially
    /// installed; any failure aborts the load before registration.
    pub fn parse(bytes: &[u8], provider: &dyn Provider) -> Result<Arc<Self>> {
        let mut reader = ClassReader::new(bytes);

        if reader.read_u32()? != MAGIC {
            return Err(Error::format_error("not a Java class file"));
        }
        let format_version = reader.read_u32()?;
        let constant_pool = ConstantPool::parse(&mut reader)?;
        let access_flags = reader.read_u16()?;
        let class_name = constant_pool.as_string(reader.read_u16()?)?;

        // From here until every step below finishes (or fails) the name is
        // mid-load; the guard removes it again on all exit paths.
        let _loading = provider.loading().guard(class_name.clone());

        let superclass_name_index = reader.read_u16()?;

        let interface_count = reader.read_u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            let interface_name = constant_pool.as_string(reader.read_u16()?)?;
            if !provider.loading().contains(&interface_name) {
                provider.resolve_class(&interface_name)?;
            }
            interfaces.push(interface_name);
        }

        let declared_fields = Self::load_fields(&mut reader, &constant_pool)?;
        let declared_methods = Self::load_methods(&mut reader, &constant_pool)?;

        let mut inner_classes = Vec::new();
        let mut source_file = None;
        let mut attribute_count = reader.read_u16()?;
        while attribute_count > 0 {
            attribute_count -= 1;
            let attr_name_index = reader.read_u16()?;
            let data_size = reader.read_u32()? as usize;
            let attr_name = constant_pool.as_string(attr_name_index)?;
            if attr_name == ATTR_INNER_CLASSES {
                let record_count = reader.read_u16()?;
                for _ in 0..record_count {
                    inner_classes.push(InnerClassRecord::parse(&mut reader, &constant_pool)?);
                }
            } else if attr_name == ATTR_SOURCE_FILE {
                source_file = Some(constant_pool.as_string(reader.read_u16()?)?);
            } else {
                reader.skip(data_size)?;
            }
        }

        let class = Arc::new(Self {
            format_version,
            access_flags,
            class_name,
            superclass_name_index,
            constant_pool,
            interfaces,
            declared_fields,
            declared_methods,
            inner_classes,
            source_file,
        });

        // Inner-class linkage is only reported for classes that are not
        // themselves mid-load, otherwise cyclic records would recurse.
        for record in &class.inner_classes {
            if provider.loading().contains(record.inner_class_name()) {
                continue;
            }
            provider.resolve_inner_class(&class, record)?;
        }

        if let Some(clinit) =
            class.find_declared_method(STATIC_INITIALIZER_METHOD_NAME, NO_ARG_VOID_SIGNATURE)
        {
            interpreter::invoke(provider, &class, None, &clinit, &[], None, None).map_err(
                |source| Error::Clinit {
                    class: class.class_name.clone(),
                    source: Box::new(source),
                },
            )?;
        }

        provider.register_external_class(&class.class_name, Arc::clone(&class))?;
        Ok(class)
    }

    fn load_fields(
        reader: &mut ClassReader,
        pool: &ConstantPool,
    ) -> Result<HashMap<String, Arc<JvmField>>> {
        let count = reader.read_u16()?;
        let mut fields = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let field = JvmField::parse(reader, pool)?;
            fields.insert(field.name().to_string(), Arc::new(field));
        }
        Ok(fields)
    }

    fn load_methods(
        reader: &mut ClassReader,
        pool: &ConstantPool,
    ) -> Result<HashMap<String, Arc<JvmMethod>>> {
        let count = reader.read_u16()?;
        let mut methods = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let method = JvmMethod::parse(reader, pool)?;
            methods.insert(method.uid(), Arc::new(method));
        }
        Ok(methods)
    }

    /// Jvm formatted class name like `java/lang/Object$1`
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Class name in normal format like `java.lang.Object$1`
    pub fn name(&self) -> String {
        normalize_class_name(&self.class_name)
    }

    /// Class name in canonical format like `java.lang.Object.1`
    pub fn canonical_name(&self) -> String {
        canonical_class_name(&self.class_name)
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags & ACC_ANNOTATION != 0
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags & ACC_ENUM != 0
    }

    /// Jvm formatted names of the directly implemented interfaces
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn inner_class_records(&self) -> &[InnerClassRecord] {
        &self.inner_classes
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    pub fn constant_pool(&self) -> &ConstantPool {
        &self.constant_pool
    }

    pub fn declared_fields(&self) -> &HashMap<String, Arc<JvmField>> {
        &self.declared_fields
    }

    pub fn declared_methods(&self) -> &HashMap<String, Arc<JvmMethod>> {
        &self.declared_methods
    }

    /// Jvm formatted superclass name, `None` at the root of the hierarchy
    pub fn superclass_name(&self) -> Result<Option<String>> {
        if self.superclass_name_index == 0 {
            return Ok(None);
        }
        Ok(Some(self.constant_pool.as_string(self.superclass_name_index)?))
    }

    /// Resolve the superclass through the provider, lazily
    pub fn resolve_superclass(&self, provider: &dyn Provider) -> Result<Option<ClassHandle>> {
        match self.superclass_name()? {
            Some(name) => provider.resolve_class(&name),
            None => Ok(None),
        }
    }

    /// Field declared by this class only
    pub fn find_declared_field(&self, field_name: &str) -> Option<Arc<JvmField>> {
        self.declared_fields.get(field_name).cloned()
    }

    /// Method declared by this class only, keyed by name and signature
    pub fn find_declared_method(
        &self,
        method_name: &str,
        method_signature: &str,
    ) -> Option<Arc<JvmMethod>> {
        self.declared_methods
            .get(&make_method_uid(method_name, method_signature))
            .cloned()
    }

    /// Field lookup through the class, its interfaces (depth first, in
    /// declaration order) and then the superclass chain
    pub fn find_field(
        &self,
        field_name: &str,
        provider: &dyn Provider,
    ) -> Result<Option<Arc<JvmField>>> {
        if let Some(field) = self.find_declared_field(field_name) {
            return Ok(Some(field));
        }
        for interface_name in &self.interfaces {
            if let Some(ClassHandle::Vm(interface)) = provider.resolve_class(interface_name)? {
                if let Some(field) = interface.find_field(field_name, provider)? {
                    return Ok(Some(field));
                }
            }
        }
        match self.resolve_superclass(provider)? {
            Some(ClassHandle::Vm(superclass)) => superclass.find_field(field_name, provider),
            _ => Ok(None),
        }
    }

    /// Method lookup through the class and its superclass chain.
    /// Interfaces are not searched: they carry no method bodies here.
    pub fn find_method(
        self: &Arc<Self>,
        method_name: &str,
        method_signature: &str,
        provider: &dyn Provider,
    ) -> Result<Option<Arc<JvmMethod>>> {
        Ok(self
            .find_method_with_owner(method_name, method_signature, provider)?
            .map(|(_, method)| method))
    }

    /// Like `find_method`, additionally returning the class that declares
    /// the method. The declaring class carries the constant pool the
    /// method's bytecode indexes into.
    pub fn find_method_with_owner(
        self: &Arc<Self>,
        method_name: &str,
        method_signature: &str,
        provider: &dyn Provider,
    ) -> Result<Option<(Arc<JvmClass>, Arc<JvmMethod>)>> {
        let mut current = Arc::clone(self);
        loop {
            if let Some(method) = current.find_declared_method(method_name, method_signature) {
                return Ok(Some((current, method)));
            }
            match current.resolve_superclass(provider)? {
                Some(ClassHandle::Vm(superclass)) => current = superclass,
                _ => return Ok(None),
            }
        }
    }

    /// Allocate a new instance, optionally running the default constructor
    pub fn new_instance(
        self: &Arc<Self>,
        run_constructor: bool,
        provider: &dyn Provider,
    ) -> Result<Arc<JvmObject>> {
        let object = JvmObject::new(Arc::clone(self));
        self.init_fields(&object, provider)?;
        if run_constructor {
            let constructor = self
                .find_declared_method(CONSTRUCTOR_METHOD_NAME, NO_ARG_VOID_SIGNATURE)
                .ok_or_else(|| Error::NoSuchMethod {
                    class: self.class_name.clone(),
                    name: CONSTRUCTOR_METHOD_NAME.to_string(),
                    signature: NO_ARG_VOID_SIGNATURE.to_string(),
                })?;
            interpreter::invoke(
                provider,
                self,
                Some(Value::Object(Arc::clone(&object))),
                &constructor,
                &[],
                None,
                None,
            )?;
        }
        Ok(object)
    }

    /// Allocate a new instance and run the constructor with the given
    /// signature and arguments. `stack` and `locals` may carry reusable
    /// scratch buffers; `None` allocates fresh ones.
    pub fn new_instance_with(
        self: &Arc<Self>,
        constructor_signature: &str,
        args: &[Value],
        stack: Option<&mut Vec<Value>>,
        locals: Option<&mut Vec<Value>>,
        provider: &dyn Provider,
    ) -> Result<Arc<JvmObject>> {
        let (declaring, constructor) = self
            .find_method_with_owner(CONSTRUCTOR_METHOD_NAME, constructor_signature, provider)?
            .ok_or_else(|| Error::NoSuchMethod {
                class: self.class_name.clone(),
                name: CONSTRUCTOR_METHOD_NAME.to_string(),
                signature: constructor_signature.to_string(),
            })?;
        let object = JvmObject::new(Arc::clone(self));
        self.init_fields(&object, provider)?;
        interpreter::invoke(
            provider,
            &declaring,
            Some(Value::Object(Arc::clone(&object))),
            &constructor,
            args,
            stack,
            locals,
        )?;
        Ok(object)
    }

    /// Default-initialize declared instance fields, superclass first.
    /// Static fields are skipped: their cells were set at load time.
    fn init_fields(&self, object: &JvmObject, provider: &dyn Provider) -> Result<()> {
        if let Some(ClassHandle::Vm(superclass)) = self.resolve_superclass(provider)? {
            superclass.init_fields(object, provider)?;
        }
        for field in self.declared_fields.values() {
            if !field.is_static() {
                object.init_field(field.name(), field.default_value()?);
            }
        }
        Ok(())
    }

    /// Read a static field, inherited statics included
    pub fn read_static_field(&self, field_name: &str, provider: &dyn Provider) -> Result<Value> {
        let field = self
            .find_field(field_name, provider)?
            .ok_or_else(|| Error::NoSuchField {
                class: self.class_name.clone(),
                field: field_name.to_string(),
            })?;
        Ok(field.static_value())
    }

    /// Write a static field; refuses final fields. The interpreter's
    /// `putstatic` writes the cell directly so `<clinit>` can initialize
    /// finals.
    pub fn write_static_field(
        &self,
        field_name: &str,
        value: Value,
        provider: &dyn Provider,
    ) -> Result<()> {
        let field = self
            .find_field(field_name, provider)?
            .ok_or_else(|| Error::NoSuchField {
                class: self.class_name.clone(),
                field: field_name.to_string(),
            })?;
        if field.is_final() {
            return Err(Error::FinalFieldWrite {
                class: self.class_name.clone(),
                field: field_name.to_string(),
            });
        }
        field.set_static_value(value);
        Ok(())
    }
}
