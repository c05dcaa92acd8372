//! Instances of parsed classes

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::classfile::class::JvmClass;
use crate::error::{Error, Result};
use crate::runtime::value::Value;

/// A field-name-to-value container bound to its originating class.
///
/// Instance fields are default-initialized by `JvmClass::new_instance`
/// before any constructor runs; the class reference is shared, not owned.
#[derive(Debug)]
pub struct JvmObject {
    class: Arc<JvmClass>,
    fields: Mutex<HashMap<String, Value>>,
}

impl JvmObject {
    pub fn new(class: Arc<JvmClass>) -> Arc<Self> {
        Arc::new(Self {
            class,
            fields: Mutex::new(HashMap::new()),
        })
    }

    pub fn class(&self) -> &Arc<JvmClass> {
        &self.class
    }

    pub fn get_field(&self, name: &str) -> Result<Value> {
        self.fields
            .lock()
            .expect("object poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchField {
                class: self.class.class_name().to_string(),
                field: name.to_string(),
            })
    }

    /// Write a field. With `check_final` set the write is refused when the
    /// declared field is final; the interpreter clears the flag so
    /// constructors can initialize finals.
    pub fn set_field(&self, name: &str, value: Value, check_final: bool) -> Result<()> {
        if check_final {
            if let Some(declared) = self.class.find_declared_field(name) {
                if declared.is_final() {
                    return Err(Error::FinalFieldWrite {
                        class: self.class.class_name().to_string(),
                        field: name.to_string(),
                    });
                }
            }
        }
        self.fields
            .lock()
            .expect("object poisoned")
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Unchecked write used during default initialization
    pub(crate) fn init_field(&self, name: &str, value: Value) {
        self.fields
            .lock()
            .expect("object poisoned")
            .insert(name.to_string(), value);
    }
}
