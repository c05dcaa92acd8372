//! Parsed field of a class

use std::sync::Mutex;

use crate::classfile::constpool::{Constant, ConstantPool};
use crate::classfile::defs::{
    ACC_FINAL, ACC_STATIC, TYPE_BOOLEAN, TYPE_BYTE, TYPE_CHAR, TYPE_DOUBLE, TYPE_FLOAT, TYPE_INT,
    TYPE_LONG, TYPE_SHORT,
};
use crate::classfile::reader::ClassReader;
use crate::error::{Error, Result};
use crate::runtime::value::Value;

const ATTR_CONSTANT_VALUE: &str = "ConstantValue";

/// A declared field: name, type signature, flags and a value cell.
///
/// The cell stores the current value for static fields and the computed
/// default for instance fields. It is the only part of a class that stays
/// mutable after parsing.
#[derive(Debug)]
pub struct JvmField {
    access_flags: u16,
    name: String,
    signature: String,
    static_value: Mutex<Value>,
}

impl JvmField {
    /// Parse one field_info structure. A recognized `ConstantValue`
    /// attribute initializes the value cell; all other attributes are
    /// skipped by length.
    pub fn parse(reader: &mut ClassReader, pool: &ConstantPool) -> Result<Self> {
        let access_flags = reader.read_u16()?;
        let name = pool.as_string(reader.read_u16()?)?;
        let signature = pool.as_string(reader.read_u16()?)?;

        let mut value = default_value_for(&signature)?;
        let mut attribute_count = reader.read_u16()?;
        while attribute_count > 0 {
            attribute_count -= 1;
            let attr_name_index = reader.read_u16()?;
            let data_size = reader.read_u32()? as usize;
            let attr_name = pool.as_string(attr_name_index)?;
            if attr_name == ATTR_CONSTANT_VALUE {
                let constant_index = reader.read_u16()?;
                value = constant_to_value(pool, constant_index)?;
            } else {
                reader.skip(data_size)?;
            }
        }

        Ok(Self {
            access_flags,
            name,
            signature,
            static_value: Mutex::new(value),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn access_flags(&self) -> u16 {
        self.access_flags
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_final(&self) -> bool {
        self.access_flags & ACC_FINAL != 0
    }

    /// Current value of the cell; the default value for instance fields
    pub fn static_value(&self) -> Value {
        self.static_value.lock().expect("field cell poisoned").clone()
    }

    pub fn set_static_value(&self, value: Value) {
        *self.static_value.lock().expect("field cell poisoned") = value;
    }

    /// Default value for a fresh instance field of this type
    pub fn default_value(&self) -> Result<Value> {
        default_value_for(&self.signature)
    }
}

/// Default value per field type: zero for numeric primitives, false for
/// booleans, null for any reference type
pub fn default_value_for(signature: &str) -> Result<Value> {
    if signature.len() > 1 {
        // array or object type
        return Ok(Value::Null);
    }
    let type_char = signature.chars().next().unwrap_or('\0');
    match type_char {
        TYPE_LONG => Ok(Value::Long(0)),
        TYPE_INT | TYPE_SHORT | TYPE_CHAR | TYPE_BYTE => Ok(Value::Int(0)),
        TYPE_DOUBLE => Ok(Value::Double(0.0)),
        TYPE_FLOAT => Ok(Value::Float(0.0)),
        TYPE_BOOLEAN => Ok(Value::Boolean(false)),
        _ => Err(Error::format_error(format!(
            "unsupported field type [{}]",
            signature
        ))),
    }
}

fn constant_to_value(pool: &ConstantPool, index: u16) -> Result<Value> {
    match pool.get(index)? {
        Constant::Integer(v) => Ok(Value::Int(*v)),
        Constant::Float(v) => Ok(Value::Float(*v)),
        Constant::Long(v) => Ok(Value::Long(*v)),
        Constant::Double(v) => Ok(Value::Double(*v)),
        Constant::StringRef(_) | Constant::Utf8(_) | Constant::Unicode(_) => {
            Ok(Value::string(pool.as_string(index)?))
        }
        _ => Err(Error::CpWrongKind {
            index,
            expected: "a loadable constant",
        }),
    }
}
