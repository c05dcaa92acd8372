//! Runtime values flowing through operand stacks, locals and fields

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::runtime::object::JvmObject;

/// Jvm formatted class names of the runtime conditions the interpreter can
/// raise on its own
pub mod fault_classes {
    pub const ARITHMETIC: &str = "java/lang/ArithmeticException";
    pub const NULL_POINTER: &str = "java/lang/NullPointerException";
    pub const CLASS_CAST: &str = "java/lang/ClassCastException";
    pub const ARRAY_INDEX: &str = "java/lang/ArrayIndexOutOfBoundsException";
    pub const NEGATIVE_ARRAY_SIZE: &str = "java/lang/NegativeArraySizeException";
    pub const ARRAY_STORE: &str = "java/lang/ArrayStoreException";
}

/// A runtime condition raised by the interpreter (arithmetic fault, null
/// dereference, bad cast, bounds violation). Faults are thrown values like
/// any other and are dispatched through catch-block tables; their class
/// hierarchy is the small fixed chain below.
#[derive(Debug)]
pub struct VmFault {
    pub class_name: &'static str,
    pub message: String,
}

impl VmFault {
    pub fn new(class_name: &'static str, message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            class_name,
            message: message.into(),
        })
    }
}

/// Superclass of a fault class within the fixed hierarchy
pub fn fault_superclass(class_name: &str) -> Option<&'static str> {
    match class_name {
        fault_classes::ARRAY_INDEX => Some("java/lang/IndexOutOfBoundsException"),
        fault_classes::ARITHMETIC
        | fault_classes::NULL_POINTER
        | fault_classes::CLASS_CAST
        | fault_classes::NEGATIVE_ARRAY_SIZE
        | fault_classes::ARRAY_STORE
        | "java/lang/IndexOutOfBoundsException" => Some("java/lang/RuntimeException"),
        "java/lang/RuntimeException" => Some("java/lang/Exception"),
        "java/lang/Exception" => Some("java/lang/Throwable"),
        "java/lang/Throwable" => Some("java/lang/Object"),
        _ => None,
    }
}

/// True when a fault of class `fault_class` may be caught by a handler
/// declared for `target`
pub fn fault_is_instance_of(fault_class: &str, target: &str) -> bool {
    let mut current = fault_class;
    loop {
        if current == target {
            return true;
        }
        match fault_superclass(current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// A reference array. Primitive arrays store their elements as the
/// corresponding `Value` variant; `component` keeps the element type
/// descriptor for instanceof checks.
#[derive(Debug)]
pub struct JvmArray {
    component: String,
    elements: Mutex<Vec<Value>>,
}

impl JvmArray {
    pub fn new(component: impl Into<String>, length: usize, fill: Value) -> Arc<Self> {
        Arc::new(Self {
            component: component.into(),
            elements: Mutex::new(vec![fill; length]),
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn len(&self) -> usize {
        self.elements.lock().expect("array poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.elements.lock().expect("array poisoned").get(index).cloned()
    }

    /// Store a value; false when the index is out of bounds
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut elements = self.elements.lock().expect("array poisoned");
        match elements.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// A value the virtual machine can hold in a local slot, an operand stack
/// slot or a field. Longs and doubles occupy one `Value` but two frame
/// slots; the interpreter accounts for the category where it matters.
#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Arc<String>),
    Object(Arc<JvmObject>),
    Array(Arc<JvmArray>),
    Fault(Arc<VmFault>),
    /// Opaque host value owned by the resolution provider
    Native(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Arc::new(s.into()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Fault(_) => "fault",
            Value::Native(_) => "native",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Number of operand-stack slots the value occupies
    pub fn category(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    /// Read as a 32-bit integer; booleans coerce to 0/1
    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Boolean(v) => Ok(*v as i32),
            other => Err(Error::TypeMismatch {
                expected: "int",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_long(&self) -> Result<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(Error::TypeMismatch {
                expected: "long",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(Error::TypeMismatch {
                expected: "float",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(Error::TypeMismatch {
                expected: "double",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_object(&self) -> Result<&Arc<JvmObject>> {
        match self {
            Value::Object(o) => Ok(o),
            other => Err(Error::TypeMismatch {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }

    /// Reference identity, the `if_acmpeq` notion of equality
    pub fn reference_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Fault(a), Value::Fault(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}i", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}d", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(o) => write!(f, "object[{}]", o.class().class_name()),
            Value::Array(a) => write!(f, "array[{}; {}]", a.component(), a.len()),
            Value::Fault(e) => write!(f, "fault[{}: {}]", e.class_name, e.message),
            Value::Native(_) => write!(f, "native[..]"),
        }
    }
}

/// Value equality used by tests and field comparisons: numeric variants by
/// value, strings by content, other references by identity
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => self.reference_eq(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_hierarchy_reaches_throwable() {
        assert!(fault_is_instance_of(
            fault_classes::ARITHMETIC,
            fault_classes::ARITHMETIC
        ));
        assert!(fault_is_instance_of(
            fault_classes::ARITHMETIC,
            "java/lang/RuntimeException"
        ));
        assert!(fault_is_instance_of(
            fault_classes::ARRAY_INDEX,
            "java/lang/IndexOutOfBoundsException"
        ));
        assert!(fault_is_instance_of(
            fault_classes::NULL_POINTER,
            "java/lang/Throwable"
        ));
        assert!(!fault_is_instance_of(
            fault_classes::NULL_POINTER,
            fault_classes::ARITHMETIC
        ));
    }

    #[test]
    fn reference_equality_is_identity() {
        let a = Value::string("x");
        let b = Value::string("x");
        assert!(!a.reference_eq(&b));
        assert!(a.reference_eq(&a.clone()));
        assert_eq!(a, b);
    }
}
