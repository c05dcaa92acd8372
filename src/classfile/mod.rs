//! Class-file parsing: constant pool, fields, methods, attributes and the
//! class model itself

pub mod catchblock;
pub mod class;
pub mod constpool;
pub mod defs;
pub mod descriptor;
pub mod field;
pub mod method;
pub mod reader;

pub use catchblock::CatchBlockDescriptor;
pub use class::{InnerClassRecord, JvmClass};
pub use constpool::{Constant, ConstantPool};
pub use field::JvmField;
pub use method::JvmMethod;
