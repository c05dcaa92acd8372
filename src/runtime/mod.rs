//! Execution engine: values, objects, the provider seam and the bytecode
//! interpreter

pub mod interpreter;
pub mod object;
pub mod opcodes;
pub mod provider;
pub mod value;

pub use interpreter::invoke;
pub use object::JvmObject;
pub use provider::{ClassHandle, LoadingNames, Provider};
pub use value::{JvmArray, Value, VmFault};
