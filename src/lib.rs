//! tovm — a minimal embeddable Java virtual machine
//!
//! tovm parses compiled `.class` files into an in-memory class model and
//! interprets their bytecode without any host class library. It targets
//! embedding: running small, sandboxed pieces of compiled logic inside a
//! larger host application, with all cross-class and native resolution
//! delegated to a caller-supplied [`runtime::Provider`].
//!
//! ## Architecture
//!
//! - **classfile**: byte-stream parsing into the class model (constant
//!   pool, fields, methods, catch-block tables, inner-class records)
//! - **runtime**: values, objects, the provider seam and the bytecode
//!   interpreter (operand stack, locals, invocation, exception dispatch)
//!
//! ## Loading Flow
//!
//! ```text
//! class bytes → JvmClass::parse → constant pool → fields/methods
//!                      ↓                               ↓
//!              loading registry (cycle breaker)   <clinit> execution
//!                      ↓
//!              Provider::register_external_class
//! ```

pub mod classfile;
pub mod error;
pub mod runtime;

pub use classfile::{CatchBlockDescriptor, ConstantPool, JvmClass, JvmField, JvmMethod};
pub use error::{Error, Result};
pub use runtime::{invoke, ClassHandle, JvmObject, LoadingNames, Provider, Value};
