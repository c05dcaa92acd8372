use crate::runtime::value::Value;
use thiserror::Error;

/// Result type for tovm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the tovm virtual machine
///
/// Host-level and structural failures are reported through this enum.
/// Exceptions thrown by interpreted code travel separately inside the
/// interpreter and only surface here as `UncaughtException` when no
/// bytecode handler catches them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Class format error: {message}")]
    Format { message: String },

    #[error("Constant pool index {index} out of range (pool size {size})")]
    CpIndexOutOfRange { index: u16, size: usize },

    #[error("Constant pool entry {index} is not {expected}")]
    CpWrongKind { index: u16, expected: &'static str },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("No such field: {class}.{field}")]
    NoSuchField { class: String, field: String },

    #[error("No such method: {class}.{name}{signature}")]
    NoSuchMethod {
        class: String,
        name: String,
        signature: String,
    },

    #[error("Write to final field {class}.{field}")]
    FinalFieldWrite { class: String, field: String },

    #[error("Unresolvable class: {name}")]
    UnresolvableClass { name: String },

    #[error("Static initializer of {class} failed: {source}")]
    Clinit {
        class: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Uncaught exception of class {class} in {method}")]
    UncaughtException {
        class: String,
        method: String,
        value: Value,
    },

    #[error("Execution fault at pc {pc} in {class}.{name}{signature}: {message}")]
    Execution {
        class: String,
        name: String,
        signature: String,
        pc: usize,
        message: String,
    },

    #[error("Native method error in {class}.{name}{signature}: {message}")]
    Native {
        class: String,
        name: String,
        signature: String,
        message: String,
    },

    #[error("Provider error: {message}")]
    Provider { message: String },
}

impl Error {
    /// Create a class format error
    pub fn format_error(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }
}
