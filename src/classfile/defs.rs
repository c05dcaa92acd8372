//! Generic classfile-specific definitions

/// Header of Java class file (magic number)
pub const MAGIC: u32 = 0xCAFEBABE;

/// Name of a constructor
pub const CONSTRUCTOR_METHOD_NAME: &str = "<init>";

/// Name of a static initializer
pub const STATIC_INITIALIZER_METHOD_NAME: &str = "<clinit>";

/// Signature of a no-argument void method
pub const NO_ARG_VOID_SIGNATURE: &str = "()V";

// Class access flags
pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

// Field/method access flags
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_VOLATILE: u16 = 0x0040;
pub const ACC_TRANSIENT: u16 = 0x0080;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_STRICT: u16 = 0x0800;

// Primitive type descriptor characters
pub const TYPE_BYTE: char = 'B';
pub const TYPE_CHAR: char = 'C';
pub const TYPE_DOUBLE: char = 'D';
pub const TYPE_FLOAT: char = 'F';
pub const TYPE_INT: char = 'I';
pub const TYPE_LONG: char = 'J';
pub const TYPE_SHORT: char = 'S';
pub const TYPE_BOOLEAN: char = 'Z';
pub const TYPE_VOID: char = 'V';

/// Normalize a class name from its jvm formatted form,
/// for instance "java/lang/Object" becomes "java.lang.Object"
pub fn normalize_class_name(jvm_formatted_name: &str) -> String {
    jvm_formatted_name.replace('/', ".")
}

/// Canonical form of a jvm formatted class name, with the inner class
/// separator also dotted: "java/lang/Object$1" becomes "java.lang.Object.1"
pub fn canonical_class_name(jvm_formatted_name: &str) -> String {
    normalize_class_name(jvm_formatted_name).replace('$', ".")
}
