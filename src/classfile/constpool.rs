//! Constant pool for parsed Java class files
//!
//! The pool is a read-only, 1-indexed table of typed entries; all symbolic
//! lookups during parsing and interpretation pass through it. Member
//! references keep the raw packed pair of unsigned 16-bit indices exactly as
//! encoded in the class file: the high half addresses the declaring class
//! (or the name, inside a name-and-type entry), the low half the
//! name-and-type pair (or the descriptor).

use crate::classfile::reader::ClassReader;
use crate::error::{Error, Result};

mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_UNICODE: u8 = 2;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASSREF: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
    pub const CONSTANT_METHODHANDLE: u8 = 15;
    pub const CONSTANT_METHODTYPE: u8 = 16;
    pub const CONSTANT_INVOKEDYNAMIC: u8 = 18;
}

/// One constant pool entry
///
/// `FieldRef`, `MethodRef`, `InterfaceMethodRef`, `NameAndType` and
/// `InvokeDynamic` carry their two 16-bit indices packed into a `u32`
/// (high half first), preserving the on-disk bit positions.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    /// Legacy UNICODE string entry (tag 2), long obsolete but still decoded
    Unicode(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    ClassRef(u16),
    StringRef(u16),
    FieldRef(u32),
    MethodRef(u32),
    InterfaceMethodRef(u32),
    NameAndType(u32),
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    InvokeDynamic(u32),
    /// Slot 0 and the upper half of Long/Double entries
    Reserved,
}

impl Constant {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Utf8(_) => "Utf8",
            Constant::Unicode(_) => "Unicode",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::ClassRef(_) => "ClassRef",
            Constant::StringRef(_) => "StringRef",
            Constant::FieldRef(_) => "FieldRef",
            Constant::MethodRef(_) => "MethodRef",
            Constant::InterfaceMethodRef(_) => "InterfaceMethodRef",
            Constant::NameAndType(_) => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType(_) => "MethodType",
            Constant::InvokeDynamic(_) => "InvokeDynamic",
            Constant::Reserved => "Reserved",
        }
    }
}

/// High 16 bits of a packed index pair
fn high_u16(packed: u32) -> u16 {
    (packed >> 16) as u16
}

/// Low 16 bits of a packed index pair
fn low_u16(packed: u32) -> u16 {
    (packed & 0xFFFF) as u16
}

fn pack(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}

#[derive(Debug)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Parse the constant pool section of a class file, including the
    /// leading entry count. Long and Double entries occupy two slots;
    /// the second slot stays reserved.
    pub fn parse(reader: &mut ClassReader) -> Result<Self> {
        use constant_tags::*;

        let count = reader.read_u16()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Reserved);

        while entries.len() < count {
            let tag = reader.read_u8()?;
            let entry = match tag {
                CONSTANT_UTF8 => {
                    let length = reader.read_u16()? as usize;
                    Constant::Utf8(reader.read_utf8(length)?)
                }
                CONSTANT_UNICODE => {
                    let length = reader.read_u16()? as usize;
                    let mut units = Vec::with_capacity(length);
                    for _ in 0..length {
                        units.push(reader.read_u16()?);
                    }
                    Constant::Unicode(String::from_utf16_lossy(&units))
                }
                CONSTANT_INTEGER => Constant::Integer(reader.read_i32()?),
                CONSTANT_FLOAT => Constant::Float(f32::from_bits(reader.read_u32()?)),
                CONSTANT_LONG => Constant::Long(reader.read_u64()? as i64),
                CONSTANT_DOUBLE => Constant::Double(f64::from_bits(reader.read_u64()?)),
                CONSTANT_CLASSREF => Constant::ClassRef(reader.read_u16()?),
                CONSTANT_STRING => Constant::StringRef(reader.read_u16()?),
                CONSTANT_FIELDREF => {
                    Constant::FieldRef(pack(reader.read_u16()?, reader.read_u16()?))
                }
                CONSTANT_METHODREF => {
                    Constant::MethodRef(pack(reader.read_u16()?, reader.read_u16()?))
                }
                CONSTANT_INTERFACEMETHODREF => {
                    Constant::InterfaceMethodRef(pack(reader.read_u16()?, reader.read_u16()?))
                }
                CONSTANT_NAMEANDTYPE => {
                    Constant::NameAndType(pack(reader.read_u16()?, reader.read_u16()?))
                }
                CONSTANT_METHODHANDLE => Constant::MethodHandle {
                    kind: reader.read_u8()?,
                    reference: reader.read_u16()?,
                },
                CONSTANT_METHODTYPE => Constant::MethodType(reader.read_u16()?),
                CONSTANT_INVOKEDYNAMIC => {
                    Constant::InvokeDynamic(pack(reader.read_u16()?, reader.read_u16()?))
                }
                unknown => {
                    return Err(Error::format_error(format!(
                        "unknown constant pool tag {} at offset {}",
                        unknown,
                        reader.position()
                    )))
                }
            };
            let two_slots = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries.push(entry);
            if two_slots {
                entries.push(Constant::Reserved);
            }
        }

        Ok(Self { entries })
    }

    /// Number of slots, including slot 0
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Get the entry at a 1-based index. Index 0, indices past the end and
    /// reserved slots are structural errors: a pool built from a well-formed
    /// class file never exposes them.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        let entry = self
            .entries
            .get(index as usize)
            .filter(|_| index != 0)
            .ok_or(Error::CpIndexOutOfRange {
                index,
                size: self.entries.len(),
            })?;
        if matches!(entry, Constant::Reserved) {
            return Err(Error::CpIndexOutOfRange {
                index,
                size: self.entries.len(),
            });
        }
        Ok(entry)
    }

    /// The entry read as a string: UTF8 and Unicode entries directly,
    /// class and string references through one indirection.
    pub fn as_string(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Utf8(s) | Constant::Unicode(s) => Ok(s.clone()),
            Constant::ClassRef(target) | Constant::StringRef(target) => {
                let target = *target;
                self.as_string(target)
            }
            _ => Err(Error::CpWrongKind {
                index,
                expected: "a string entry",
            }),
        }
    }

    pub fn int_at(&self, index: u16) -> Result<i32> {
        match self.get(index)? {
            Constant::Integer(v) => Ok(*v),
            _ => Err(Error::CpWrongKind {
                index,
                expected: "Integer",
            }),
        }
    }

    pub fn float_at(&self, index: u16) -> Result<f32> {
        match self.get(index)? {
            Constant::Float(v) => Ok(*v),
            _ => Err(Error::CpWrongKind {
                index,
                expected: "Float",
            }),
        }
    }

    pub fn long_at(&self, index: u16) -> Result<i64> {
        match self.get(index)? {
            Constant::Long(v) => Ok(*v),
            _ => Err(Error::CpWrongKind {
                index,
                expected: "Long",
            }),
        }
    }

    pub fn double_at(&self, index: u16) -> Result<f64> {
        match self.get(index)? {
            Constant::Double(v) => Ok(*v),
            _ => Err(Error::CpWrongKind {
                index,
                expected: "Double",
            }),
        }
    }

    /// Class name behind a class reference or a field/method/interface-method
    /// reference, resolved one indirection through the pool.
    pub fn class_name_at(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::ClassRef(target) => {
                let target = *target;
                self.as_string(target)
            }
            Constant::FieldRef(packed)
            | Constant::MethodRef(packed)
            | Constant::InterfaceMethodRef(packed) => {
                let class_index = high_u16(*packed);
                self.as_string(class_index)
            }
            _ => Err(Error::CpWrongKind {
                index,
                expected: "a class or member reference",
            }),
        }
    }

    /// Member or name-and-type name, resolved through up to two indirections
    pub fn name_at(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::NameAndType(packed) => {
                let name_index = high_u16(*packed);
                self.as_string(name_index)
            }
            Constant::FieldRef(packed)
            | Constant::MethodRef(packed)
            | Constant::InterfaceMethodRef(packed) => {
                let nat_index = low_u16(*packed);
                let nat_packed = self.name_and_type_at(nat_index)?;
                self.as_string(high_u16(nat_packed))
            }
            _ => Err(Error::CpWrongKind {
                index,
                expected: "a member or name-and-type reference",
            }),
        }
    }

    /// Member or name-and-type signature, resolved through up to two
    /// indirections
    pub fn signature_at(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::NameAndType(packed) => {
                let descriptor_index = low_u16(*packed);
                self.as_string(descriptor_index)
            }
            Constant::FieldRef(packed)
            | Constant::MethodRef(packed)
            | Constant::InterfaceMethodRef(packed) => {
                let nat_index = low_u16(*packed);
                let nat_packed = self.name_and_type_at(nat_index)?;
                self.as_string(low_u16(nat_packed))
            }
            _ => Err(Error::CpWrongKind {
                index,
                expected: "a member or name-and-type reference",
            }),
        }
    }

    fn name_and_type_at(&self, index: u16) -> Result<u32> {
        match self.get(index)? {
            Constant::NameAndType(packed) => Ok(*packed),
            _ => Err(Error::CpWrongKind {
                index,
                expected: "NameAndType",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_from(entries: Vec<Constant>) -> ConstantPool {
        let mut all = vec![Constant::Reserved];
        all.extend(entries);
        ConstantPool { entries: all }
    }

    #[test]
    fn index_zero_is_rejected() {
        let pool = pool_from(vec![Constant::Integer(1)]);
        assert!(pool.get(0).is_err());
        assert!(pool.get(2).is_err());
        assert!(pool.get(1).is_ok());
    }

    #[test]
    fn two_level_member_resolution() {
        // 1: Utf8 "foo", 2: Utf8 "()I", 3: Utf8 "com/demo/Target",
        // 4: ClassRef -> 3, 5: NameAndType(1, 2), 6: MethodRef(4, 5)
        let pool = pool_from(vec![
            Constant::Utf8("foo".to_string()),
            Constant::Utf8("()I".to_string()),
            Constant::Utf8("com/demo/Target".to_string()),
            Constant::ClassRef(3),
            Constant::NameAndType(pack(1, 2)),
            Constant::MethodRef(pack(4, 5)),
        ]);
        assert_eq!(pool.class_name_at(6).expect("class"), "com/demo/Target");
        assert_eq!(pool.name_at(6).expect("name"), "foo");
        assert_eq!(pool.signature_at(6).expect("signature"), "()I");
        // direct name-and-type access uses the halves without the extra hop
        assert_eq!(pool.name_at(5).expect("name"), "foo");
        assert_eq!(pool.signature_at(5).expect("signature"), "()I");
    }

    #[test]
    fn string_resolution_hops_once() {
        let pool = pool_from(vec![
            Constant::Utf8("hello".to_string()),
            Constant::StringRef(1),
            Constant::ClassRef(1),
        ]);
        assert_eq!(pool.as_string(1).expect("utf8"), "hello");
        assert_eq!(pool.as_string(2).expect("string ref"), "hello");
        assert_eq!(pool.as_string(3).expect("class ref"), "hello");
        assert!(pool.int_at(1).is_err());
    }
}
