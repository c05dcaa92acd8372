//! Parsed method of a class, including its Code attribute

use crate::classfile::catchblock::CatchBlockDescriptor;
use crate::classfile::constpool::ConstantPool;
use crate::classfile::defs::{ACC_ABSTRACT, ACC_NATIVE, ACC_STATIC};
use crate::classfile::reader::ClassReader;
use crate::error::Result;

const ATTR_CODE: &str = "Code";

/// A declared method with its instruction stream, catch-block table and
/// frame sizing metadata. Native and abstract methods carry no code; their
/// invocation is delegated to the resolution provider.
#[derive(Debug)]
pub struct JvmMethod {
    access_flags: u16,
    name: String,
    signature: String,
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    catch_blocks: Vec<CatchBlockDescriptor>,
}

impl JvmMethod {
    /// Parse one method_info structure. Only the `Code` attribute is
    /// recognized; everything else is skipped by length.
    pub fn parse(reader: &mut ClassReader, pool: &ConstantPool) -> Result<Self> {
        let access_flags = reader.read_u16()?;
        let name = pool.as_string(reader.read_u16()?)?;
        let signature = pool.as_string(reader.read_u16()?)?;

        let mut max_stack = 0;
        let mut max_locals = 0;
        let mut code = Vec::new();
        let mut catch_blocks = Vec::new();

        let mut attribute_count = reader.read_u16()?;
        while attribute_count > 0 {
            attribute_count -= 1;
            let attr_name_index = reader.read_u16()?;
            let data_size = reader.read_u32()? as usize;
            let attr_name = pool.as_string(attr_name_index)?;
            if attr_name == ATTR_CODE {
                max_stack = reader.read_u16()?;
                max_locals = reader.read_u16()?;
                let code_length = reader.read_u32()? as usize;
                code = reader.read_bytes(code_length)?;
                let table_length = reader.read_u16()?;
                catch_blocks.reserve(table_length as usize);
                for _ in 0..table_length {
                    catch_blocks.push(CatchBlockDescriptor::parse(reader, pool)?);
                }
                skip_attributes(reader)?;
            } else {
                reader.skip(data_size)?;
            }
        }

        Ok(Self {
            access_flags,
            name,
            signature,
            max_stack,
            max_locals,
            code,
            catch_blocks,
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

    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    /// True when the method carries an instruction stream of its own
    pub fn has_code(&self) -> bool {
        !self.code.is_empty()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    /// Catch-block descriptors in declaration order
    pub fn catch_blocks(&self) -> &[CatchBlockDescriptor] {
        &self.catch_blocks
    }

    /// Lookup key disambiguating overloads by signature
    pub fn uid(&self) -> String {
        make_method_uid(&self.name, &self.signature)
    }
}

/// Unique method key: name and signature joined by a dot
pub fn make_method_uid(name: &str, signature: &str) -> String {
    format!("{}.{}", name, signature)
}

/// Skip a whole attribute table (used for the attributes nested inside Code)
pub fn skip_attributes(reader: &mut ClassReader) -> Result<()> {
    let mut count = reader.read_u16()?;
    while count > 0 {
        count -= 1;
        reader.skip(2)?;
        let data_size = reader.read_u32()? as usize;
        reader.skip(data_size)?;
    }
    Ok(())
}
