//! Exception handler ranges declared by a method's Code attribute

use crate::classfile::constpool::ConstantPool;
use crate::classfile::reader::ClassReader;
use crate::error::Result;

/// One try..catch range of a method
///
/// The caught-type name is resolved eagerly at parse time; pool index 0
/// means "catch anything". The range test treats the end bound as
/// inclusive; callers emitting tables for it must not use the exclusive
/// end the class-file format documents.
#[derive(Debug, Clone)]
pub struct CatchBlockDescriptor {
    start_pc: u16,
    end_pc: u16,
    handler_pc: u16,
    catch_type: Option<String>,
}

impl CatchBlockDescriptor {
    pub fn new(start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: Option<String>) -> Self {
        Self {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        }
    }

    /// Parse one exception table entry: (start, end, handler, catch-type index)
    pub fn parse(reader: &mut ClassReader, pool: &ConstantPool) -> Result<Self> {
        let start_pc = reader.read_u16()?;
        let end_pc = reader.read_u16()?;
        let handler_pc = reader.read_u16()?;
        let catch_type_index = reader.read_u16()?;
        let catch_type = if catch_type_index == 0 {
            None
        } else {
            Some(pool.as_string(catch_type_index)?)
        };
        Ok(Self::new(start_pc, end_pc, handler_pc, catch_type))
    }

    pub fn start_pc(&self) -> u16 {
        self.start_pc
    }

    pub fn end_pc(&self) -> u16 {
        self.end_pc
    }

    pub fn handler_pc(&self) -> u16 {
        self.handler_pc
    }

    /// Jvm formatted name of the caught class, `None` for catch-all
    pub fn catch_type(&self) -> Option<&str> {
        self.catch_type.as_deref()
    }

    /// True when the descriptor covers the given program counter.
    /// Both bounds are inclusive.
    pub fn is_active_for_address(&self, pc: usize) -> bool {
        pc >= self.start_pc as usize && pc <= self.end_pc as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let block = CatchBlockDescriptor::new(4, 9, 12, None);
        assert!(!block.is_active_for_address(3));
        assert!(block.is_active_for_address(4));
        assert!(block.is_active_for_address(9));
        assert!(!block.is_active_for_address(10));
    }
}
