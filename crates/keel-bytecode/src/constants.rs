//! String constant pool

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Module-level pool of string constants, addressed by `u32` index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    /// String constants in insertion order
    pub strings: Vec<String>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string and return its index
    pub fn add_string(&mut self, value: String) -> u32 {
        self.strings.push(value);
        (self.strings.len() - 1) as u32
    }

    /// Look up a string by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Number of entries in the pool
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut strings = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            strings.push(reader.read_string()?);
        }
        Ok(Self { strings })
    }
}
