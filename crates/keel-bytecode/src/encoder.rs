//! Bytecode encoding and decoding utilities
//!
//! This module provides tools for encoding and decoding Keel bytecode instructions.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0} at offset {1}")]
    InvalidOpcode(u8, usize),

    /// Invalid value type tag
    #[error("Invalid value type tag {0} at offset {1}")]
    InvalidValueType(u8, usize),
}

/// Bytecode writer for encoding instructions
///
/// Provides methods for emitting opcodes and their operands into a binary buffer.
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Overwrite a previously emitted u32 at `offset`
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    // ===== Opcode Emission =====

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    /// Emit NOP instruction
    pub fn emit_nop(&mut self) {
        self.emit_opcode(Opcode::Nop);
    }

    /// Emit POP instruction
    pub fn emit_pop(&mut self) {
        self.emit_opcode(Opcode::Pop);
    }

    /// Emit DUP instruction
    pub fn emit_dup(&mut self) {
        self.emit_opcode(Opcode::Dup);
    }

    /// Emit CONST_INT instruction with value
    pub fn emit_const_int(&mut self, value: i64) {
        self.emit_opcode(Opcode::ConstInt);
        self.emit_i64(value);
    }

    /// Emit CONST_STR instruction with constant pool index
    pub fn emit_const_str(&mut self, index: u32) {
        self.emit_opcode(Opcode::ConstStr);
        self.emit_u32(index);
    }

    /// Emit LOAD_ARG instruction
    pub fn emit_load_arg(&mut self, index: u16) {
        self.emit_opcode(Opcode::LoadArg);
        self.emit_u16(index);
    }

    /// Emit LOAD_ARGS instruction
    pub fn emit_load_args(&mut self) {
        self.emit_opcode(Opcode::LoadArgs);
    }

    /// Emit ARG_COUNT instruction
    pub fn emit_arg_count(&mut self) {
        self.emit_opcode(Opcode::ArgCount);
    }

    /// Emit CONCAT instruction
    pub fn emit_concat(&mut self) {
        self.emit_opcode(Opcode::Concat);
    }

    /// Emit PRINT instruction
    pub fn emit_print(&mut self) {
        self.emit_opcode(Opcode::Print);
    }

    /// Emit INVOKE instruction
    pub fn emit_invoke(&mut self, module_index: u32, function_index: u32) {
        self.emit_opcode(Opcode::Invoke);
        self.emit_u32(module_index);
        self.emit_u32(function_index);
    }

    /// Emit RETURN instruction
    pub fn emit_return(&mut self) {
        self.emit_opcode(Opcode::Return);
    }

    /// Emit THROW instruction
    pub fn emit_throw(&mut self) {
        self.emit_opcode(Opcode::Throw);
    }
}

/// Bytecode reader for decoding instructions and module sections
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new bytecode reader
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Check if there are more bytes to read
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.buffer.len())
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let bytes = &self.buffer[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Read a fixed-size byte array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.take_array()
    }

    /// Read a length-prefixed string (u32 length + UTF-8 bytes)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.position;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        Ok(self.take(count)?.to_vec())
    }

    /// Read an opcode
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }
}
