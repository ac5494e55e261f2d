//! Bytecode module format

use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use std::fmt;
use thiserror::Error;

/// Magic number for Keel bytecode files: "KEEL"
pub const MAGIC: [u8; 4] = *b"KEEL";

/// Current bytecode version
pub const VERSION: u32 = 1;

/// File suffix of a compiled unit
pub const UNIT_SUFFIX: &str = ".kbc";

/// Name of the conventional entry function
pub const ENTRY_FUNCTION: &str = "main";

/// Header size: magic + version + flags + checksum
const HEADER_LEN: usize = 16;

/// Module encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected KEEL, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },
}

/// Function flags
pub mod function_flags {
    /// Function is callable from outside its module
    pub const PUBLIC: u32 = 1 << 0;
}

/// Static type of a parameter or return value
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No value
    Void = 0,
    /// UTF-8 string
    Str = 1,
    /// 64-bit signed integer
    Int = 2,
    /// Sequence of strings
    StrArray = 3,
}

impl ValueType {
    /// Convert a tag byte to a value type
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Void),
            1 => Some(Self::Str),
            2 => Some(Self::Int),
            3 => Some(Self::StrArray),
            _ => None,
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        Self::from_u8(tag).ok_or(DecodeError::InvalidValueType(tag, offset))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Void => "Void",
            Self::Str => "Str",
            Self::Int => "Int",
            Self::StrArray => "StrArray",
        };
        f.write_str(name)
    }
}

/// Parameter and return types of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Parameter types in order
    pub params: Vec<ValueType>,
    /// Return type
    pub returns: ValueType,
}

impl Signature {
    /// The entry signature: `(StrArray) -> Void`
    pub fn entry() -> Self {
        Self {
            params: vec![ValueType::StrArray],
            returns: ValueType::Void,
        }
    }

    /// A `() -> Void` signature
    pub fn nullary() -> Self {
        Self {
            params: Vec::new(),
            returns: ValueType::Void,
        }
    }

    /// Whether this is the entry signature
    pub fn is_entry(&self) -> bool {
        self.params == [ValueType::StrArray] && self.returns == ValueType::Void
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> {}", self.returns)
    }
}

/// Function definition
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Function flags (see [`function_flags`])
    pub flags: u32,
    /// Parameter and return types
    pub signature: Signature,
    /// Bytecode instructions
    pub code: Vec<u8>,
}

impl Function {
    /// Whether the function carries the `PUBLIC` flag
    pub fn is_public(&self) -> bool {
        self.flags & function_flags::PUBLIC != 0
    }

    /// Encode function to binary
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_u32(self.flags);

        writer.emit_u8(self.signature.params.len() as u8);
        for param in &self.signature.params {
            writer.emit_u8(*param as u8);
        }
        writer.emit_u8(self.signature.returns as u8);

        writer.emit_u32(self.code.len() as u32);
        writer.buffer.extend_from_slice(&self.code);
    }

    /// Decode function from binary
    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let flags = reader.read_u32()?;

        let param_count = reader.read_u8()? as usize;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            params.push(ValueType::decode(reader)?);
        }
        let returns = ValueType::decode(reader)?;

        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;

        Ok(Self {
            name,
            flags,
            signature: Signature { params, returns },
            code,
        })
    }
}

/// Module metadata
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Fully-qualified module name, e.g. `com.acme.Tool`
    pub name: String,
    /// Source file path
    pub source_file: Option<String>,
}

impl Metadata {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        match &self.source_file {
            Some(path) => {
                writer.emit_u8(1);
                writer.emit_string(path);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let source_file = if reader.read_u8()? != 0 {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self { name, source_file })
    }
}

/// A compiled Keel unit
#[derive(Debug, Clone)]
pub struct Module {
    /// Magic number (must be "KEEL")
    pub magic: [u8; 4],
    /// Bytecode version
    pub version: u32,
    /// Module flags
    pub flags: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Function definitions
    pub functions: Vec<Function>,
    /// Module metadata
    pub metadata: Metadata,
}

impl Module {
    /// Create a new empty module
    pub fn new(name: String) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            constants: ConstantPool::new(),
            functions: Vec::new(),
            metadata: Metadata {
                name,
                source_file: None,
            },
        }
    }

    /// Declared fully-qualified name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Find a function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Validate module structure
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != MAGIC {
            return Err("Invalid magic number".to_string());
        }
        if self.version != VERSION {
            return Err(format!("Unsupported version: {}", self.version));
        }
        if self.metadata.name.is_empty() {
            return Err("Module has no name".to_string());
        }
        Ok(())
    }

    /// Encode the module to binary format (.kbc)
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
    /// - Constant pool
    /// - Function table
    /// - Metadata
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&self.magic);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        self.constants.encode(&mut writer);

        writer.emit_u32(self.functions.len() as u32);
        for func in &self.functions {
            func.encode(&mut writer);
        }

        self.metadata.encode(&mut writer);

        // CRC32 of everything after the header
        let checksum = crc32fast::hash(&writer.buffer[HEADER_LEN..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode a module from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let magic: [u8; 4] = reader.read_array()?;
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let calculated_checksum = crc32fast::hash(&data[HEADER_LEN..]);
        if stored_checksum != calculated_checksum {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let constants = ConstantPool::decode(&mut reader)?;

        let func_count = reader.read_u32()? as usize;
        let mut functions = Vec::with_capacity(func_count.min(1024));
        for _ in 0..func_count {
            functions.push(Function::decode(&mut reader)?);
        }

        let metadata = Metadata::decode(&mut reader)?;

        Ok(Self {
            magic,
            version,
            flags,
            constants,
            functions,
            metadata,
        })
    }
}
