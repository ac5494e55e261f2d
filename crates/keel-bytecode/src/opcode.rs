//! Bytecode opcodes for Keel units
//!
//! The instruction set is deliberately small: a unit's entry function reads
//! its arguments, builds strings, writes to the console, raises failures and
//! hands control to other modules.

/// Bytecode opcode enumeration
///
/// All opcodes are single-byte instructions. Some opcodes take additional operands
/// that follow the opcode byte in the bytecode stream.
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation & constants
/// - 0x10-0x1F: Argument access
/// - 0x80-0x8F: String & console operations
/// - 0xA0-0xAF: Calls and returns
/// - 0xE0-0xEF: Error handling
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Push 64-bit integer constant (operand: i64)
    ConstInt = 0x07,
    /// Push string constant from pool (operand: u32 index)
    ConstStr = 0x09,

    // ===== Argument Access (0x10-0x1F) =====
    /// Push one argument as a string (operand: u16 index)
    LoadArg = 0x10,
    /// Push the whole argument vector
    LoadArgs = 0x11,
    /// Push the number of arguments as an integer
    ArgCount = 0x12,

    // ===== String & Console (0x80-0x8F) =====
    /// Concatenate: pop b, pop a, push a ++ b
    Concat = 0x80,
    /// Pop a value and write it to the console followed by a newline
    Print = 0x81,

    // ===== Calls (0xA0-0xAF) =====
    /// Invoke another module's function with the argument vector on top of
    /// the stack (operands: u32 module-name index, u32 function-name index)
    Invoke = 0xA0,
    /// Return from the current function
    Return = 0xA1,

    // ===== Error Handling (0xE0-0xEF) =====
    /// Raise a failure: pop message, pop kind
    Throw = 0xE0,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Dup),
            0x07 => Some(Self::ConstInt),
            0x09 => Some(Self::ConstStr),
            0x10 => Some(Self::LoadArg),
            0x11 => Some(Self::LoadArgs),
            0x12 => Some(Self::ArgCount),
            0x80 => Some(Self::Concat),
            0x81 => Some(Self::Print),
            0xA0 => Some(Self::Invoke),
            0xA1 => Some(Self::Return),
            0xE0 => Some(Self::Throw),
            _ => None,
        }
    }

    /// Convert opcode to its byte representation
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the human-readable name of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::ConstInt => "CONST_INT",
            Self::ConstStr => "CONST_STR",
            Self::LoadArg => "LOAD_ARG",
            Self::LoadArgs => "LOAD_ARGS",
            Self::ArgCount => "ARG_COUNT",
            Self::Concat => "CONCAT",
            Self::Print => "PRINT",
            Self::Invoke => "INVOKE",
            Self::Return => "RETURN",
            Self::Throw => "THROW",
        }
    }

    /// Size in bytes of the operands following the opcode byte
    pub fn operand_size(self) -> usize {
        match self {
            Self::Nop
            | Self::Pop
            | Self::Dup
            | Self::LoadArgs
            | Self::ArgCount
            | Self::Concat
            | Self::Print
            | Self::Return
            | Self::Throw => 0,
            Self::LoadArg => 2,
            Self::ConstStr => 4,
            Self::ConstInt | Self::Invoke => 8,
        }
    }

    /// Stack effect of the opcode as (pops, pushes)
    pub fn stack_effect(self) -> (usize, usize) {
        match self {
            Self::Nop | Self::Return => (0, 0),
            Self::Pop | Self::Print | Self::Invoke => (1, 0),
            Self::Dup => (1, 2),
            Self::ConstInt | Self::ConstStr => (0, 1),
            Self::LoadArg | Self::LoadArgs | Self::ArgCount => (0, 1),
            Self::Concat => (2, 1),
            Self::Throw => (2, 0),
        }
    }

    /// Check if this opcode reads the argument vector
    pub fn reads_args(self) -> bool {
        matches!(self, Self::LoadArg | Self::LoadArgs | Self::ArgCount)
    }

    /// Check if this opcode ends a function
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Return | Self::Throw)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
