//! Bytecode verification

use crate::encoder::BytecodeReader;
use crate::module::{Function, Module, ValueType};
use crate::opcode::Opcode;

/// Maximum operand stack depth a function may reach
const MAX_STACK_DEPTH: usize = 256;

/// Bytecode verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Invalid opcode
    #[error("Invalid opcode {opcode:#x} at offset {offset} in '{function}'")]
    InvalidOpcode {
        /// Function being verified
        function: String,
        /// Offending byte
        opcode: u8,
        /// Byte offset in the function body
        offset: usize,
    },

    /// Operands cut short by the end of the function body
    #[error("Truncated operands for {opcode} at offset {offset} in '{function}'")]
    TruncatedOperands {
        /// Function being verified
        function: String,
        /// Instruction whose operands are missing
        opcode: Opcode,
        /// Byte offset in the function body
        offset: usize,
    },

    /// Stack underflow
    #[error("Stack underflow at offset {offset} in '{function}'")]
    StackUnderflow {
        /// Function being verified
        function: String,
        /// Byte offset in the function body
        offset: usize,
    },

    /// Stack overflow
    #[error("Stack overflow at offset {offset} in '{function}' (depth: {depth})")]
    StackOverflow {
        /// Function being verified
        function: String,
        /// Byte offset in the function body
        offset: usize,
        /// Depth reached
        depth: usize,
    },

    /// Invalid constant pool reference
    #[error("Invalid constant pool reference: index {index} at offset {offset} in '{function}'")]
    InvalidConstantRef {
        /// Function being verified
        function: String,
        /// Referenced index
        index: u32,
        /// Byte offset in the function body
        offset: usize,
    },

    /// Argument access in a function that takes no argument vector
    #[error("{opcode} at offset {offset} in '{function}' but the function takes no arguments")]
    NoArguments {
        /// Function being verified
        function: String,
        /// Instruction reading arguments
        opcode: Opcode,
        /// Byte offset in the function body
        offset: usize,
    },

    /// Execution falls off end
    #[error("Execution falls off end of '{function}' at offset {offset}")]
    FallOffEnd {
        /// Function being verified
        function: String,
        /// Offset of the last instruction
        offset: usize,
    },

    /// Two functions share a name
    #[error("Duplicate function '{0}'")]
    DuplicateFunction(String),

    /// Module validation error
    #[error("Module validation error: {0}")]
    ModuleValidation(String),
}

/// Verify a module's bytecode
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    module.validate().map_err(VerifyError::ModuleValidation)?;

    for (i, function) in module.functions.iter().enumerate() {
        if module.functions[..i].iter().any(|f| f.name == function.name) {
            return Err(VerifyError::DuplicateFunction(function.name.clone()));
        }
        verify_function(function, module)?;
    }

    Ok(())
}

/// Parsed instruction
#[derive(Debug, Clone)]
struct Instruction {
    offset: usize,
    opcode: Opcode,
    operands: Vec<u8>,
}

impl Instruction {
    fn operand_u32(&self, at: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.operands[at..at + 4]);
        u32::from_le_bytes(bytes)
    }

    /// Constant pool indices referenced by this instruction
    fn constant_refs(&self) -> Vec<u32> {
        match self.opcode {
            Opcode::ConstStr => vec![self.operand_u32(0)],
            Opcode::Invoke => vec![self.operand_u32(0), self.operand_u32(4)],
            _ => Vec::new(),
        }
    }
}

/// Verify a single function's bytecode
fn verify_function(function: &Function, module: &Module) -> Result<(), VerifyError> {
    // Empty functions are allowed
    if function.code.is_empty() {
        return Ok(());
    }

    let instructions = parse_instructions(function)?;
    let takes_args = function.signature.params.first() == Some(&ValueType::StrArray);

    let mut depth = 0usize;
    for instr in &instructions {
        if instr.opcode.reads_args() && !takes_args {
            return Err(VerifyError::NoArguments {
                function: function.name.clone(),
                opcode: instr.opcode,
                offset: instr.offset,
            });
        }

        for index in instr.constant_refs() {
            if module.constants.get_string(index).is_none() {
                return Err(VerifyError::InvalidConstantRef {
                    function: function.name.clone(),
                    index,
                    offset: instr.offset,
                });
            }
        }

        let (pops, pushes) = instr.opcode.stack_effect();
        if depth < pops {
            return Err(VerifyError::StackUnderflow {
                function: function.name.clone(),
                offset: instr.offset,
            });
        }
        depth = depth - pops + pushes;
        if depth > MAX_STACK_DEPTH {
            return Err(VerifyError::StackOverflow {
                function: function.name.clone(),
                offset: instr.offset,
                depth,
            });
        }
    }

    if let Some(last) = instructions.last() {
        if !last.opcode.is_terminator() {
            return Err(VerifyError::FallOffEnd {
                function: function.name.clone(),
                offset: last.offset,
            });
        }
    }

    Ok(())
}

/// Parse all instructions from bytecode
fn parse_instructions(function: &Function) -> Result<Vec<Instruction>, VerifyError> {
    let mut instructions = Vec::new();
    let mut reader = BytecodeReader::new(&function.code);

    while reader.has_more() {
        let offset = reader.position();
        let byte = reader
            .read_u8()
            .map_err(|_| VerifyError::FallOffEnd {
                function: function.name.clone(),
                offset,
            })?;

        let opcode = Opcode::from_u8(byte).ok_or_else(|| VerifyError::InvalidOpcode {
            function: function.name.clone(),
            opcode: byte,
            offset,
        })?;

        let operands = reader
            .read_bytes(opcode.operand_size())
            .map_err(|_| VerifyError::TruncatedOperands {
                function: function.name.clone(),
                opcode,
                offset,
            })?;

        instructions.push(Instruction {
            offset,
            opcode,
            operands,
        });
    }

    Ok(instructions)
}
