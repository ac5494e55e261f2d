//! Keel Bytecode Definitions
//!
//! This crate provides the instruction set, the compiled-unit (`.kbc`) file
//! format, a verifier and a builder for Keel modules.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod constants;
pub mod encoder;
pub mod module;
pub mod opcode;
pub mod verify;

pub use builder::ModuleBuilder;
pub use constants::ConstantPool;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use module::{
    function_flags, Function, Metadata, Module, ModuleError, Signature, ValueType, ENTRY_FUNCTION,
    UNIT_SUFFIX,
};
pub use opcode::Opcode;
pub use verify::{verify_module, VerifyError};
