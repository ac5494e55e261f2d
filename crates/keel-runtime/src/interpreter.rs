//! Stack interpreter for bytecode entry functions.

use keel_bytecode::{BytecodeReader, DecodeError, Function, Module, Opcode};

use crate::console::Console;
use crate::error::Failure;
use crate::invoker;
use crate::loader::LoadedModule;
use crate::name::SymbolicName;

/// Maximum nesting of `INVOKE` calls.
pub const MAX_CALL_DEPTH: usize = 64;

/// Failure kind raised when `LOAD_ARG` reads past the supplied arguments.
pub const INDEX_OUT_OF_BOUNDS: &str = "IndexOutOfBounds";

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Int(i64),
    StrArray(Vec<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "Str",
            Value::Int(_) => "Int",
            Value::StrArray(_) => "StrArray",
        }
    }

    fn render(self) -> String {
        match self {
            Value::Str(s) => s,
            Value::Int(i) => i.to_string(),
            Value::StrArray(items) => format!("[{}]", items.join(", ")),
        }
    }
}

/// Faults in the executing code itself, as opposed to failures it raises.
#[derive(Debug, thiserror::Error)]
pub enum VmFault {
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    #[error("Invalid constant index {index} at offset {offset}")]
    InvalidConstant { index: u32, offset: usize },

    #[error("Type mismatch at offset {offset}: expected {expected}, found {found}")]
    TypeMismatch {
        offset: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Call depth limit of {0} exceeded")]
    CallDepth(usize),

    #[error("Console write failed: {0}")]
    Console(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// How a run of code ended abnormally.
#[derive(Debug)]
pub(crate) enum ExecError {
    Raised(Failure),
    Fault(VmFault),
}

impl From<VmFault> for ExecError {
    fn from(fault: VmFault) -> Self {
        ExecError::Fault(fault)
    }
}

impl From<DecodeError> for ExecError {
    fn from(err: DecodeError) -> Self {
        ExecError::Fault(VmFault::Decode(err))
    }
}

impl From<VmFault> for Failure {
    fn from(fault: VmFault) -> Self {
        Failure::new("VmFault", fault.to_string())
    }
}

impl From<ExecError> for Failure {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Raised(failure) => failure,
            ExecError::Fault(fault) => fault.into(),
        }
    }
}

/// Nested calls, from bytecode or native code, stop at [`MAX_CALL_DEPTH`].
pub(crate) fn check_depth(depth: usize) -> Result<(), VmFault> {
    if depth >= MAX_CALL_DEPTH {
        return Err(VmFault::CallDepth(MAX_CALL_DEPTH));
    }
    Ok(())
}

pub(crate) struct Interpreter<'a> {
    console: &'a Console,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(console: &'a Console, depth: usize) -> Self {
        Self { console, depth }
    }

    pub(crate) fn execute(
        &self,
        module: &LoadedModule,
        unit: &Module,
        function: &Function,
        args: &[String],
    ) -> Result<(), ExecError> {
        let mut stack: Vec<Value> = Vec::new();
        let mut reader = BytecodeReader::new(&function.code);

        while reader.has_more() {
            let offset = reader.position();
            let opcode = reader.read_opcode()?;

            match opcode {
                Opcode::Nop => {}
                Opcode::Pop => {
                    pop(&mut stack, offset)?;
                }
                Opcode::Dup => {
                    let top = stack.last().cloned().ok_or(VmFault::StackUnderflow(offset))?;
                    stack.push(top);
                }
                Opcode::ConstInt => stack.push(Value::Int(reader.read_i64()?)),
                Opcode::ConstStr => {
                    let index = reader.read_u32()?;
                    stack.push(Value::Str(constant(unit, index, offset)?.to_string()));
                }
                Opcode::LoadArg => {
                    let index = reader.read_u16()?;
                    let arg = args.get(index as usize).ok_or_else(|| {
                        ExecError::Raised(Failure::new(
                            INDEX_OUT_OF_BOUNDS,
                            format!("argument {} requested but {} supplied", index, args.len()),
                        ))
                    })?;
                    stack.push(Value::Str(arg.clone()));
                }
                Opcode::LoadArgs => stack.push(Value::StrArray(args.to_vec())),
                Opcode::ArgCount => stack.push(Value::Int(args.len() as i64)),
                Opcode::Concat => {
                    let right = pop(&mut stack, offset)?.render();
                    let left = pop(&mut stack, offset)?.render();
                    stack.push(Value::Str(left + &right));
                }
                Opcode::Print => {
                    let line = pop(&mut stack, offset)?.render();
                    self.console
                        .println(&line)
                        .map_err(|e| VmFault::Console(e.to_string()))?;
                }
                Opcode::Invoke => {
                    let target = constant(unit, reader.read_u32()?, offset)?;
                    let function_name = constant(unit, reader.read_u32()?, offset)?;
                    let call_args = match pop(&mut stack, offset)? {
                        Value::StrArray(items) => items,
                        other => {
                            return Err(VmFault::TypeMismatch {
                                offset,
                                expected: "StrArray",
                                found: other.type_name(),
                            }
                            .into())
                        }
                    };
                    self.invoke(module, target, function_name, &call_args)?;
                }
                Opcode::Return => return Ok(()),
                Opcode::Throw => {
                    let message = pop(&mut stack, offset)?.render();
                    let kind = pop(&mut stack, offset)?.render();
                    return Err(ExecError::Raised(Failure::new(kind, message)));
                }
            }
        }
        Ok(())
    }

    /// Run `function` of module `target`, resolved through the caller's defining context.
    fn invoke(
        &self,
        caller: &LoadedModule,
        target: &str,
        function: &str,
        args: &[String],
    ) -> Result<(), ExecError> {
        let depth = self.depth + 1;
        check_depth(depth)?;
        let raised = |e: crate::error::RuntimeError| ExecError::Raised(e.into());

        let name = SymbolicName::parse(target).map_err(raised)?;
        let module = caller.context().resolve_module(&name).map_err(raised)?;
        let entry = invoker::lookup(&module, function, self.console, depth).map_err(raised)?;
        entry.run(args).map_err(ExecError::Raised)
    }
}

fn pop(stack: &mut Vec<Value>, offset: usize) -> Result<Value, VmFault> {
    stack.pop().ok_or(VmFault::StackUnderflow(offset))
}

fn constant(unit: &Module, index: u32, offset: usize) -> Result<&str, VmFault> {
    unit.constants
        .get_string(index)
        .ok_or(VmFault::InvalidConstant { index, offset })
}
