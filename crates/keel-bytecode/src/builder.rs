//! Module builder for constructing units programmatically

use crate::encoder::BytecodeWriter;
use crate::module::{function_flags, Function, Module, Signature, ENTRY_FUNCTION};
use rustc_hash::FxHashMap;

/// Helper for building bytecode modules
///
/// String constants are interned: adding the same string twice yields the
/// same pool index.
#[derive(Debug)]
pub struct ModuleBuilder {
    module: Module,
    strings: FxHashMap<String, u32>,
}

impl ModuleBuilder {
    /// Start a module with the given fully-qualified name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name.into()),
            strings: FxHashMap::default(),
        }
    }

    /// Record the source file the unit was produced from
    pub fn source_file(mut self, path: impl Into<String>) -> Self {
        self.module.metadata.source_file = Some(path.into());
        self
    }

    /// Add a string constant, returning its index
    pub fn add_string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.strings.get(value) {
            return index;
        }
        let index = self.module.constants.add_string(value.to_string());
        self.strings.insert(value.to_string(), index);
        index
    }

    /// Add a finished function
    pub fn add_function(&mut self, function: Function) {
        self.module.functions.push(function);
    }

    /// Add a public `main(StrArray) -> Void` whose body is emitted by `body`
    ///
    /// The closure receives the builder too, so it can intern the strings
    /// it references.
    pub fn entry_point<F>(&mut self, body: F)
    where
        F: FnOnce(&mut Self, &mut BytecodeWriter),
    {
        let mut writer = BytecodeWriter::new();
        body(self, &mut writer);
        self.add_function(Function {
            name: ENTRY_FUNCTION.to_string(),
            flags: function_flags::PUBLIC,
            signature: Signature::entry(),
            code: writer.into_bytes(),
        });
    }

    /// Build the final module
    pub fn build(self) -> Module {
        self.module
    }

    /// Build and encode in one step
    pub fn encode(self) -> Vec<u8> {
        self.module.encode()
    }
}
