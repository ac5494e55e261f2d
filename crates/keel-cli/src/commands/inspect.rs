//! `keel inspect` — decode a unit and describe what it exports.

use anyhow::Context;
use keel_bytecode::{verify_module, Module, ENTRY_FUNCTION};
use termcolor::ColorChoice;

use crate::output::StyledOutput;

pub struct InspectArgs {
    pub file: String,
}

pub fn execute(args: InspectArgs, choice: ColorChoice) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file))?;
    let module =
        Module::decode(&bytes).with_context(|| format!("Failed to decode {}", args.file))?;

    let mut out = StyledOutput::new(choice);
    out.bold(module.name());
    out.newline();
    if let Some(source) = &module.metadata.source_file {
        out.dim(&format!("  source:    {}", source));
        out.newline();
    }
    out.dim(&format!("  version:   {}", module.version));
    out.newline();
    out.dim(&format!("  constants: {}", module.constants.len()));
    out.newline();

    out.plain("  functions:");
    out.newline();
    for function in &module.functions {
        let visibility = if function.is_public() { "public " } else { "private" };
        out.plain(&format!("    {} ", visibility));
        out.info(&function.name);
        out.plain(&format!(" {}", function.signature));
        if function.name == ENTRY_FUNCTION && function.is_public() && function.signature.is_entry() {
            out.plain("  ");
            out.success("[entry]");
        }
        out.newline();
    }

    match verify_module(&module) {
        Ok(()) => out.success("verified"),
        Err(e) => {
            out.stderr_warning("warning");
            out.stderr_plain(&format!(": verification failed: {}\n", e));
        }
    }
    out.newline();
    out.flush();
    Ok(())
}
