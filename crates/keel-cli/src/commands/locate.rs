//! `keel locate` — list every unit with a given simple name, in search order.

use keel_bytecode::UNIT_SUFFIX;
use keel_runtime::Locator;
use termcolor::ColorChoice;

use super::{parse_roots, scan_policy};
use crate::output::StyledOutput;

pub struct LocateArgs {
    pub paths: Vec<String>,
    pub skip_unavailable: bool,
    pub simple_name: String,
}

pub fn execute(args: LocateArgs, choice: ColorChoice) -> anyhow::Result<()> {
    let roots = parse_roots(&args.paths);
    let found = Locator::new(scan_policy(args.skip_unavailable)).locate(
        &roots,
        &args.simple_name,
        UNIT_SUFFIX,
    )?;

    let mut out = StyledOutput::new(choice);
    if found.is_empty() {
        out.stderr_warning("warning");
        out.stderr_plain(&format!(
            ": no {}{} on any of {} root(s)\n",
            args.simple_name,
            UNIT_SUFFIX,
            roots.len()
        ));
        return Ok(());
    }
    for resource in &found {
        out.plain(&resource.url);
        out.newline();
    }
    out.flush();
    Ok(())
}
